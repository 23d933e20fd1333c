use anyhow::{Context, Result};
use serde::Serialize;
use std::path::Path;

use crate::{layout::Margins, request::ConversionRequest, session::Outcome};

/// JSON summary of one run, written with `--report`.
#[derive(Debug, Serialize)]
pub struct Report {
    pub input: String,
    pub url: String,
    /// `None` when the PDF went to stdout.
    pub output: Option<String>,
    pub margins_mm: Margins,
    pub outcome: &'static str,
    pub exit_code: u8,
    pub error: Option<String>,
    pub started_at: String,
    pub elapsed_ms: u64,
    pub pdf_bytes: Option<u64>,
}

impl Report {
    pub fn new(
        request: &ConversionRequest,
        outcome: &Outcome,
        started_at: chrono::DateTime<chrono::Local>,
        elapsed_ms: u64,
        streamed: Option<usize>,
    ) -> Self {
        let pdf_bytes = match (outcome, request.output.path()) {
            (Outcome::Succeeded, Some(path)) => std::fs::metadata(path).ok().map(|m| m.len()),
            (Outcome::Succeeded, None) => streamed.map(|n| n as u64),
            (Outcome::Failed(_), _) => None,
        };
        Self {
            input: request.input.clone(),
            url: request.url.to_string(),
            output: request.output.path().map(|p| p.display().to_string()),
            margins_mm: request.margins,
            outcome: outcome.label(),
            exit_code: outcome.exit_code(),
            error: match outcome {
                Outcome::Failed(failure) => Some(failure.to_string()),
                Outcome::Succeeded => None,
            },
            started_at: started_at.to_rfc3339(),
            elapsed_ms,
            pdf_bytes,
        }
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_vec_pretty(self)?;
        std::fs::write(path, json)
            .with_context(|| format!("failed to write report '{}'", path.display()))
    }
}
