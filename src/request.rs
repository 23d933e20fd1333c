use anyhow::{anyhow, Result};
use std::{
    fmt,
    path::{Path, PathBuf},
};
use url::Url;

use crate::layout::Margins;

/// Where the PDF bytes go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputTarget {
    File(PathBuf),
    Stdout,
}

impl OutputTarget {
    /// Blank and `-` both mean standard output.
    pub fn from_arg(arg: &str) -> Self {
        if arg.is_empty() || arg == "-" {
            OutputTarget::Stdout
        } else {
            OutputTarget::File(PathBuf::from(arg))
        }
    }

    pub fn path(&self) -> Option<&Path> {
        match self {
            OutputTarget::File(p) => Some(p),
            OutputTarget::Stdout => None,
        }
    }
}

impl fmt::Display for OutputTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputTarget::File(p) => write!(f, "output file '{}'", p.display()),
            OutputTarget::Stdout => f.write_str("standard output"),
        }
    }
}

/// One conversion, fixed before the session starts.
#[derive(Debug, Clone)]
pub struct ConversionRequest {
    /// The input exactly as given on the command line; used in diagnostics.
    pub input: String,
    pub url: Url,
    pub output: OutputTarget,
    pub margins: Margins,
}

/// Turns the INPUT argument into a URL the browser can open.
///
/// Absolute URLs pass through. Everything else is a local path, taken
/// relative to `cwd` when it is not absolute.
pub fn resolve_source(input: &str, cwd: &Path) -> Result<Url> {
    if let Ok(url) = Url::parse(input) {
        // "C:\page.html" parses with the scheme "c"
        if url.scheme().len() > 1 {
            return Ok(url);
        }
    }

    let path = Path::new(input);
    let path = if path.is_absolute() {
        path.to_path_buf()
    } else {
        cwd.join(path)
    };
    let path = dunce::canonicalize(&path).unwrap_or(path);
    Url::from_file_path(&path)
        .map_err(|_| anyhow!("cannot express '{}' as a file URL", path.display()))
}
