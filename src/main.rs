use anyhow::{Context, Result};
use clap::Parser;
use std::{
    io::{self, IsTerminal},
    process::ExitCode,
    time::Instant,
};
use tracing::debug;
use tracing_subscriber::EnvFilter;

mod chrome;
mod cli;
mod engine;
mod layout;
mod report;
mod request;
mod serve;
mod session;

use chrome::ChromeEngine;
use cli::Cli;
use engine::EngineHandle;
use report::Report;
use serve::ServiceSettings;
use session::{Outcome, Session};

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let args = Cli::parse();
    init_tracing(if args.serve { "info" } else { "error" });

    match run(args).await {
        Ok(code) => ExitCode::from(code),
        Err(err) => {
            eprintln!("htmltopdf: {err:#}");
            ExitCode::FAILURE
        }
    }
}

/// Logs go to stderr; stdout may be carrying the PDF.
fn init_tracing(default_filter: &str) {
    let filter =
        EnvFilter::try_from_env("HTMLTOPDF_LOG").unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_ansi(io::stderr().is_terminal())
        .init();
}

async fn run(args: Cli) -> Result<u8> {
    if args.serve {
        let chrome = args.chrome_options();
        let settings = ServiceSettings {
            margins: args.margins(),
            time_limit: args.time_limit(),
        };
        let app = serve::router(move || ChromeEngine::new(chrome.clone()), settings);
        serve::serve(args.listen_addr(), app).await?;
        return Ok(0);
    }
    convert(args).await
}

async fn convert(args: Cli) -> Result<u8> {
    let cwd = std::env::current_dir().context("cannot determine the working directory")?;
    let request = args.request(&cwd)?;
    debug!(?request, "resolved request");

    let engine = EngineHandle::spawn(ChromeEngine::new(args.chrome_options()))
        .context("failed to start the page engine thread")?;

    let started_at = chrono::Local::now();
    let clock = Instant::now();
    let mut session = Session::new(request.clone(), engine, io::stdout());
    let outcome = session.run(args.time_limit()).await;
    debug!(state = ?session.state(), "session finished");

    if let Outcome::Failed(failure) = &outcome {
        eprintln!("{failure}");
    }

    if let Some(path) = &args.report {
        Report::new(
            &request,
            &outcome,
            started_at,
            clock.elapsed().as_millis() as u64,
            session.streamed_bytes(),
        )
        .write(path)?;
    }

    Ok(outcome.exit_code())
}
