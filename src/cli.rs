use anyhow::{Context, Result};
use clap::Parser;
use std::{
    net::{IpAddr, SocketAddr},
    path::{Path, PathBuf},
    time::Duration,
};

use crate::{
    chrome::ChromeOptions,
    layout::Margins,
    request::{resolve_source, ConversionRequest, OutputTarget},
};

/// Converts the HTML document INPUT to PDF.
#[derive(Parser, Debug)]
#[command(name = "htmltopdf", version)]
pub struct Cli {
    /// Input URL or filename to be converted to PDF
    #[arg(required_unless_present = "serve")]
    pub input: Option<String>,
    /// Output file; omit or pass blank (or "-") for stdout
    #[arg(short, long, default_value = "", conflicts_with = "serve")]
    pub output: String,
    /// Left margin [mm]
    #[arg(long, default_value_t = 20.0, value_parser = parse_margin)]
    pub margin_left: f64,
    /// Top margin [mm]
    #[arg(long, default_value_t = 5.0, value_parser = parse_margin)]
    pub margin_top: f64,
    /// Right margin [mm]
    #[arg(long, default_value_t = 20.0, value_parser = parse_margin)]
    pub margin_right: f64,
    /// Bottom margin [mm]
    #[arg(long, default_value_t = 5.0, value_parser = parse_margin)]
    pub margin_bottom: f64,
    /// Give up when the PDF is not done after this many seconds (0 waits forever)
    #[arg(long, default_value_t = 120)]
    pub timeout: u64,
    /// Milliseconds to let page scripts settle between load and print
    #[arg(long, default_value_t = 0)]
    pub settle_ms: u64,
    /// Chrome/Chromium executable (detected when omitted)
    #[arg(long)]
    pub chrome: Option<PathBuf>,
    /// Run Chrome without its sandbox (needed as root in most containers)
    #[arg(long)]
    pub no_sandbox: bool,
    /// Write a JSON report of the run to this file
    #[arg(long, conflicts_with = "serve")]
    pub report: Option<PathBuf>,
    /// Run as an HTTP service instead: POST HTML to /topdf, get the PDF back
    #[arg(long, conflicts_with = "input")]
    pub serve: bool,
    /// Address the service listens on
    #[arg(long, env = "HTMLTOPDF_HOST", default_value = "0.0.0.0")]
    pub host: IpAddr,
    /// Port the service listens on
    #[arg(long, env = "HTMLTOPDF_PORT", default_value_t = 5555)]
    pub port: u16,
}

fn parse_margin(s: &str) -> Result<f64, String> {
    let mm: f64 = s
        .trim()
        .parse()
        .map_err(|_| format!("'{s}' is not a number of millimetres"))?;
    if !mm.is_finite() || mm < 0.0 {
        return Err(format!("margin must be a finite, non-negative length, got '{s}'"));
    }
    Ok(mm)
}

impl Cli {
    pub fn margins(&self) -> Margins {
        Margins {
            left: self.margin_left,
            top: self.margin_top,
            right: self.margin_right,
            bottom: self.margin_bottom,
        }
    }

    pub fn time_limit(&self) -> Option<Duration> {
        (self.timeout > 0).then(|| Duration::from_secs(self.timeout))
    }

    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    pub fn request(&self, cwd: &Path) -> Result<ConversionRequest> {
        let input = self.input.clone().context("no INPUT given")?;
        Ok(ConversionRequest {
            url: resolve_source(&input, cwd)?,
            input,
            output: OutputTarget::from_arg(&self.output),
            margins: self.margins(),
        })
    }

    pub fn chrome_options(&self) -> ChromeOptions {
        ChromeOptions {
            executable: self.chrome.clone(),
            sandbox: !self.no_sandbox,
            timeout: self.time_limit(),
            settle: Duration::from_millis(self.settle_ms),
        }
    }
}
