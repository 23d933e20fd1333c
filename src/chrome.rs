use std::{
    ffi::OsStr,
    path::PathBuf,
    sync::{Arc, Mutex, MutexGuard},
    thread,
    time::Duration,
};

use headless_chrome::{types::PrintToPdfOptions, Browser, LaunchOptionsBuilder, Tab};
use tracing::{debug, info};
use url::Url;

use crate::{
    engine::{EngineError, KillSwitch, PageEngine},
    layout::PageLayout,
};

const CHROME_ARGS: &[&str] = &[
    "--disable-gpu",
    "--disable-dev-shm-usage",
    "--no-first-run",
    "--no-default-browser-check",
    "--hide-scrollbars",
];

/// Used for DevTools calls when the run has no time limit.
const UNBOUNDED_WAIT: Duration = Duration::from_secs(60 * 60);

#[derive(Debug, Clone)]
pub struct ChromeOptions {
    /// Browser executable; detected when `None`.
    pub executable: Option<PathBuf>,
    pub sandbox: bool,
    pub timeout: Option<Duration>,
    /// Extra wait between load completion and printing.
    pub settle: Duration,
}

/// The running browser, shared with the kill switch. Once `closed` is set
/// no new browser may be stored.
#[derive(Default)]
struct BrowserSlot {
    browser: Option<Browser>,
    closed: bool,
}

/// Headless Chrome with a single tab. The browser starts on the first
/// navigation and is killed when the engine is dropped or its kill switch
/// fires.
pub struct ChromeEngine {
    options: ChromeOptions,
    slot: Arc<Mutex<BrowserSlot>>,
    tab: Option<Arc<Tab>>,
}

impl ChromeEngine {
    pub fn new(options: ChromeOptions) -> Self {
        Self {
            options,
            slot: Arc::default(),
            tab: None,
        }
    }

    fn wait_limit(&self) -> Duration {
        self.options.timeout.unwrap_or(UNBOUNDED_WAIT)
    }

    fn slot(&self) -> Result<MutexGuard<'_, BrowserSlot>, EngineError> {
        self.slot.lock().map_err(|_| EngineError::Closed)
    }

    fn launch(&self) -> Result<Browser, EngineError> {
        let launch_opts = LaunchOptionsBuilder::default()
            .headless(true)
            .sandbox(self.options.sandbox)
            .path(self.options.executable.clone())
            .idle_browser_timeout(self.wait_limit())
            .args(CHROME_ARGS.iter().map(OsStr::new).collect::<Vec<&OsStr>>())
            .build()
            .map_err(|e| EngineError::Launch(e.to_string()))?;
        Browser::new(launch_opts).map_err(|e| EngineError::Launch(format!("{e:#}")))
    }

    fn tab(&mut self) -> Result<Arc<Tab>, EngineError> {
        if let Some(tab) = &self.tab {
            return Ok(tab.clone());
        }
        if self.slot()?.closed {
            return Err(EngineError::Closed);
        }

        let browser = self.launch()?;
        info!("browser started");
        let tab = browser
            .new_tab()
            .map_err(|e| EngineError::Launch(format!("{e:#}")))?;
        tab.set_default_timeout(self.wait_limit());

        // The kill switch may have fired while Chrome was starting.
        let mut slot = self.slot()?;
        if slot.closed {
            return Err(EngineError::Closed);
        }
        slot.browser = Some(browser);
        drop(slot);

        self.tab = Some(tab.clone());
        Ok(tab)
    }
}

impl PageEngine for ChromeEngine {
    fn navigate(&mut self, url: &Url) -> Result<(), EngineError> {
        if url.scheme() == "file" {
            if let Ok(path) = url.to_file_path() {
                if !path.exists() {
                    return Err(EngineError::MissingFile(path));
                }
            }
        }

        let tab = self.tab()?;
        tab.navigate_to(url.as_str())
            .and_then(|tab| tab.wait_until_navigated())
            .map_err(|e| EngineError::Navigation(format!("{e:#}")))?;
        debug!(final_url = %tab.get_url(), "navigated");

        if !self.options.settle.is_zero() {
            thread::sleep(self.options.settle);
        }
        Ok(())
    }

    fn print_to_pdf(&mut self, layout: &PageLayout) -> Result<Vec<u8>, EngineError> {
        let tab = self.tab.as_ref().ok_or(EngineError::NotLoaded)?;
        let bytes = tab
            .print_to_pdf(Some(print_options(layout)))
            .map_err(|e| EngineError::Print(format!("{e:#}")))?;
        debug!(len = bytes.len(), "pdf generated");
        Ok(bytes)
    }

    fn kill_switch(&self) -> Option<KillSwitch> {
        let slot = self.slot.clone();
        Some(KillSwitch::new(move || {
            let browser = match slot.lock() {
                Ok(mut slot) => {
                    slot.closed = true;
                    slot.browser.take()
                }
                Err(_) => None,
            };
            if browser.is_some() {
                debug!("killing browser");
            }
            // Dropping the last handle kills the Chrome process.
            drop(browser);
        }))
    }
}

fn print_options(layout: &PageLayout) -> PrintToPdfOptions {
    let (width, height) = layout.paper.to_inches();
    let margins = layout.margins.to_inches();
    PrintToPdfOptions {
        landscape: Some(false),
        print_background: Some(true),
        prefer_css_page_size: Some(false),
        paper_width: Some(width),
        paper_height: Some(height),
        margin_top: Some(margins.top),
        margin_bottom: Some(margins.bottom),
        margin_left: Some(margins.left),
        margin_right: Some(margins.right),
        ..Default::default()
    }
}
