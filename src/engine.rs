//! The page engine and the worker thread that owns it.
//!
//! The session never touches the engine directly. It sends [`Command`]s to a
//! dedicated thread and gets exactly one [`EngineEvent`] back per command.

use std::{
    fs, io,
    path::PathBuf,
    sync::mpsc,
    thread::{self, JoinHandle},
};

use thiserror::Error;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tracing::{debug, warn};
use url::Url;

use crate::{layout::PageLayout, request::OutputTarget};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("could not launch the browser: {0}")]
    Launch(String),
    #[error("no such file: {}", .0.display())]
    MissingFile(PathBuf),
    #[error("navigation failed: {0}")]
    Navigation(String),
    #[error("no page has been loaded")]
    NotLoaded,
    #[error("the browser has been shut down")]
    Closed,
    #[error("PDF generation failed: {0}")]
    Print(String),
    #[error("could not write {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// A browser page that can load a URL and print it.
///
/// Both calls block until the engine is done.
pub trait PageEngine: Send + 'static {
    fn navigate(&mut self, url: &Url) -> Result<(), EngineError>;
    fn print_to_pdf(&mut self, layout: &PageLayout) -> Result<Vec<u8>, EngineError>;

    /// Tears the engine's external resources down from another thread,
    /// even while a call is blocked.
    fn kill_switch(&self) -> Option<KillSwitch> {
        None
    }
}

/// One-shot release of an engine's resources, held outside the worker.
pub struct KillSwitch(Box<dyn FnOnce() + Send>);

impl KillSwitch {
    pub fn new(release: impl FnOnce() + Send + 'static) -> Self {
        Self(Box::new(release))
    }

    pub fn fire(self) {
        (self.0)()
    }
}

#[derive(Debug)]
pub enum Command {
    Navigate(Url),
    Print {
        layout: PageLayout,
        target: OutputTarget,
    },
}

#[derive(Debug, PartialEq, Eq)]
pub enum EngineEvent {
    LoadFinished { ok: bool },
    /// Printing to a file finished.
    PrintFinished { path: PathBuf, success: bool },
    /// Printing to memory finished; `None` when it failed.
    PdfData(Option<Vec<u8>>),
}

/// Owns the engine thread. [`EngineHandle::shutdown`] stops the thread and
/// waits for it; [`EngineHandle::abort`] and dropping the handle release the
/// engine's resources without waiting.
pub struct EngineHandle {
    commands: Option<mpsc::Sender<Command>>,
    events: UnboundedReceiver<EngineEvent>,
    worker: Option<JoinHandle<()>>,
    kill: Option<KillSwitch>,
}

impl EngineHandle {
    pub fn spawn<E: PageEngine>(engine: E) -> io::Result<Self> {
        let (cmd_tx, cmd_rx) = mpsc::channel();
        let (ev_tx, ev_rx) = unbounded_channel();
        let kill = engine.kill_switch();
        let worker = thread::Builder::new()
            .name("page-engine".into())
            .spawn(move || serve(engine, cmd_rx, ev_tx))?;
        Ok(Self {
            commands: Some(cmd_tx),
            events: ev_rx,
            worker: Some(worker),
            kill,
        })
    }

    /// Returns false when the worker is gone.
    pub fn send(&self, command: Command) -> bool {
        match &self.commands {
            Some(tx) => tx.send(command).is_ok(),
            None => false,
        }
    }

    /// Waits for the next event. `None` means the worker has exited.
    pub async fn next_event(&mut self) -> Option<EngineEvent> {
        self.events.recv().await
    }

    /// Stops the worker and waits for it to release the engine.
    pub fn shutdown(&mut self) {
        self.commands.take();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                warn!("page engine thread panicked");
            }
        }
        self.kill.take();
    }

    /// Releases the engine's resources now, without waiting for a worker
    /// that may be stuck inside a call.
    pub fn abort(&mut self) {
        self.commands.take();
        if let Some(kill) = self.kill.take() {
            debug!("releasing page engine");
            kill.fire();
        }
    }
}

impl Drop for EngineHandle {
    fn drop(&mut self) {
        // Never join here: a stuck engine must not hold up process exit.
        self.abort();
    }
}

fn serve<E: PageEngine>(
    mut engine: E,
    commands: mpsc::Receiver<Command>,
    events: UnboundedSender<EngineEvent>,
) {
    for command in commands {
        let event = match command {
            Command::Navigate(url) => {
                debug!(%url, "navigating");
                let ok = match engine.navigate(&url) {
                    Ok(()) => true,
                    Err(err) => {
                        warn!(%url, error = %err, "load failed");
                        false
                    }
                };
                EngineEvent::LoadFinished { ok }
            }
            Command::Print {
                layout,
                target: OutputTarget::File(path),
            } => {
                let written = engine.print_to_pdf(&layout).and_then(|bytes| {
                    fs::write(&path, &bytes).map_err(|source| EngineError::Write {
                        path: path.clone(),
                        source,
                    })
                });
                if let Err(err) = &written {
                    warn!(path = %path.display(), error = %err, "print failed");
                }
                EngineEvent::PrintFinished {
                    path,
                    success: written.is_ok(),
                }
            }
            Command::Print {
                layout,
                target: OutputTarget::Stdout,
            } => match engine.print_to_pdf(&layout) {
                Ok(bytes) => EngineEvent::PdfData(Some(bytes)),
                Err(err) => {
                    warn!(error = %err, "print failed");
                    EngineEvent::PdfData(None)
                }
            },
        };
        if events.send(event).is_err() {
            break;
        }
    }
    debug!("page engine released");
}
