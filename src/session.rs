//! Load-then-print orchestration.
//!
//! ```text
//! Idle --start--> Loading --load ok--> Printing --print ok--> Succeeded
//!                    |                    |
//!                    +--load failed--+    +--print failed--> Failed
//!                                    +---------------------> Failed
//! ```
//!
//! One navigation and at most one print per session. Nothing is retried.

use std::{io::Write, path::PathBuf, time::Duration};

use thiserror::Error;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, info, warn};

use crate::{
    engine::{Command, EngineEvent, EngineHandle},
    layout::PageLayout,
    request::{ConversionRequest, OutputTarget},
};

/// Why a session ended badly. The `Display` text is the one-line
/// diagnostic printed to stderr.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Failure {
    #[error("failed to load '{input}'")]
    Load { input: String },
    #[error("failed to print to {target}")]
    Print { target: OutputTarget },
    #[error("timed out after {}s waiting for '{input}'", .after.as_secs())]
    TimedOut { input: String, after: Duration },
}

#[derive(Debug, Clone, PartialEq)]
pub enum State {
    Idle,
    Loading,
    Printing,
    Succeeded,
    Failed(Failure),
}

impl State {
    pub fn is_terminal(&self) -> bool {
        matches!(self, State::Succeeded | State::Failed(_))
    }
}

/// Terminal result of a session.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Succeeded,
    Failed(Failure),
}

impl Outcome {
    pub fn exit_code(&self) -> u8 {
        match self {
            Outcome::Succeeded => 0,
            Outcome::Failed(_) => 1,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Outcome::Succeeded => "succeeded",
            Outcome::Failed(Failure::Load { .. }) => "load_failed",
            Outcome::Failed(Failure::Print { .. }) => "print_failed",
            Outcome::Failed(Failure::TimedOut { .. }) => "timed_out",
        }
    }
}

/// Drives one page through load and print. `W` receives the PDF bytes when
/// the output target is standard output.
pub struct Session<W: Write> {
    request: ConversionRequest,
    engine: EngineHandle,
    stdout: W,
    state: State,
    streamed: Option<usize>,
}

impl<W: Write> Session<W> {
    pub fn new(request: ConversionRequest, engine: EngineHandle, stdout: W) -> Self {
        Self {
            request,
            engine,
            stdout,
            state: State::Idle,
            streamed: None,
        }
    }

    pub fn state(&self) -> &State {
        &self.state
    }

    /// Number of bytes written to standard output, once written.
    pub fn streamed_bytes(&self) -> Option<usize> {
        self.streamed
    }

    pub fn start(&mut self) {
        if self.state != State::Idle {
            warn!(state = ?self.state, "session already started");
            return;
        }
        info!(url = %self.request.url, "loading");
        self.state = State::Loading;
        if !self.engine.send(Command::Navigate(self.request.url.clone())) {
            self.fail_current_stage();
        }
    }

    pub fn dispatch(&mut self, event: EngineEvent) {
        match event {
            EngineEvent::LoadFinished { ok } => self.on_load_complete(ok),
            EngineEvent::PrintFinished { path, success } => self.on_print_complete(path, success),
            EngineEvent::PdfData(data) => self.on_pdf_data(data),
        }
    }

    fn on_load_complete(&mut self, ok: bool) {
        if self.state != State::Loading {
            warn!(state = ?self.state, "ignoring unexpected load completion");
            return;
        }
        if !ok {
            self.state = State::Failed(Failure::Load {
                input: self.request.input.clone(),
            });
            return;
        }

        self.state = State::Printing;
        let layout = PageLayout::a4_portrait(self.request.margins);
        debug!(?layout, printable_mm = ?layout.printable_mm(), "printing");
        let sent = self.engine.send(Command::Print {
            layout,
            target: self.request.output.clone(),
        });
        if !sent {
            self.fail_current_stage();
        }
    }

    fn on_print_complete(&mut self, path: PathBuf, success: bool) {
        if self.state != State::Printing {
            warn!(state = ?self.state, "ignoring unexpected print completion");
            return;
        }
        self.state = if success {
            info!(path = %path.display(), "pdf written");
            State::Succeeded
        } else {
            State::Failed(Failure::Print {
                target: OutputTarget::File(path),
            })
        };
    }

    fn on_pdf_data(&mut self, data: Option<Vec<u8>>) {
        if self.state != State::Printing {
            warn!(state = ?self.state, "ignoring unexpected pdf data");
            return;
        }
        let written = data.map(|bytes| {
            self.stdout
                .write_all(&bytes)
                .and_then(|()| self.stdout.flush())
                .map(|()| bytes.len())
        });
        self.state = match written {
            Some(Ok(len)) => {
                self.streamed = Some(len);
                State::Succeeded
            }
            Some(Err(err)) => {
                warn!(error = %err, "writing to stdout failed");
                State::Failed(Failure::Print {
                    target: OutputTarget::Stdout,
                })
            }
            None => State::Failed(Failure::Print {
                target: OutputTarget::Stdout,
            }),
        };
    }

    fn fail_current_stage(&mut self) {
        let failure = match self.state {
            State::Idle | State::Loading => Failure::Load {
                input: self.request.input.clone(),
            },
            State::Printing => Failure::Print {
                target: self.request.output.clone(),
            },
            State::Succeeded | State::Failed(_) => return,
        };
        self.state = State::Failed(failure);
    }

    /// Starts the session and pumps engine events until it is terminal.
    /// With `limit`, a session still running after that long fails.
    pub async fn run(&mut self, limit: Option<Duration>) -> Outcome {
        let deadline = limit.map(|d| Instant::now() + d);
        self.start();

        while !self.state.is_terminal() {
            let next = match deadline {
                Some(deadline) => timeout_at(deadline, self.engine.next_event()).await,
                None => Ok(self.engine.next_event().await),
            };
            let Ok(event) = next else {
                self.state = State::Failed(Failure::TimedOut {
                    input: self.request.input.clone(),
                    after: limit.unwrap_or_default(),
                });
                // The worker may be stuck in a call; release the browser
                // from here instead of joining.
                self.engine.abort();
                return self.outcome();
            };
            match event {
                Some(event) => self.dispatch(event),
                None => {
                    warn!("page engine exited unexpectedly");
                    self.fail_current_stage();
                }
            }
        }

        self.engine.shutdown();
        self.outcome()
    }

    fn outcome(&self) -> Outcome {
        match &self.state {
            State::Failed(failure) => Outcome::Failed(failure.clone()),
            _ => Outcome::Succeeded,
        }
    }
}
