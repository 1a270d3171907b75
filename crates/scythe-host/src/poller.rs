//! Host end of the file-polling transport.
//!
//! Each tick reads the command file. A command runs only if its timestamp is
//! strictly greater than the last one seen, which is the sole dedup rule.
//! The watermark is advanced before dispatch, so a crash between dispatch
//! and the response write leaves that command seen but unanswered; the
//! controller observes this as a timeout.

use scytheconf::PollingConfig;
use scytheproto::{decode_lenient, Request, Response, Value};
use std::cell::RefCell;
use std::fs;
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, instrument, trace, warn};

use crate::dispatch::Dispatcher;

/// What one tick did.
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    /// No command file, or it is empty
    Idle,
    /// Content ends early; probably mid-write, retry next tick
    NotReady,
    /// Timestamp not newer than the watermark
    Duplicate { timestamp: f64 },
    /// Complete but unusable content; answered only if its timestamp was fresh
    Malformed { answered: bool },
    /// Executed and answered
    Dispatched { command: String, timestamp: f64 },
}

#[derive(Debug, thiserror::Error)]
pub enum PollError {
    #[error("failed to read {path}: {source}")]
    Read { path: PathBuf, source: io::Error },

    #[error("failed to write {path}: {source}")]
    Write { path: PathBuf, source: io::Error },
}

pub struct FilePoller {
    command_path: PathBuf,
    response_path: PathBuf,
    interval: Duration,
    last_seen: f64,
}

impl FilePoller {
    /// The watermark starts at zero for every poller.
    pub fn new(config: &PollingConfig) -> Self {
        Self {
            command_path: config.command_path(),
            response_path: config.response_path(),
            interval: config.interval(),
            last_seen: 0.0,
        }
    }

    pub fn last_seen(&self) -> f64 {
        self.last_seen
    }

    pub fn command_path(&self) -> &Path {
        &self.command_path
    }

    pub fn response_path(&self) -> &Path {
        &self.response_path
    }

    /// Check the command file once and run it if it is new.
    pub fn poll_once(&mut self, dispatcher: &mut Dispatcher) -> Result<PollOutcome, PollError> {
        let bytes = match fs::read(&self.command_path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(PollOutcome::Idle),
            Err(source) => {
                return Err(PollError::Read {
                    path: self.command_path.clone(),
                    source,
                })
            }
        };
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(PollOutcome::Idle);
        }

        let value = match decode_lenient(&bytes) {
            Ok(value) => value,
            Err(e) if e.is_incomplete() => {
                trace!(error = %e, "command file not ready");
                return Ok(PollOutcome::NotReady);
            }
            Err(e) => {
                debug!(error = %e, "undecodable command file ignored");
                return Ok(PollOutcome::Malformed { answered: false });
            }
        };

        let timestamp = value.get("timestamp").and_then(Value::as_f64);
        let fresh = timestamp.filter(|ts| *ts > self.last_seen);

        let request = match Request::from_value(value) {
            Ok(request) => request,
            Err(e) => {
                let Some(ts) = fresh else {
                    debug!(error = %e, "stale malformed command ignored");
                    return Ok(PollOutcome::Malformed { answered: false });
                };
                warn!(error = %e, timestamp = ts, "malformed command");
                self.last_seen = ts;
                self.write_response(&Response::fail(format!("Malformed request: {}", e)))?;
                return Ok(PollOutcome::Malformed { answered: true });
            }
        };

        let Some(ts) = fresh else {
            return Ok(PollOutcome::Duplicate {
                timestamp: timestamp.unwrap_or(0.0),
            });
        };

        self.last_seen = ts;
        let response = dispatcher.dispatch(&request);
        self.write_response(&response)?;

        Ok(PollOutcome::Dispatched {
            command: request.command,
            timestamp: ts,
        })
    }

    /// Replace the response file via rename so readers never see half of it.
    fn write_response(&self, response: &Response) -> Result<(), PollError> {
        let err = |source| PollError::Write {
            path: self.response_path.clone(),
            source,
        };
        let tmp = self.response_path.with_extension("json.tmp");
        fs::write(&tmp, response.encode()).map_err(err)?;
        fs::rename(&tmp, &self.response_path).map_err(err)
    }

    /// Poll on a fixed interval until shutdown.
    #[instrument(name = "file_poller", skip_all, fields(command_file = %self.command_path.display()))]
    pub async fn run(
        mut self,
        dispatcher: Rc<RefCell<Dispatcher>>,
        mut shutdown: broadcast::Receiver<()>,
    ) {
        if let Some(dir) = self.command_path.parent() {
            if let Err(e) = fs::create_dir_all(dir) {
                error!(error = %e, dir = %dir.display(), "cannot create polling directory");
            }
        }

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(interval = ?self.interval, "file poller starting");

        loop {
            tokio::select! {
                _ = shutdown.recv() => break,
                _ = ticker.tick() => {
                    match self.poll_once(&mut dispatcher.borrow_mut()) {
                        Ok(PollOutcome::Dispatched { command, timestamp }) => {
                            debug!(%command, timestamp, "command executed");
                        }
                        Ok(PollOutcome::Duplicate { .. }) | Ok(PollOutcome::Idle) => {}
                        Ok(other) => trace!(outcome = ?other, "poll"),
                        Err(e) => warn!(error = %e, "poll failed"),
                    }
                }
            }
        }
        info!(last_seen = self.last_seen, "file poller stopped");
    }
}
