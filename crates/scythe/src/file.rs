//! Controller end of the file-polling transport.
//!
//! One command file, one response file, no locking. The host only runs a
//! command whose timestamp beats everything it has seen, so timestamps
//! issued here must strictly increase. Requests are serialized because a
//! second command would overwrite the first before the host saw it.
//!
//! A response that arrives after its caller timed out may be read by the
//! next caller. Nothing in the file pair can tell them apart.

use async_trait::async_trait;
use scytheconf::PollingConfig;
use scytheproto::{DecodeMode, Request, Response};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::fs;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, instrument, trace};

use crate::bridge::{Bridge, TransportKind};
use crate::error::BridgeError;

/// Smallest bump applied when the clock has not moved past the last stamp.
const TIMESTAMP_STEP: f64 = 0.001;

pub struct FileBridge {
    command_path: PathBuf,
    response_path: PathBuf,
    response_timeout: Duration,
    response_poll: Duration,
    /// Last issued timestamp; the lock also serializes requests.
    last_timestamp: Mutex<f64>,
}

impl FileBridge {
    /// Create the shared directory if needed.
    pub fn new(config: &PollingConfig) -> Result<Self, BridgeError> {
        std::fs::create_dir_all(&config.dir)
            .map_err(|e| BridgeError::io(config.dir.display(), e))?;
        Ok(Self {
            command_path: config.command_path(),
            response_path: config.response_path(),
            response_timeout: config.response_timeout(),
            response_poll: config.response_poll(),
            last_timestamp: Mutex::new(0.0),
        })
    }

    pub fn command_path(&self) -> &Path {
        &self.command_path
    }

    pub fn response_path(&self) -> &Path {
        &self.response_path
    }

    async fn remove_stale_response(&self) -> Result<(), BridgeError> {
        match fs::remove_file(&self.response_path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(BridgeError::io(self.response_path.display(), e)),
        }
    }

    /// Write via a sibling temp file so the host never reads half a command.
    async fn write_command(&self, request: &Request) -> Result<(), BridgeError> {
        let tmp = self.command_path.with_extension("json.tmp");
        fs::write(&tmp, request.encode())
            .await
            .map_err(|e| BridgeError::io(tmp.display(), e))?;
        fs::rename(&tmp, &self.command_path)
            .await
            .map_err(|e| BridgeError::io(self.command_path.display(), e))
    }

    async fn await_response(&self) -> Result<Response, BridgeError> {
        let deadline = Instant::now() + self.response_timeout;
        loop {
            tokio::time::sleep(self.response_poll).await;

            match fs::read(&self.response_path).await {
                Ok(bytes) if !bytes.is_empty() => {
                    match Response::decode(&bytes, DecodeMode::Strict) {
                        Ok(response) => return Ok(response),
                        Err(e) if e.is_incomplete() => trace!("response still being written"),
                        Err(e) => return Err(e.into()),
                    }
                }
                Ok(_) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(BridgeError::io(self.response_path.display(), e)),
            }

            if Instant::now() >= deadline {
                return Err(BridgeError::Timeout(self.response_timeout));
            }
        }
    }
}

#[async_trait]
impl Bridge for FileBridge {
    #[instrument(name = "file_send", skip_all, fields(command = %request.command))]
    async fn send(&self, mut request: Request) -> Result<Response, BridgeError> {
        let mut last = self.last_timestamp.lock().await;
        let timestamp = next_timestamp(*last, wall_clock());
        *last = timestamp;
        request.timestamp = Some(timestamp);

        self.remove_stale_response().await?;
        self.write_command(&request).await?;
        debug!(timestamp, "command written");

        self.await_response().await
    }

    fn kind(&self) -> TransportKind {
        TransportKind::File
    }
}

fn wall_clock() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

/// Wall-clock seconds, bumped past `last` when the clock stalls or steps back.
fn next_timestamp(last: f64, now: f64) -> f64 {
    if now > last {
        now
    } else {
        last + TIMESTAMP_STEP
    }
}
