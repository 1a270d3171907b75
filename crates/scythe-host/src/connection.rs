//! Connection lifecycle for the socket link.
//!
//! `ConnectionManager` is the only owner of [`ConnectionState`] and of the
//! inbound frame buffer. The link asks it whether to connect and reports
//! every transport event back to it; it never changes state on its own.
//!
//! ```text
//! Disconnected --attempt--> Connecting --ok--> Connected
//!      ^                        |                  |
//!      +-------- failed --------+---- error/EOF ---+
//! ```

use scytheproto::{FrameError, LineFramer};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

#[derive(Debug)]
pub struct ConnectionManager {
    state: ConnectionState,
    reconnect_interval: Duration,
    last_attempt: Option<Instant>,
    framer: LineFramer,
    connects: u64,
}

impl ConnectionManager {
    pub fn new(reconnect_interval: Duration) -> Self {
        Self {
            state: ConnectionState::Disconnected,
            reconnect_interval,
            last_attempt: None,
            framer: LineFramer::new(),
            connects: 0,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    /// Successful connections so far.
    pub fn connects(&self) -> u64 {
        self.connects
    }

    /// Time left before another attempt is allowed; zero when one is due.
    /// `None` while connecting or connected.
    pub fn until_next_attempt(&self, now: Instant) -> Option<Duration> {
        if self.state != ConnectionState::Disconnected {
            return None;
        }
        Some(match self.last_attempt {
            None => Duration::ZERO,
            Some(at) => (at + self.reconnect_interval).saturating_duration_since(now),
        })
    }

    /// Claim a connect attempt. At most one is granted per interval, measured
    /// from the start of the previous attempt.
    pub fn begin_attempt(&mut self, now: Instant) -> bool {
        if self.until_next_attempt(now) != Some(Duration::ZERO) {
            return false;
        }
        self.last_attempt = Some(now);
        self.state = ConnectionState::Connecting;
        true
    }

    pub fn on_connected(&mut self) {
        if self.state != ConnectionState::Connecting {
            warn!(state = ?self.state, "connected outside an attempt");
        }
        self.framer.reset();
        self.state = ConnectionState::Connected;
        self.connects += 1;
        info!(connects = self.connects, "bridge connected");
    }

    /// Failed attempts stay Disconnected and wait out the interval.
    pub fn on_connect_failed(&mut self, reason: &str) {
        debug!(%reason, retry_in = ?self.reconnect_interval, "connect failed");
        self.state = ConnectionState::Disconnected;
    }

    /// Read/write error, EOF or framing overflow. The partial buffer goes.
    pub fn on_transport_error(&mut self, reason: &str) {
        if self.state == ConnectionState::Connected {
            info!(%reason, pending = self.framer.pending(), "bridge disconnected");
        }
        self.framer.reset();
        self.state = ConnectionState::Disconnected;
    }

    /// Feed received bytes; complete lines come back in order.
    pub fn on_bytes(&mut self, chunk: &[u8]) -> Result<Vec<String>, FrameError> {
        debug_assert!(self.is_connected(), "read outside Connected");
        self.framer.push(chunk)
    }
}
