//! Config sections. Defaults are the bridge's policy values; both the host
//! and the controller must agree on them, so change them in files or env,
//! not in code.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Persistent socket channel (host connects out to the controller).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SocketConfig {
    /// Controller listen address.
    /// Default: 127.0.0.1
    #[serde(default = "SocketConfig::default_host")]
    pub host: String,

    /// Controller listen port.
    /// Default: 9878
    #[serde(default = "SocketConfig::default_port")]
    pub port: u16,

    /// Minimum gap between host connect attempts while disconnected.
    /// Default: 5000
    #[serde(default = "SocketConfig::default_reconnect_interval_ms")]
    pub reconnect_interval_ms: u64,

    /// Longest a single host read may block the scheduler.
    /// Default: 100
    #[serde(default = "SocketConfig::default_recv_timeout_ms")]
    pub recv_timeout_ms: u64,

    /// How long the controller waits for a response.
    /// Default: 5000
    #[serde(default = "SocketConfig::default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

impl SocketConfig {
    fn default_host() -> String {
        "127.0.0.1".to_string()
    }

    fn default_port() -> u16 {
        9878
    }

    fn default_reconnect_interval_ms() -> u64 {
        5_000
    }

    fn default_recv_timeout_ms() -> u64 {
        100
    }

    fn default_request_timeout_ms() -> u64 {
        5_000
    }

    /// `host:port` for bind/connect.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn reconnect_interval(&self) -> Duration {
        Duration::from_millis(self.reconnect_interval_ms)
    }

    pub fn recv_timeout(&self) -> Duration {
        Duration::from_millis(self.recv_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl Default for SocketConfig {
    fn default() -> Self {
        Self {
            host: Self::default_host(),
            port: Self::default_port(),
            reconnect_interval_ms: Self::default_reconnect_interval_ms(),
            recv_timeout_ms: Self::default_recv_timeout_ms(),
            request_timeout_ms: Self::default_request_timeout_ms(),
        }
    }
}

/// Shared-file channel used when the host sandbox has no sockets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollingConfig {
    /// Directory holding both files.
    /// Default: <system temp>/scythe_mcp
    #[serde(default = "PollingConfig::default_dir")]
    pub dir: PathBuf,

    /// Written by the controller, read by the host.
    /// Default: command.json
    #[serde(default = "PollingConfig::default_command_file")]
    pub command_file: String,

    /// Written by the host, read by the controller.
    /// Default: response.json
    #[serde(default = "PollingConfig::default_response_file")]
    pub response_file: String,

    /// Host poll period.
    /// Default: 100
    #[serde(default = "PollingConfig::default_interval_ms")]
    pub interval_ms: u64,

    /// How long the controller waits for a response file.
    /// Default: 2000
    #[serde(default = "PollingConfig::default_response_timeout_ms")]
    pub response_timeout_ms: u64,

    /// Controller re-check period while waiting.
    /// Default: 50
    #[serde(default = "PollingConfig::default_response_poll_ms")]
    pub response_poll_ms: u64,
}

impl PollingConfig {
    fn default_dir() -> PathBuf {
        std::env::temp_dir().join("scythe_mcp")
    }

    fn default_command_file() -> String {
        "command.json".to_string()
    }

    fn default_response_file() -> String {
        "response.json".to_string()
    }

    fn default_interval_ms() -> u64 {
        100
    }

    fn default_response_timeout_ms() -> u64 {
        2_000
    }

    fn default_response_poll_ms() -> u64 {
        50
    }

    /// Same settings rooted somewhere else (tests, sandboxes).
    pub fn in_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            ..Self::default()
        }
    }

    pub fn command_path(&self) -> PathBuf {
        self.dir.join(&self.command_file)
    }

    pub fn response_path(&self) -> PathBuf {
        self.dir.join(&self.response_file)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn response_timeout(&self) -> Duration {
        Duration::from_millis(self.response_timeout_ms)
    }

    pub fn response_poll(&self) -> Duration {
        Duration::from_millis(self.response_poll_ms)
    }
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            dir: Self::default_dir(),
            command_file: Self::default_command_file(),
            response_file: Self::default_response_file(),
            interval_ms: Self::default_interval_ms(),
            response_timeout_ms: Self::default_response_timeout_ms(),
            response_poll_ms: Self::default_response_poll_ms(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// tracing-subscriber filter (trace, debug, info, warn, error, or directives).
    /// Default: info
    #[serde(default = "TelemetryConfig::default_log_level")]
    pub log_level: String,
}

impl TelemetryConfig {
    fn default_log_level() -> String {
        "info".to_string()
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: Self::default_log_level(),
        }
    }
}
