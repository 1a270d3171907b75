//! Configuration for the Scythe host bridge.
//!
//! Both sides of the bridge read the same file so they agree on the port,
//! the polling directory and the timing policy. Every value has a compiled
//! default; nothing is negotiated at runtime.
//!
//! # Usage
//!
//! ```rust,no_run
//! use scytheconf::ScytheConfig;
//!
//! let config = ScytheConfig::load().expect("Failed to load config");
//! println!("socket: {}", config.socket.address());
//! println!("command file: {}", config.polling.command_path().display());
//! ```
//!
//! # Config File Locations
//!
//! Files are loaded in order (later wins):
//! 1. `/etc/scythe/config.toml` (system)
//! 2. `~/.config/scythe/config.toml` (user)
//! 3. `./scythe.toml` (local override, or an explicit `--config` path)
//! 4. Environment variables (`SCYTHE_*`, `RUST_LOG`)
//!
//! # Example Config
//!
//! ```toml
//! [socket]
//! host = "127.0.0.1"
//! port = 9878
//! reconnect_interval_ms = 5000
//! recv_timeout_ms = 100
//!
//! [polling]
//! dir = "/tmp/scythe_mcp"
//! interval_ms = 100
//!
//! [telemetry]
//! log_level = "info"
//! ```

pub mod loader;
pub mod settings;

pub use loader::{discover_config_files_with_override, ConfigSources};
pub use settings::{PollingConfig, SocketConfig, TelemetryConfig};

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {message}")]
    Parse { path: PathBuf, message: String },
}

/// Complete bridge configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ScytheConfig {
    #[serde(default)]
    pub socket: SocketConfig,

    #[serde(default)]
    pub polling: PollingConfig,

    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

impl ScytheConfig {
    /// Load configuration from all sources.
    pub fn load() -> Result<Self, ConfigError> {
        let (config, _sources) = Self::load_with_sources_from(None)?;
        Ok(config)
    }

    /// Load with an explicit file taking the place of `./scythe.toml`.
    pub fn load_from(config_path: Option<&std::path::Path>) -> Result<Self, ConfigError> {
        let (config, _sources) = Self::load_with_sources_from(config_path)?;
        Ok(config)
    }

    /// Load configuration and report which files and env vars contributed.
    pub fn load_with_sources_from(
        config_path: Option<&std::path::Path>,
    ) -> Result<(Self, ConfigSources), ConfigError> {
        let mut sources = ConfigSources::default();
        let mut config = ScytheConfig::default();

        for path in loader::discover_config_files_with_override(config_path) {
            loader::apply_file(&mut config, &path)?;
            sources.files.push(path);
        }

        loader::apply_env_overrides(&mut config, &mut sources);

        Ok((config, sources))
    }

    /// Serialize config to a TOML string.
    pub fn to_toml(&self) -> String {
        let mut output = String::new();

        output.push_str("# Scythe bridge configuration\n\n");

        output.push_str("[socket]\n");
        output.push_str(&format!("host = \"{}\"\n", self.socket.host));
        output.push_str(&format!("port = {}\n", self.socket.port));
        output.push_str(&format!(
            "reconnect_interval_ms = {}\n",
            self.socket.reconnect_interval_ms
        ));
        output.push_str(&format!("recv_timeout_ms = {}\n", self.socket.recv_timeout_ms));
        output.push_str(&format!(
            "request_timeout_ms = {}\n",
            self.socket.request_timeout_ms
        ));

        output.push_str("\n[polling]\n");
        output.push_str(&format!("dir = \"{}\"\n", self.polling.dir.display()));
        output.push_str(&format!("command_file = \"{}\"\n", self.polling.command_file));
        output.push_str(&format!("response_file = \"{}\"\n", self.polling.response_file));
        output.push_str(&format!("interval_ms = {}\n", self.polling.interval_ms));
        output.push_str(&format!(
            "response_timeout_ms = {}\n",
            self.polling.response_timeout_ms
        ));
        output.push_str(&format!("response_poll_ms = {}\n", self.polling.response_poll_ms));

        output.push_str("\n[telemetry]\n");
        output.push_str(&format!("log_level = \"{}\"\n", self.telemetry.log_level));

        output
    }
}
