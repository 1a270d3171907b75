//! Config file discovery, loading, and environment variable overlay.

use crate::{ConfigError, ScytheConfig};
use std::env;
use std::path::{Path, PathBuf};

/// Information about where config values came from.
#[derive(Debug, Clone, Default)]
pub struct ConfigSources {
    /// Config files that were loaded (in order)
    pub files: Vec<PathBuf>,
    /// Environment variables that overrode config values
    pub env_overrides: Vec<String>,
}

/// Discover config files in standard locations.
///
/// Returns paths in load order (system, user, local). Only existing files
/// are returned.
pub fn discover_config_files() -> Vec<PathBuf> {
    discover_config_files_with_override(None)
}

/// Discover config files, optionally with a CLI override path.
///
/// If `cli_path` is provided and exists, it replaces the local override.
pub fn discover_config_files_with_override(cli_path: Option<&Path>) -> Vec<PathBuf> {
    let mut files = Vec::new();

    let system = PathBuf::from("/etc/scythe/config.toml");
    if system.exists() {
        files.push(system);
    }

    if let Some(config_dir) = directories::BaseDirs::new().map(|d| d.config_dir().to_path_buf()) {
        let user = config_dir.join("scythe/config.toml");
        if user.exists() {
            files.push(user);
        }
    }

    if let Some(path) = cli_path {
        if path.exists() {
            files.push(path.to_path_buf());
            return files;
        }
    }

    let local = PathBuf::from("scythe.toml");
    if local.exists() {
        files.push(local);
    }

    files
}

/// Read a TOML file and overlay the keys it sets onto `config`.
pub fn apply_file(config: &mut ScytheConfig, path: &Path) -> Result<(), ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
        path: path.to_path_buf(),
        source: e,
    })?;

    apply_toml(config, &contents, path)
}

/// Overlay only the keys present in `contents`; absent keys keep whatever
/// earlier sources set.
fn apply_toml(config: &mut ScytheConfig, contents: &str, path: &Path) -> Result<(), ConfigError> {
    let table: toml::Table = contents.parse().map_err(|e: toml::de::Error| ConfigError::Parse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    let bad = |key: &str| ConfigError::Parse {
        path: path.to_path_buf(),
        message: format!("invalid value for {}", key),
    };

    if let Some(socket) = table.get("socket").and_then(|v| v.as_table()) {
        if let Some(v) = socket.get("host").and_then(|v| v.as_str()) {
            config.socket.host = v.to_string();
        }
        if let Some(v) = socket.get("port").and_then(|v| v.as_integer()) {
            config.socket.port = u16::try_from(v).map_err(|_| bad("socket.port"))?;
        }
        if let Some(v) = socket.get("reconnect_interval_ms").and_then(|v| v.as_integer()) {
            config.socket.reconnect_interval_ms =
                u64::try_from(v).map_err(|_| bad("socket.reconnect_interval_ms"))?;
        }
        if let Some(v) = socket.get("recv_timeout_ms").and_then(|v| v.as_integer()) {
            config.socket.recv_timeout_ms =
                u64::try_from(v).map_err(|_| bad("socket.recv_timeout_ms"))?;
        }
        if let Some(v) = socket.get("request_timeout_ms").and_then(|v| v.as_integer()) {
            config.socket.request_timeout_ms =
                u64::try_from(v).map_err(|_| bad("socket.request_timeout_ms"))?;
        }
    }

    if let Some(polling) = table.get("polling").and_then(|v| v.as_table()) {
        if let Some(v) = polling.get("dir").and_then(|v| v.as_str()) {
            config.polling.dir = expand_path(v);
        }
        if let Some(v) = polling.get("command_file").and_then(|v| v.as_str()) {
            config.polling.command_file = v.to_string();
        }
        if let Some(v) = polling.get("response_file").and_then(|v| v.as_str()) {
            config.polling.response_file = v.to_string();
        }
        if let Some(v) = polling.get("interval_ms").and_then(|v| v.as_integer()) {
            config.polling.interval_ms = u64::try_from(v).map_err(|_| bad("polling.interval_ms"))?;
        }
        if let Some(v) = polling.get("response_timeout_ms").and_then(|v| v.as_integer()) {
            config.polling.response_timeout_ms =
                u64::try_from(v).map_err(|_| bad("polling.response_timeout_ms"))?;
        }
        if let Some(v) = polling.get("response_poll_ms").and_then(|v| v.as_integer()) {
            config.polling.response_poll_ms =
                u64::try_from(v).map_err(|_| bad("polling.response_poll_ms"))?;
        }
    }

    if let Some(telemetry) = table.get("telemetry").and_then(|v| v.as_table()) {
        if let Some(v) = telemetry.get("log_level").and_then(|v| v.as_str()) {
            config.telemetry.log_level = v.to_string();
        }
    }

    Ok(())
}

/// Apply environment variable overrides to config.
pub fn apply_env_overrides(config: &mut ScytheConfig, sources: &mut ConfigSources) {
    apply_overrides_from(config, sources, |key| env::var(key).ok());
}

/// Same as [`apply_env_overrides`] with an injectable lookup.
pub fn apply_overrides_from(
    config: &mut ScytheConfig,
    sources: &mut ConfigSources,
    lookup: impl Fn(&str) -> Option<String>,
) {
    if let Some(v) = lookup("SCYTHE_HOST") {
        config.socket.host = v;
        sources.env_overrides.push("SCYTHE_HOST".to_string());
    }
    if let Some(v) = lookup("SCYTHE_PORT") {
        if let Ok(port) = v.parse() {
            config.socket.port = port;
            sources.env_overrides.push("SCYTHE_PORT".to_string());
        }
    }
    if let Some(v) = lookup("SCYTHE_RECONNECT_INTERVAL_MS") {
        if let Ok(ms) = v.parse() {
            config.socket.reconnect_interval_ms = ms;
            sources.env_overrides.push("SCYTHE_RECONNECT_INTERVAL_MS".to_string());
        }
    }

    if let Some(v) = lookup("SCYTHE_POLL_DIR") {
        config.polling.dir = expand_path(&v);
        sources.env_overrides.push("SCYTHE_POLL_DIR".to_string());
    }
    if let Some(v) = lookup("SCYTHE_POLL_INTERVAL_MS") {
        if let Ok(ms) = v.parse() {
            config.polling.interval_ms = ms;
            sources.env_overrides.push("SCYTHE_POLL_INTERVAL_MS".to_string());
        }
    }

    if let Some(v) = lookup("SCYTHE_LOG_LEVEL") {
        config.telemetry.log_level = v;
        sources.env_overrides.push("SCYTHE_LOG_LEVEL".to_string());
    }
    // RUST_LOG wins over everything, as with any tracing-subscriber binary
    if let Some(v) = lookup("RUST_LOG") {
        config.telemetry.log_level = v;
        sources.env_overrides.push("RUST_LOG".to_string());
    }
}

/// Expand `~/` and a leading `$VAR/` in a path.
pub fn expand_path(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = directories::BaseDirs::new().map(|d| d.home_dir().to_path_buf()) {
            return home.join(stripped);
        }
    } else if let Some(stripped) = path.strip_prefix('$') {
        let (var_name, rest) = match stripped.find('/') {
            Some(slash_pos) => (&stripped[..slash_pos], Some(&stripped[slash_pos + 1..])),
            None => (stripped, None),
        };
        if let Ok(var_value) = env::var(var_name) {
            let base = PathBuf::from(var_value);
            return match rest {
                Some(rest) => base.join(rest),
                None => base,
            };
        }
    }
    PathBuf::from(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_expand_path_tilde() {
        let expanded = expand_path("~/test/path");
        assert!(!expanded.to_string_lossy().starts_with('~'));
        assert!(expanded.to_string_lossy().contains("test/path"));
    }

    #[test]
    fn test_expand_path_absolute() {
        assert_eq!(expand_path("/absolute/path"), PathBuf::from("/absolute/path"));
    }

    #[test]
    fn test_discover_config_files() {
        // Just verify it doesn't panic
        let _files = discover_config_files();
    }

    #[test]
    fn test_parse_partial_toml_keeps_defaults() {
        let mut config = ScytheConfig::default();
        apply_toml(&mut config, "[socket]\nport = 9999\n", Path::new("test.toml")).unwrap();
        assert_eq!(config.socket.port, 9999);
        assert_eq!(config.socket.host, "127.0.0.1");
        assert_eq!(config.polling.interval_ms, 100);
    }

    #[test]
    fn test_later_file_only_overrides_what_it_sets() {
        let mut config = ScytheConfig::default();
        apply_toml(
            &mut config,
            "[socket]\nport = 7000\n[polling]\ninterval_ms = 250\n",
            Path::new("system.toml"),
        )
        .unwrap();
        apply_toml(&mut config, "[polling]\ninterval_ms = 50\n", Path::new("local.toml")).unwrap();

        assert_eq!(config.socket.port, 7000);
        assert_eq!(config.polling.interval_ms, 50);
    }

    #[test]
    fn test_parse_full_toml() {
        let toml = r#"
[socket]
host = "0.0.0.0"
port = 9000
reconnect_interval_ms = 1000
recv_timeout_ms = 20
request_timeout_ms = 750

[polling]
dir = "/data/scythe"
command_file = "cmd.json"
response_file = "resp.json"
interval_ms = 25
response_timeout_ms = 900
response_poll_ms = 10

[telemetry]
log_level = "debug"
"#;
        let mut config = ScytheConfig::default();
        apply_toml(&mut config, toml, Path::new("test.toml")).unwrap();

        assert_eq!(config.socket.address(), "0.0.0.0:9000");
        assert_eq!(config.socket.reconnect_interval_ms, 1000);
        assert_eq!(config.socket.recv_timeout_ms, 20);
        assert_eq!(config.socket.request_timeout_ms, 750);
        assert_eq!(config.polling.command_path(), PathBuf::from("/data/scythe/cmd.json"));
        assert_eq!(config.polling.response_path(), PathBuf::from("/data/scythe/resp.json"));
        assert_eq!(config.polling.interval_ms, 25);
        assert_eq!(config.polling.response_timeout_ms, 900);
        assert_eq!(config.polling.response_poll_ms, 10);
        assert_eq!(config.telemetry.log_level, "debug");
    }

    #[test]
    fn test_out_of_range_port_is_an_error() {
        let mut config = ScytheConfig::default();
        let err = apply_toml(&mut config, "[socket]\nport = 70000\n", Path::new("bad.toml"))
            .unwrap_err();
        assert!(err.to_string().contains("socket.port"));
    }

    #[test]
    fn test_invalid_toml_is_an_error() {
        let mut config = ScytheConfig::default();
        assert!(matches!(
            apply_toml(&mut config, "[socket\nport = ", Path::new("bad.toml")),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn test_apply_file_from_disk() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[telemetry]\nlog_level = \"trace\"").unwrap();

        let mut config = ScytheConfig::default();
        apply_file(&mut config, file.path()).unwrap();
        assert_eq!(config.telemetry.log_level, "trace");
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("SCYTHE_PORT", "9100"),
            ("SCYTHE_POLL_DIR", "/var/tmp/scythe"),
            ("SCYTHE_POLL_INTERVAL_MS", "not-a-number"),
            ("SCYTHE_LOG_LEVEL", "warn"),
            ("RUST_LOG", "scythe_host=debug"),
        ]
        .into_iter()
        .collect();

        let mut config = ScytheConfig::default();
        let mut sources = ConfigSources::default();
        apply_overrides_from(&mut config, &mut sources, |k| {
            env.get(k).map(|v| v.to_string())
        });

        assert_eq!(config.socket.port, 9100);
        assert_eq!(config.polling.dir, PathBuf::from("/var/tmp/scythe"));
        assert_eq!(config.polling.interval_ms, 100, "unparseable values are ignored");
        assert_eq!(config.telemetry.log_level, "scythe_host=debug");
        assert_eq!(
            sources.env_overrides,
            vec!["SCYTHE_PORT", "SCYTHE_POLL_DIR", "SCYTHE_LOG_LEVEL", "RUST_LOG"]
        );
    }
}
