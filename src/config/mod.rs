use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::error;

const DEFAULT_PORT: u16 = 4700;
const DEFAULT_SCAN_INTERVAL_SECS: u64 = 3600;

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

/// Optional layer read from `{data_dir}/config.toml`.
/// Priority: CLI / env var  >  TOML  >  built-in default.
#[derive(Deserialize, Default)]
struct TomlConfig {
    /// WebSocket server port (default: 4700).
    port: Option<u16>,
    /// Log level filter string, e.g. "debug", "info,tempod=trace" (default: "info").
    log: Option<String>,
    /// Bind address for the WebSocket server (default: "127.0.0.1").
    bind_address: Option<String>,
    /// Seconds between deadline sweeps (default: 3600; 0 = disabled).
    deadline_scan_interval_secs: Option<u64>,
    /// Slow-query log threshold in milliseconds (default: 0 = disabled).
    slow_query_ms: Option<u64>,
    /// Log output format: "pretty" (default) | "json".
    log_format: Option<String>,
}

fn load_toml(data_dir: &Path) -> Option<TomlConfig> {
    let path = data_dir.join("config.toml");
    let contents = std::fs::read_to_string(&path).ok()?;
    match toml::from_str::<TomlConfig>(&contents) {
        Ok(cfg) => Some(cfg),
        Err(e) => {
            error!(path = %path.display(), err = %e, "failed to parse config.toml — using defaults");
            None
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DaemonConfig {
    pub port: u16,
    pub data_dir: PathBuf,
    pub log: String,
    /// Bind address for the WebSocket server (TEMPOD_BIND env var).
    pub bind_address: String,
    /// Seconds between deadline sweeps; 0 disables the background loop.
    pub deadline_scan_interval_secs: u64,
    /// Queries slower than this are logged at WARN; 0 disables.
    pub slow_query_ms: u64,
    /// Log output format: "pretty" (default) | "json".
    pub log_format: String,
}

impl DaemonConfig {
    /// Build config from CLI/env args + optional TOML file.
    ///
    /// Priority (highest to lowest):
    ///   1. CLI / env — passed as `Some(value)` from clap
    ///   2. TOML file at `{data_dir}/config.toml`
    ///   3. Built-in defaults
    pub fn new(
        port: Option<u16>,
        data_dir: Option<PathBuf>,
        log: Option<String>,
        bind_address: Option<String>,
    ) -> Self {
        let data_dir = data_dir.unwrap_or_else(default_data_dir);
        let toml = load_toml(&data_dir).unwrap_or_default();

        let port = port.or(toml.port).unwrap_or(DEFAULT_PORT);
        let log = log.or(toml.log).unwrap_or_else(|| "info".to_string());
        let bind_address = bind_address
            .or(std::env::var("TEMPOD_BIND").ok().filter(|s| !s.is_empty()))
            .or(toml.bind_address)
            .unwrap_or_else(default_bind_address);
        let deadline_scan_interval_secs = toml
            .deadline_scan_interval_secs
            .unwrap_or(DEFAULT_SCAN_INTERVAL_SECS);
        let slow_query_ms = toml.slow_query_ms.unwrap_or(0);
        let log_format = std::env::var("TEMPOD_LOG_FORMAT")
            .ok()
            .filter(|s| !s.is_empty())
            .or(toml.log_format)
            .unwrap_or_else(|| "pretty".to_string());

        Self {
            port,
            data_dir,
            log,
            bind_address,
            deadline_scan_interval_secs,
            slow_query_ms,
            log_format,
        }
    }
}

fn default_data_dir() -> PathBuf {
    #[cfg(target_os = "macos")]
    {
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home)
                .join("Library")
                .join("Application Support")
                .join("tempod");
        }
    }
    #[cfg(target_os = "linux")]
    {
        if let Ok(xdg) = std::env::var("XDG_DATA_HOME") {
            if !xdg.is_empty() {
                return PathBuf::from(xdg).join("tempod");
            }
        }
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home).join(".local").join("share").join("tempod");
        }
    }
    PathBuf::from(".tempod")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_without_toml() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = DaemonConfig::new(None, Some(dir.path().to_path_buf()), None, None);
        assert_eq!(cfg.port, DEFAULT_PORT);
        assert_eq!(cfg.deadline_scan_interval_secs, DEFAULT_SCAN_INTERVAL_SECS);
        assert_eq!(cfg.log, "info");
    }

    #[test]
    fn test_cli_overrides_toml() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("config.toml"),
            "port = 5000\nlog = \"debug\"\ndeadline_scan_interval_secs = 60\n",
        )
        .unwrap();

        let cfg = DaemonConfig::new(Some(6000), Some(dir.path().to_path_buf()), None, None);
        assert_eq!(cfg.port, 6000); // CLI wins
        assert_eq!(cfg.log, "debug"); // TOML fills the gap
        assert_eq!(cfg.deadline_scan_interval_secs, 60);
    }
}
