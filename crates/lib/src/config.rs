//! Configuration types and loading.
//!
//! Config is loaded from a JSON file (e.g. `~/.optimonkey/config.json`) and environment.
//! Every field has a default, so a missing file or an empty object is a valid config.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_BASE_URL: &str = "http://localhost:8081";
pub const DEFAULT_WS_URL: &str = "ws://localhost:8081/ws/conversation";
pub const DEFAULT_RECONNECT_DELAY_MS: u64 = 3000;
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 5000;

/// Top-level application config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Backend endpoints and connection behaviour.
    #[serde(default)]
    pub backend: BackendConfig,

    /// Conversation log housekeeping.
    #[serde(default)]
    pub conversation: ConversationConfig,
}

/// Backend REST base URL, WebSocket URL, and reconnect timing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackendConfig {
    /// Base URL for the REST endpoints (default "http://localhost:8081"). Overridden by OPTIMONKEY_BACKEND_URL.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Conversation WebSocket URL. Overridden by OPTIMONKEY_WS_URL.
    #[serde(default = "default_ws_url")]
    pub ws_url: String,

    /// Fixed delay before the automatic reconnect after a dropped connection.
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,

    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

/// Conversation log settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationConfig {
    /// Heartbeat entries tolerated in the log before they are swept (default 3).
    #[serde(default = "default_control_sweep_threshold")]
    pub control_sweep_threshold: usize,
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_ws_url() -> String {
    DEFAULT_WS_URL.to_string()
}

fn default_reconnect_delay_ms() -> u64 {
    DEFAULT_RECONNECT_DELAY_MS
}

fn default_connect_timeout_ms() -> u64 {
    DEFAULT_CONNECT_TIMEOUT_MS
}

fn default_control_sweep_threshold() -> usize {
    crate::conversation::DEFAULT_CONTROL_SWEEP_THRESHOLD
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            ws_url: default_ws_url(),
            reconnect_delay_ms: default_reconnect_delay_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
        }
    }
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            control_sweep_threshold: default_control_sweep_threshold(),
        }
    }
}

/// Non-empty, trimmed value of an environment variable.
fn env_override(name: &str) -> Option<String> {
    std::env::var(name).ok().and_then(|s| {
        let t = s.trim();
        if t.is_empty() {
            None
        } else {
            Some(t.to_string())
        }
    })
}

/// Resolve the REST base URL: env OPTIMONKEY_BACKEND_URL overrides config. Trailing slashes are trimmed.
pub fn resolve_base_url(config: &Config) -> String {
    env_override("OPTIMONKEY_BACKEND_URL")
        .unwrap_or_else(|| config.backend.base_url.trim().to_string())
        .trim_end_matches('/')
        .to_string()
}

/// Resolve the conversation WebSocket URL: env OPTIMONKEY_WS_URL overrides config.
pub fn resolve_ws_url(config: &Config) -> String {
    env_override("OPTIMONKEY_WS_URL").unwrap_or_else(|| config.backend.ws_url.trim().to_string())
}

/// Resolve config path from env or default.
pub fn default_config_path() -> PathBuf {
    std::env::var("OPTIMONKEY_CONFIG_PATH").map(PathBuf::from).unwrap_or_else(|_| {
        dirs::home_dir()
            .map(|h| h.join(".optimonkey").join("config.json"))
            .unwrap_or_else(|| PathBuf::from("config.json"))
    })
}

/// Directory holding the config file (and the local settings file).
pub fn config_dir(config_path: &Path) -> PathBuf {
    config_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."))
        .to_path_buf()
}

/// Load config from the given path, or the default path (or OPTIMONKEY_CONFIG_PATH). Missing file => default config.
/// Returns the config and the path that was used.
pub fn load_config(path: Option<PathBuf>) -> Result<(Config, PathBuf)> {
    let path = path.unwrap_or_else(default_config_path);
    let config = if !path.exists() {
        log::debug!("config file not found, using defaults: {}", path.display());
        Config::default()
    } else {
        let s = std::fs::read_to_string(&path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        serde_json::from_str(&s)
            .with_context(|| format!("parsing config from {}", path.display()))?
    };
    Ok((config, path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_from_empty_object() {
        let config: Config = serde_json::from_str("{}").unwrap();
        assert_eq!(config.backend.base_url, "http://localhost:8081");
        assert_eq!(config.backend.ws_url, "ws://localhost:8081/ws/conversation");
        assert_eq!(config.backend.reconnect_delay_ms, 3000);
        assert_eq!(config.conversation.control_sweep_threshold, 3);
    }

    #[test]
    fn camel_case_keys() {
        let config: Config = serde_json::from_str(
            r#"{"backend": {"baseUrl": "http://10.0.0.2:9000/", "reconnectDelayMs": 250}}"#,
        )
        .unwrap();
        assert_eq!(config.backend.base_url, "http://10.0.0.2:9000/");
        assert_eq!(config.backend.reconnect_delay_ms, 250);
        assert_eq!(config.backend.connect_timeout_ms, 5000);
    }

    #[test]
    fn missing_file_yields_defaults() {
        let path = std::env::temp_dir()
            .join(format!("optimonkey-missing-{}", std::process::id()))
            .join("config.json");
        let (config, used) = load_config(Some(path.clone())).unwrap();
        assert_eq!(used, path);
        assert_eq!(config.backend.base_url, DEFAULT_BASE_URL);
    }

    #[test]
    fn invalid_file_is_an_error() {
        let dir = std::env::temp_dir().join(format!("optimonkey-config-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.json");
        std::fs::write(&path, "{ not json").unwrap();
        let err = load_config(Some(path.clone())).unwrap_err();
        assert!(format!("{:#}", err).contains("parsing config"));
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn config_dir_of_bare_file_is_cwd() {
        assert_eq!(config_dir(Path::new("config.json")), PathBuf::from("."));
        assert_eq!(
            config_dir(Path::new("/home/user/.optimonkey/config.json")),
            PathBuf::from("/home/user/.optimonkey")
        );
    }
}
