//! SDK configuration
//!
//! Configuration is loaded from:
//! 1. Default values
//! 2. Config file (~/.config/tether/config.toml)
//! 3. Environment variables (TETHER_* prefix)
//!
//! Environment variables take precedence over config file values.
//! Durations are expressed in milliseconds; a value `<= 0` disables the
//! corresponding limit where noted.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::message::JsonObject;

/// Environment variable prefix
const ENV_PREFIX: &str = "TETHER";

/// How the SDK behaves when the connection drops
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OfflineMode {
    /// Queuing, replay and resubscription follow their own flags
    #[default]
    Manual,
    /// Queue while offline, replay and resubscribe on reconnection
    Auto,
}

/// Per-request timeout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timeout {
    /// Wait for the transport indefinitely
    Never,
    /// Fail with `RequestTimeout` after this long
    After(Duration),
}

impl Timeout {
    /// Interpret a millisecond setting; negative means no timeout
    pub fn from_millis(ms: i64) -> Self {
        if ms < 0 {
            Timeout::Never
        } else {
            Timeout::After(Duration::from_millis(ms as u64))
        }
    }

    pub fn duration(&self) -> Option<Duration> {
        match self {
            Timeout::Never => None,
            Timeout::After(d) => Some(*d),
        }
    }
}

/// WebSocket transport settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WebSocketConfig {
    /// Keep reconnecting after the connection drops
    pub auto_reconnect: bool,
    /// Initial reconnect delay
    pub initial_reconnect_delay_ms: u64,
    /// Maximum reconnect delay
    pub max_reconnect_delay_ms: u64,
    /// How long a single connection attempt may take
    pub connect_timeout_ms: u64,
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            auto_reconnect: true,
            initial_reconnect_delay_ms: 1_000,
            max_reconnect_delay_ms: 30_000,
            connect_timeout_ms: 10_000,
        }
    }
}

impl WebSocketConfig {
    pub fn initial_reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.initial_reconnect_delay_ms)
    }

    pub fn max_reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.max_reconnect_delay_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

/// SDK configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SdkConfig {
    /// Backend URL (used by the WebSocket transport)
    pub url: Option<String>,

    /// Start queuing automatically when the connection drops
    pub auto_queue: bool,

    /// Replay the offline queue automatically once reconnected
    pub auto_replay: bool,

    /// Renew realtime subscriptions automatically once reconnected
    pub auto_resubscribe: bool,

    /// Shortcut setting the three flags above
    pub offline_mode: OfflineMode,

    /// Maximum time a request may stay queued
    pub queue_ttl_ms: i64,

    /// Maximum number of queued requests
    pub queue_max_size: i64,

    /// Delay between two replayed requests
    pub replay_interval_ms: u64,

    /// Default per-request timeout, -1 for none
    pub request_timeout_ms: i64,

    /// Minimum delay between two emissions of the same protected event
    pub event_timeout_ms: u64,

    /// Minimum delay between two `tokenExpired` emissions
    pub token_expired_interval_ms: u64,

    /// Volatile data added to every request
    pub volatile: JsonObject,

    /// Name reported in every request's volatile data
    pub sdk_name: String,

    /// WebSocket transport settings
    pub websocket: WebSocketConfig,
}

impl Default for SdkConfig {
    fn default() -> Self {
        Self {
            url: None,
            auto_queue: false,
            auto_replay: false,
            auto_resubscribe: true,
            offline_mode: OfflineMode::Manual,
            queue_ttl_ms: 120_000,
            queue_max_size: 500,
            replay_interval_ms: 10,
            request_timeout_ms: -1,
            event_timeout_ms: 200,
            token_expired_interval_ms: 1_000,
            volatile: JsonObject::new(),
            sdk_name: default_sdk_name(),
            websocket: WebSocketConfig::default(),
        }
    }
}

impl SdkConfig {
    /// Load configuration from default location and environment
    pub fn load() -> Result<Self> {
        Self::load_from_path(&Self::config_file_path())
    }

    /// Load configuration, preferring a path given on the command line
    pub fn load_with_cli_override(cli_path: Option<&PathBuf>) -> Result<Self> {
        match cli_path {
            Some(path) => Self::load_from_path(path),
            None => Self::load(),
        }
    }

    /// Load configuration from a specific path
    ///
    /// Environment variables are still applied as overrides.
    /// If the file doesn't exist, defaults are used.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {:?}", path))?;
            toml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {:?}", path))?
        } else {
            Self::default()
        };

        config.apply_env_overrides();
        Ok(config.normalized())
    }

    /// Load configuration from a TOML string (useful for testing)
    pub fn load_from_str(toml_content: &str) -> Result<Self> {
        let mut config: SdkConfig =
            toml::from_str(toml_content).context("Failed to parse config TOML")?;
        config.apply_env_overrides();
        Ok(config.normalized())
    }

    /// Apply the offline mode shortcut
    pub fn normalized(mut self) -> Self {
        if self.offline_mode == OfflineMode::Auto {
            self.auto_queue = true;
            self.auto_replay = true;
            self.auto_resubscribe = true;
        }
        self
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) {
        // TETHER_URL
        if let Ok(val) = std::env::var(format!("{}_URL", ENV_PREFIX)) {
            self.url = if val.is_empty() { None } else { Some(val) };
        }

        // TETHER_OFFLINE_MODE
        if let Ok(val) = std::env::var(format!("{}_OFFLINE_MODE", ENV_PREFIX)) {
            if val.eq_ignore_ascii_case("auto") {
                self.offline_mode = OfflineMode::Auto;
            } else if val.eq_ignore_ascii_case("manual") {
                self.offline_mode = OfflineMode::Manual;
            }
        }

        // TETHER_AUTO_QUEUE, TETHER_AUTO_REPLAY
        if let Some(val) = env_bool("AUTO_QUEUE") {
            self.auto_queue = val;
        }
        if let Some(val) = env_bool("AUTO_REPLAY") {
            self.auto_replay = val;
        }

        // TETHER_REQUEST_TIMEOUT_MS
        if let Ok(val) = std::env::var(format!("{}_REQUEST_TIMEOUT_MS", ENV_PREFIX)) {
            if let Ok(ms) = val.parse() {
                self.request_timeout_ms = ms;
            }
        }
    }

    /// Get the config file path
    ///
    /// Can be overridden with TETHER_CONFIG environment variable
    pub fn config_file_path() -> PathBuf {
        if let Ok(path) = std::env::var(format!("{}_CONFIG", ENV_PREFIX)) {
            return PathBuf::from(path);
        }

        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("tether")
            .join("config.toml")
    }

    /// Queue TTL, `None` when disabled
    pub fn queue_ttl(&self) -> Option<Duration> {
        (self.queue_ttl_ms > 0).then(|| Duration::from_millis(self.queue_ttl_ms as u64))
    }

    /// Queue capacity, `None` when unbounded
    pub fn queue_max_size(&self) -> Option<usize> {
        (self.queue_max_size > 0).then_some(self.queue_max_size as usize)
    }

    pub fn replay_interval(&self) -> Duration {
        Duration::from_millis(self.replay_interval_ms)
    }

    pub fn request_timeout(&self) -> Timeout {
        Timeout::from_millis(self.request_timeout_ms)
    }

    pub fn event_timeout(&self) -> Duration {
        Duration::from_millis(self.event_timeout_ms)
    }

    pub fn token_expired_interval(&self) -> Duration {
        Duration::from_millis(self.token_expired_interval_ms)
    }
}

fn env_bool(name: &str) -> Option<bool> {
    std::env::var(format!("{}_{}", ENV_PREFIX, name))
        .ok()
        .map(|val| val.eq_ignore_ascii_case("true") || val == "1")
}

fn default_sdk_name() -> String {
    format!("tether-rust@{}", env!("CARGO_PKG_VERSION"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::Mutex;

    // Mutex to serialize tests that touch environment variables
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    /// Guard that locks env access and saves/restores env vars
    struct EnvGuard<'a> {
        _lock: std::sync::MutexGuard<'a, ()>,
        saved: Vec<(String, Option<String>)>,
    }

    impl<'a> EnvGuard<'a> {
        fn new(vars: &[&str]) -> Self {
            let lock = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
            let saved = vars
                .iter()
                .map(|&name| (name.to_string(), env::var(name).ok()))
                .collect();
            for name in vars {
                env::remove_var(name);
            }
            Self { _lock: lock, saved }
        }
    }

    impl Drop for EnvGuard<'_> {
        fn drop(&mut self) {
            for (name, value) in &self.saved {
                match value {
                    Some(v) => env::set_var(name, v),
                    None => env::remove_var(name),
                }
            }
        }
    }

    const ENV_VARS: &[&str] = &[
        "TETHER_URL",
        "TETHER_OFFLINE_MODE",
        "TETHER_AUTO_QUEUE",
        "TETHER_AUTO_REPLAY",
        "TETHER_REQUEST_TIMEOUT_MS",
    ];

    #[test]
    fn test_default_config() {
        let config = SdkConfig::default();
        assert!(!config.auto_queue);
        assert!(!config.auto_replay);
        assert!(config.auto_resubscribe);
        assert_eq!(config.queue_ttl(), Some(Duration::from_secs(120)));
        assert_eq!(config.queue_max_size(), Some(500));
        assert_eq!(config.request_timeout(), Timeout::Never);
        assert!(config.sdk_name.starts_with("tether-rust@"));
    }

    #[test]
    fn test_disabled_limits() {
        let config = SdkConfig {
            queue_ttl_ms: 0,
            queue_max_size: -1,
            ..SdkConfig::default()
        };
        assert!(config.queue_ttl().is_none());
        assert!(config.queue_max_size().is_none());
    }

    #[test]
    fn test_timeout_from_millis() {
        assert_eq!(Timeout::from_millis(-1), Timeout::Never);
        assert_eq!(
            Timeout::from_millis(1500).duration(),
            Some(Duration::from_millis(1500))
        );
    }

    #[test]
    fn test_offline_mode_auto() {
        let _guard = EnvGuard::new(ENV_VARS);

        let config = SdkConfig::load_from_str(
            r#"
            offline_mode = "auto"
            auto_resubscribe = false
        "#,
        )
        .unwrap();

        assert!(config.auto_queue);
        assert!(config.auto_replay);
        assert!(config.auto_resubscribe);
    }

    #[test]
    fn test_env_overrides() {
        let _guard = EnvGuard::new(ENV_VARS);

        let mut config = SdkConfig::default();

        env::set_var("TETHER_URL", "ws://localhost:7512");
        env::set_var("TETHER_AUTO_QUEUE", "1");
        env::set_var("TETHER_REQUEST_TIMEOUT_MS", "3000");
        config.apply_env_overrides();

        assert_eq!(config.url.as_deref(), Some("ws://localhost:7512"));
        assert!(config.auto_queue);
        assert_eq!(
            config.request_timeout(),
            Timeout::After(Duration::from_secs(3))
        );

        // Empty string clears the URL
        env::set_var("TETHER_URL", "");
        config.apply_env_overrides();
        assert!(config.url.is_none());
    }

    #[test]
    fn test_load_from_file() {
        let _guard = EnvGuard::new(ENV_VARS);

        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
            url = "wss://backend.example.com"
            queue_max_size = 10
            sdk_name = "custom"

            [volatile]
            app = "dispatch"

            [websocket]
            auto_reconnect = false
        "#,
        )
        .unwrap();

        let config = SdkConfig::load_from_path(&path).unwrap();
        assert_eq!(config.url.as_deref(), Some("wss://backend.example.com"));
        assert_eq!(config.queue_max_size(), Some(10));
        assert_eq!(config.sdk_name, "custom");
        assert_eq!(
            config.volatile.get("app"),
            Some(&serde_json::json!("dispatch"))
        );
        assert!(!config.websocket.auto_reconnect);
        assert_eq!(config.websocket.max_reconnect_delay_ms, 30_000);
    }

    #[test]
    fn test_load_from_path_missing_file() {
        let _guard = EnvGuard::new(ENV_VARS);

        let config = SdkConfig::load_from_path(Path::new("/nonexistent/config.toml")).unwrap();
        assert_eq!(config, SdkConfig::default());
    }
}
