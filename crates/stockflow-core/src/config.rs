//! Application configuration
//!
//! Configuration is loaded from:
//! 1. Default values
//! 2. Config file (~/.config/stockflow/config.toml)
//! 3. Environment variables (STOCKFLOW_* prefix)
//!
//! Environment variables take precedence over config file values.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable prefix
const ENV_PREFIX: &str = "STOCKFLOW";

/// Default API server
const DEFAULT_API_URL: &str = "http://localhost:3000";

/// Path of the realtime endpoint when `realtime_url` is derived from `api_url`
const REALTIME_PATH: &str = "/realtime";

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Base URL of the StockFlow REST API
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Realtime channel URL (derived from `api_url` when unset)
    #[serde(default)]
    pub realtime_url: Option<String>,

    /// Directory for client state (persisted session)
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Seconds before a cached query is considered stale
    #[serde(default = "default_stale_time_secs")]
    pub stale_time_secs: u64,

    /// Default page size for list commands
    #[serde(default = "default_page_size")]
    pub page_size: u32,

    /// Write logs to this file instead of stderr
    #[serde(default)]
    pub log_file: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            realtime_url: None,
            data_dir: default_data_dir(),
            stale_time_secs: default_stale_time_secs(),
            page_size: default_page_size(),
            log_file: None,
        }
    }
}

impl Config {
    /// Load configuration from default location and environment
    ///
    /// Order of precedence (highest to lowest):
    /// 1. Environment variables (STOCKFLOW_API_URL, STOCKFLOW_REALTIME_URL, ...)
    /// 2. Config file (~/.config/stockflow/config.toml or STOCKFLOW_CONFIG)
    /// 3. Default values
    pub fn load() -> Result<Self> {
        Self::load_from_path(&Self::config_file_path())
    }

    /// Load configuration, preferring a path given on the command line
    pub fn load_with_cli_override(path: Option<&PathBuf>) -> Result<Self> {
        match path {
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
        config.ensure_data_dir()?;
        Ok(config)
    }

    /// Load configuration from a TOML string (useful for testing)
    pub fn load_from_str(toml_content: &str) -> Result<Self> {
        let mut config: Config =
            toml::from_str(toml_content).context("Failed to parse config TOML")?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var(format!("{}_API_URL", ENV_PREFIX)) {
            if !val.is_empty() {
                self.api_url = val;
            }
        }

        // Empty string clears it, falling back to the derived URL
        if let Ok(val) = std::env::var(format!("{}_REALTIME_URL", ENV_PREFIX)) {
            self.realtime_url = if val.is_empty() { None } else { Some(val) };
        }

        if let Ok(val) = std::env::var(format!("{}_DATA_DIR", ENV_PREFIX)) {
            self.data_dir = PathBuf::from(val);
        }

        if let Ok(val) = std::env::var(format!("{}_LOG_FILE", ENV_PREFIX)) {
            self.log_file = if val.is_empty() {
                None
            } else {
                Some(PathBuf::from(val))
            };
        }
    }

    /// Ensure data directory exists
    fn ensure_data_dir(&self) -> Result<()> {
        if !self.data_dir.exists() {
            std::fs::create_dir_all(&self.data_dir)
                .with_context(|| format!("Failed to create data directory: {:?}", self.data_dir))?;
        }
        Ok(())
    }

    /// Save configuration to the default file
    pub fn save(&self) -> Result<()> {
        self.save_to_path(&Self::config_file_path())
    }

    /// Save configuration to a specific file
    pub fn save_to_path(&self, config_path: &Path) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(config_path, content)
            .with_context(|| format!("Failed to write config file: {:?}", config_path))?;
        Ok(())
    }

    /// Get the config file path
    ///
    /// Can be overridden with STOCKFLOW_CONFIG environment variable
    pub fn config_file_path() -> PathBuf {
        if let Ok(path) = std::env::var(format!("{}_CONFIG", ENV_PREFIX)) {
            return PathBuf::from(path);
        }

        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("stockflow")
            .join("config.toml")
    }

    /// Path of the persisted session (the "auth-storage" key)
    pub fn session_path(&self) -> PathBuf {
        self.data_dir.join("auth-storage.json")
    }

    /// Effective realtime channel URL
    ///
    /// Falls back to `api_url` with its scheme switched to ws/wss.
    pub fn realtime_url(&self) -> String {
        if let Some(ref url) = self.realtime_url {
            return url.clone();
        }

        let base = self.api_url.trim_end_matches('/');
        let ws_base = if let Some(rest) = base.strip_prefix("https://") {
            format!("wss://{}", rest)
        } else if let Some(rest) = base.strip_prefix("http://") {
            format!("ws://{}", rest)
        } else {
            base.to_string()
        };
        format!("{}{}", ws_base, REALTIME_PATH)
    }

    /// How long fetched data stays fresh
    pub fn stale_time(&self) -> Duration {
        Duration::from_secs(self.stale_time_secs)
    }
}

fn default_api_url() -> String {
    DEFAULT_API_URL.to_string()
}

fn default_stale_time_secs() -> u64 {
    60
}

fn default_page_size() -> u32 {
    10
}

/// Get the default data directory
fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("stockflow")
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
        "STOCKFLOW_API_URL",
        "STOCKFLOW_REALTIME_URL",
        "STOCKFLOW_DATA_DIR",
        "STOCKFLOW_LOG_FILE",
    ];

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.api_url, "http://localhost:3000");
        assert!(config.realtime_url.is_none());
        assert_eq!(config.stale_time(), Duration::from_secs(60));
        assert_eq!(config.page_size, 10);
        assert!(config.data_dir.ends_with("stockflow"));
    }

    #[test]
    fn test_session_path() {
        let config = Config::default();
        assert!(config.session_path().ends_with("auth-storage.json"));
    }

    #[test]
    fn test_realtime_url_derivation() {
        let mut config = Config::default();
        assert_eq!(config.realtime_url(), "ws://localhost:3000/realtime");

        config.api_url = "https://api.example.com/".to_string();
        assert_eq!(config.realtime_url(), "wss://api.example.com/realtime");

        config.realtime_url = Some("ws://events.example.com/live".to_string());
        assert_eq!(config.realtime_url(), "ws://events.example.com/live");
    }

    #[test]
    fn test_env_override_api_url() {
        let _guard = EnvGuard::new(ENV_VARS);

        let mut config = Config::default();
        env::set_var("STOCKFLOW_API_URL", "http://stock.internal:8080");
        config.apply_env_overrides();
        assert_eq!(config.api_url, "http://stock.internal:8080");

        // Empty string keeps the current value
        env::set_var("STOCKFLOW_API_URL", "");
        config.apply_env_overrides();
        assert_eq!(config.api_url, "http://stock.internal:8080");
    }

    #[test]
    fn test_env_override_realtime_url() {
        let _guard = EnvGuard::new(ENV_VARS);

        let mut config = Config::default();
        env::set_var("STOCKFLOW_REALTIME_URL", "ws://localhost:4000/events");
        config.apply_env_overrides();
        assert_eq!(
            config.realtime_url,
            Some("ws://localhost:4000/events".to_string())
        );

        env::set_var("STOCKFLOW_REALTIME_URL", "");
        config.apply_env_overrides();
        assert!(config.realtime_url.is_none());
    }

    #[test]
    fn test_env_override_data_dir() {
        let _guard = EnvGuard::new(ENV_VARS);

        let mut config = Config::default();
        env::set_var("STOCKFLOW_DATA_DIR", "/tmp/stockflow-test");
        config.apply_env_overrides();
        assert_eq!(config.data_dir, PathBuf::from("/tmp/stockflow-test"));
    }

    #[test]
    fn test_serialization() {
        let config = Config {
            api_url: "http://api.example.com".to_string(),
            realtime_url: Some("ws://api.example.com/realtime".to_string()),
            data_dir: PathBuf::from("/data/stockflow"),
            stale_time_secs: 30,
            page_size: 25,
            log_file: None,
        };

        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("api_url"));
        assert!(toml_str.contains("stale_time_secs"));

        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.api_url, config.api_url);
        assert_eq!(parsed.realtime_url, config.realtime_url);
        assert_eq!(parsed.stale_time_secs, 30);
        assert_eq!(parsed.page_size, 25);
    }

    #[test]
    fn test_load_from_str() {
        let _guard = EnvGuard::new(ENV_VARS);

        let toml = r#"
            api_url = "http://example.com"
            data_dir = "/custom/data"
            page_size = 50
        "#;

        let config = Config::load_from_str(toml).unwrap();
        assert_eq!(config.api_url, "http://example.com");
        assert_eq!(config.data_dir, PathBuf::from("/custom/data"));
        assert_eq!(config.page_size, 50);
        assert_eq!(config.stale_time_secs, 60);
    }

    #[test]
    fn test_save_and_load_roundtrip_on_disk() {
        let _guard = EnvGuard::new(ENV_VARS);
        let temp_dir = tempfile::TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");

        let config = Config {
            data_dir: temp_dir.path().join("data"),
            page_size: 5,
            ..Config::default()
        };
        config.save_to_path(&path).unwrap();

        let loaded = Config::load_from_path(&path).unwrap();
        assert_eq!(loaded.page_size, 5);
        assert!(loaded.data_dir.exists());
    }
}
