//! Session configuration management.
//!
//! Holds the retry delay, transport timeout, caching default and the
//! transport/auth endpoints used by sessions.
//!
//! Configuration is stored at `~/.config/siteconn/config.json`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Application name used for the config directory path
const APP_NAME: &str = "siteconn";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Pause before the single re-authentication retry in `Session::init`.
const DEFAULT_RETRY_DELAY_MS: u64 = 3000;

/// HTTP request timeout in seconds.
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

const DEFAULT_PROBE_PATH: &str = "_api/contextinfo";
const DEFAULT_RESOLVE_PATH: &str = "_api/site/openWebById";
const DEFAULT_AMBIENT_TOKEN_ENV: &str = "SITECONN_AMBIENT_TOKEN";

const ENV_RETRY_DELAY_MS: &str = "SITECONN_RETRY_DELAY_MS";
const ENV_REQUEST_TIMEOUT_SECS: &str = "SITECONN_REQUEST_TIMEOUT_SECS";
const ENV_CACHING: &str = "SITECONN_CACHING";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SessionConfig {
    pub retry_delay_ms: u64,
    pub request_timeout_secs: u64,
    /// Whether new sessions start with their resource caches enabled.
    pub caching_enabled: bool,
    pub probe_path: String,
    pub resolve_path: String,
    /// Enables the derived-token mechanism when set.
    pub token_endpoint: Option<String>,
    pub ambient_token_env: String,
    /// Enables LRU eviction of registered sessions when set.
    pub max_sessions: Option<usize>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            retry_delay_ms: DEFAULT_RETRY_DELAY_MS,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            caching_enabled: true,
            probe_path: DEFAULT_PROBE_PATH.to_string(),
            resolve_path: DEFAULT_RESOLVE_PATH.to_string(),
            token_endpoint: None,
            ambient_token_env: DEFAULT_AMBIENT_TOKEN_ENV.to_string(),
            max_sessions: None,
        }
    }
}

impl SessionConfig {
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))
        } else {
            Ok(Self::default())
        }
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Apply overrides from the environment (and a `.env` file, if present).
    pub fn apply_env(mut self) -> Self {
        let _ = dotenvy::dotenv();

        if let Some(ms) = env_parse::<u64>(ENV_RETRY_DELAY_MS) {
            self.retry_delay_ms = ms;
        }
        if let Some(secs) = env_parse::<u64>(ENV_REQUEST_TIMEOUT_SECS) {
            self.request_timeout_secs = secs;
        }
        if let Some(enabled) = env_parse::<bool>(ENV_CACHING) {
            self.caching_enabled = enabled;
        }
        self
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }
}

fn env_parse<T: std::str::FromStr>(var: &str) -> Option<T> {
    let raw = std::env::var(var).ok()?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(var = var, value = %raw, "Ignoring unparseable config override");
            None
        }
    }
}
