//! Configuration loading.
//!
//! Read from `~/.session-relay/config.toml` unless a path is given. A missing
//! file means defaults; a malformed file is an error naming the path.
//!
//! ```toml
//! [remote]
//! base_url = "http://127.0.0.1:5000/api"
//! timeout_ms = 10000
//!
//! [cadence]
//! baseline_content_ms = 30000
//! accelerated_content_ms = 5000
//! baseline_status_ms = 5000
//! accelerated_status_ms = 2000
//! decay_after_ms = 10000
//!
//! [resolution]
//! max_attempts = 10
//! retry_delay_ms = 2000
//!
//! [storage]
//! preferences_path = "~/.session-relay/preferences.json"
//! log_dir = "~/.session-relay/logs"
//! ```

use std::env;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{RelayError, Result};

pub const URL_ENV: &str = "SESSION_RELAY_URL";
const DATA_DIR_NAME: &str = ".session-relay";
const CONFIG_FILE_NAME: &str = "config.toml";
const PREFERENCES_FILE_NAME: &str = "preferences.json";

/// Upper bound for every configured period, delay and timeout (24 hours).
pub const MAX_PERIOD_MS: u64 = 24 * 60 * 60 * 1000;

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct RemoteConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
pub struct CadenceConfig {
    #[serde(default = "default_baseline_content_ms")]
    pub baseline_content_ms: u64,
    #[serde(default = "default_accelerated_content_ms")]
    pub accelerated_content_ms: u64,
    #[serde(default = "default_baseline_status_ms")]
    pub baseline_status_ms: u64,
    #[serde(default = "default_accelerated_status_ms")]
    pub accelerated_status_ms: u64,
    /// Quiet window after the last confirmed change before both cadences
    /// fall back to baseline.
    #[serde(default = "default_decay_after_ms")]
    pub decay_after_ms: u64,
}

impl Default for CadenceConfig {
    fn default() -> Self {
        Self {
            baseline_content_ms: default_baseline_content_ms(),
            accelerated_content_ms: default_accelerated_content_ms(),
            baseline_status_ms: default_baseline_status_ms(),
            accelerated_status_ms: default_accelerated_status_ms(),
            decay_after_ms: default_decay_after_ms(),
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
pub struct ResolutionConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

impl Default for ResolutionConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            retry_delay_ms: default_retry_delay_ms(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default, PartialEq, Eq)]
pub struct StorageConfig {
    #[serde(default)]
    pub preferences_path: Option<String>,
    #[serde(default)]
    pub log_dir: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default, PartialEq, Eq)]
pub struct RelayConfig {
    #[serde(default)]
    pub remote: RemoteConfig,
    #[serde(default)]
    pub cadence: CadenceConfig,
    #[serde(default)]
    pub resolution: ResolutionConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

impl RelayConfig {
    /// Loads from `path`, or the default location when `None`, then applies
    /// the `SESSION_RELAY_URL` override and validates.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = match path {
            Some(path) => path.to_path_buf(),
            None => default_config_path()?,
        };
        let mut config = load_file(&config_path)?;
        if let Ok(url) = env::var(URL_ENV) {
            if !url.trim().is_empty() {
                config.remote.base_url = url.trim().to_string();
            }
        }
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let cadence = &self.cadence;
        let bounded = [
            ("cadence.baseline_content_ms", cadence.baseline_content_ms),
            ("cadence.accelerated_content_ms", cadence.accelerated_content_ms),
            ("cadence.baseline_status_ms", cadence.baseline_status_ms),
            ("cadence.accelerated_status_ms", cadence.accelerated_status_ms),
            ("cadence.decay_after_ms", cadence.decay_after_ms),
            ("resolution.retry_delay_ms", self.resolution.retry_delay_ms),
            ("remote.timeout_ms", self.remote.timeout_ms),
        ];
        if let Some((name, value)) = bounded.iter().find(|(_, value)| *value > MAX_PERIOD_MS) {
            return Err(RelayError::ConfigInvalid(format!(
                "{} must not exceed {} ms, got {}",
                name, MAX_PERIOD_MS, value
            )));
        }
        if cadence.accelerated_content_ms == 0 || cadence.accelerated_status_ms == 0 {
            return Err(RelayError::ConfigInvalid(
                "accelerated periods must be greater than zero".to_string(),
            ));
        }
        if cadence.accelerated_content_ms > cadence.baseline_content_ms {
            return Err(RelayError::ConfigInvalid(
                "accelerated_content_ms must not exceed baseline_content_ms".to_string(),
            ));
        }
        if cadence.accelerated_status_ms > cadence.baseline_status_ms {
            return Err(RelayError::ConfigInvalid(
                "accelerated_status_ms must not exceed baseline_status_ms".to_string(),
            ));
        }
        if self.resolution.max_attempts == 0 {
            return Err(RelayError::ConfigInvalid(
                "resolution.max_attempts must be at least 1".to_string(),
            ));
        }
        if !self.remote.base_url.starts_with("http://")
            && !self.remote.base_url.starts_with("https://")
        {
            return Err(RelayError::ConfigInvalid(format!(
                "remote.base_url must be an http(s) URL: {}",
                self.remote.base_url
            )));
        }
        Ok(())
    }

    pub fn preferences_path(&self) -> Result<PathBuf> {
        match &self.storage.preferences_path {
            Some(path) => Ok(expand_home(path)),
            None => Ok(data_dir()?.join(PREFERENCES_FILE_NAME)),
        }
    }

    pub fn log_dir(&self) -> Option<PathBuf> {
        self.storage.log_dir.as_deref().map(expand_home)
    }
}

fn load_file(path: &Path) -> Result<RelayConfig> {
    if !path.exists() {
        return Ok(RelayConfig::default());
    }
    let content = fs_err::read_to_string(path)
        .map_err(|err| RelayError::io(format!("reading {}", path.display()), err))?;
    toml::from_str::<RelayConfig>(&content).map_err(|err| RelayError::ConfigMalformed {
        path: path.to_path_buf(),
        details: err.to_string(),
    })
}

/// Returns `~/.session-relay`.
pub fn data_dir() -> Result<PathBuf> {
    dirs::home_dir()
        .map(|home| home.join(DATA_DIR_NAME))
        .ok_or_else(|| RelayError::ConfigInvalid("Home directory not found".to_string()))
}

pub fn default_config_path() -> Result<PathBuf> {
    Ok(data_dir()?.join(CONFIG_FILE_NAME))
}

fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

fn default_base_url() -> String {
    "http://127.0.0.1:5000/api".to_string()
}

fn default_timeout_ms() -> u64 {
    10_000
}

fn default_baseline_content_ms() -> u64 {
    30_000
}

fn default_accelerated_content_ms() -> u64 {
    5_000
}

fn default_baseline_status_ms() -> u64 {
    5_000
}

fn default_accelerated_status_ms() -> u64 {
    2_000
}

fn default_decay_after_ms() -> u64 {
    10_000
}

fn default_max_attempts() -> u32 {
    10
}

fn default_retry_delay_ms() -> u64 {
    2_000
}
