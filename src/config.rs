//! Configuration file parser for ~/.config/newsdesk/config.toml.
//!
//! The config file is optional: a missing file yields `Config::default()`.
//! Unknown keys are ignored by serde, though we log a warning when the file
//! contains potential typos.
use secrecy::SecretString;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Environment variable that overrides `api_key` from the file.
pub const API_KEY_ENV: &str = "NEWS_API_KEY";

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Config file too large: {0}")]
    TooLarge(String),
}

// ============================================================================
// Configuration Structs
// ============================================================================

/// Top-level application configuration.
///
/// All fields use `#[serde(default)]` so any subset of keys can be specified.
/// The `Debug` impl masks `api_key`.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// News API key (alternative to the NEWS_API_KEY env var).
    /// Env var takes precedence over config file.
    pub api_key: Option<String>,

    /// API root; `/top-headlines` is appended.
    pub base_url: String,

    /// Two-letter country code passed to the API.
    pub country: String,

    /// Headline category passed to the API.
    pub category: String,

    /// Per-request timeout, covering connect and body read.
    pub request_timeout_secs: u64,

    /// Refresh interval for `watch` in minutes. 0 = manual refresh only.
    pub refresh_interval_minutes: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://newsapi.org/v2".to_string(),
            country: "id".to_string(),
            category: "science".to_string(),
            request_timeout_secs: Self::DEFAULT_TIMEOUT_SECS,
            refresh_interval_minutes: 0,
        }
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("base_url", &self.base_url)
            .field("country", &self.country)
            .field("category", &self.category)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("refresh_interval_minutes", &self.refresh_interval_minutes)
            .finish()
    }
}

impl Config {
    /// Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    const DEFAULT_TIMEOUT_SECS: u64 = 30;

    /// Load configuration from a TOML file.
    ///
    /// - Missing file → `Ok(Config::default())`
    /// - Empty file → `Ok(Config::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    /// - Unknown keys → accepted, logged as warning
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > Self::MAX_FILE_SIZE => {
                return Err(ConfigError::TooLarge(format!(
                    "Config file is {} bytes (max {} bytes)",
                    meta.len(),
                    Self::MAX_FILE_SIZE
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
            Ok(_) => {}
        }

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                // File deleted between metadata and read
                tracing::debug!(path = %path.display(), "Config file disappeared, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        if content.trim().is_empty() {
            tracing::debug!(path = %path.display(), "Config file is empty, using defaults");
            return Ok(Self::default());
        }

        if let Ok(raw) = content.parse::<toml::Table>() {
            let known_keys = [
                "api_key",
                "base_url",
                "country",
                "category",
                "request_timeout_secs",
                "refresh_interval_minutes",
            ];
            for key in raw.keys() {
                if !known_keys.contains(&key.as_str()) {
                    tracing::warn!(key = %key, "Unknown key in config file, ignoring");
                }
            }
        }

        let config: Config = toml::from_str(&content)?;
        tracing::info!(
            path = %path.display(),
            country = %config.country,
            category = %config.category,
            "Loaded configuration"
        );
        Ok(config)
    }

    /// Per-request timeout; `0` falls back to the default with a warning.
    pub fn request_timeout(&self) -> Duration {
        if self.request_timeout_secs == 0 {
            tracing::warn!(
                default_secs = Self::DEFAULT_TIMEOUT_SECS,
                "request_timeout_secs = 0 is not usable, using the default"
            );
            return Duration::from_secs(Self::DEFAULT_TIMEOUT_SECS);
        }
        Duration::from_secs(self.request_timeout_secs)
    }

    /// The API key to use: `NEWS_API_KEY` if set and non-empty, else the file's.
    pub fn api_key(&self) -> Option<SecretString> {
        let from_env = std::env::var(API_KEY_ENV).ok();
        Self::pick_api_key(from_env, self.api_key.clone())
    }

    fn pick_api_key(from_env: Option<String>, from_file: Option<String>) -> Option<SecretString> {
        from_env
            .filter(|k| !k.trim().is_empty())
            .or(from_file.filter(|k| !k.trim().is_empty()))
            .map(SecretString::from)
    }
}

// ============================================================================
// Tests
// ============================================================================
