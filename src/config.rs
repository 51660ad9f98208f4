//! Configuration management for session-hash-store.
//!
//! Configuration is loaded with the following priority (highest to lowest):
//! 1. Environment variables
//! 2. Configuration file (JSON)
//! 3. Default values

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::repository::{RepositoryConfig, DEFAULT_MAX_INACTIVE_INTERVAL_SECS, DEFAULT_NAMESPACE};

/// Library configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Session repository configuration.
    pub repository: RepositorySection,
    /// Logging configuration.
    pub logging: LoggingSection,
}

/// Repository configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RepositorySection {
    /// Namespace prepended to session keys.
    pub namespace: String,
    /// Max inactive interval for new sessions, in seconds. Negative never expires.
    pub default_max_inactive_interval_secs: i32,
}

impl Default for RepositorySection {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_string(),
            default_max_inactive_interval_secs: DEFAULT_MAX_INACTIVE_INTERVAL_SECS,
        }
    }
}

/// Logging configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Log level (error, warn, info, debug, trace).
    pub level: String,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::Io)?;
        serde_json::from_str(&content).map_err(ConfigError::Json)
    }

    /// Apply environment variable overrides.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        if let Ok(namespace) = std::env::var("SESSION_STORE_NAMESPACE") {
            self.repository.namespace = namespace;
        }

        if let Ok(interval) = std::env::var("SESSION_STORE_MAX_INACTIVE_INTERVAL") {
            self.repository.default_max_inactive_interval_secs = interval
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidInterval(interval))?;
        }

        if let Ok(level) = std::env::var("SESSION_STORE_LOG_LEVEL") {
            self.logging.level = level;
        } else if let Ok(level) = std::env::var("RUST_LOG") {
            self.logging.level = level;
        }

        Ok(())
    }

    /// Load configuration with full priority chain.
    ///
    /// Priority: env vars > config file > defaults
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Config::from_file(path)?,
            None => Config::default(),
        };

        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Check that the settings can be used to build store keys.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let namespace = &self.repository.namespace;
        if namespace.is_empty() || namespace.chars().any(char::is_whitespace) {
            return Err(ConfigError::InvalidNamespace(namespace.clone()));
        }
        Ok(())
    }

    /// Convert to the settings used by a session repository.
    pub fn repository_config(&self) -> RepositoryConfig {
        RepositoryConfig {
            namespace: self.repository.namespace.clone(),
            default_max_inactive_interval_secs: self
                .repository
                .default_max_inactive_interval_secs,
        }
    }

    /// Get the log level filter string.
    pub fn log_filter(&self) -> &str {
        &self.logging.level
    }
}

/// Configuration errors.
#[derive(Debug)]
pub enum ConfigError {
    /// IO error reading config file.
    Io(std::io::Error),
    /// JSON parsing error.
    Json(serde_json::Error),
    /// Namespace cannot be used in store keys.
    InvalidNamespace(String),
    /// Interval override is not an integer.
    InvalidInterval(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "failed to read config file: {}", e),
            Self::Json(e) => write!(f, "failed to parse config file: {}", e),
            Self::InvalidNamespace(ns) => write!(f, "invalid key namespace: {:?}", ns),
            Self::InvalidInterval(value) => {
                write!(f, "invalid max inactive interval: {:?}", value)
            }
        }
    }
}

impl std::error::Error for ConfigError {}
