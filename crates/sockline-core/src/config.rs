//! ClientConfig - TOML ファイル + 環境変数による設定
//!
//! Loading order:
//! 1. built-in defaults
//! 2. TOML file (`ClientConfig::load`)
//! 3. `SOCKLINE_*` environment variables (`apply_env_overrides`)

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_PORT: u16 = 9100;
pub const DEFAULT_READ_LEN: usize = 1024;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid value for {key}: {value:?}")]
    InvalidOverride { key: String, value: String },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Runtime settings for the registry, worker pool and host defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Port used when `connect` omits one.
    pub default_port: u16,
    /// `expectLen` used when `read` omits one.
    pub default_read_len: usize,
    /// Per-address connect timeout. `None` waits for the OS.
    pub connect_timeout_ms: Option<u64>,
    /// Default send/read timeout. `None` blocks until the transport returns.
    pub io_timeout_ms: Option<u64>,
    /// Number of I/O worker contexts.
    pub workers: usize,
    /// Bounded job queue in front of the workers.
    pub queue_capacity: usize,
    pub nodelay: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            default_port: DEFAULT_PORT,
            default_read_len: DEFAULT_READ_LEN,
            connect_timeout_ms: Some(10_000),
            io_timeout_ms: None,
            workers: 4,
            queue_capacity: 64,
            nodelay: true,
        }
    }
}

impl ClientConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: ClientConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Apply `SOCKLINE_*` overrides from the process environment.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides_with(|key| env::var(key).ok())
    }

    /// Apply overrides from an arbitrary lookup (env, CLI map, tests).
    pub fn apply_overrides_with<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("SOCKLINE_DEFAULT_PORT") {
            self.default_port = parse_override("SOCKLINE_DEFAULT_PORT", &v)?;
        }
        if let Some(v) = lookup("SOCKLINE_DEFAULT_READ_LEN") {
            self.default_read_len = parse_override("SOCKLINE_DEFAULT_READ_LEN", &v)?;
        }
        if let Some(v) = lookup("SOCKLINE_CONNECT_TIMEOUT_MS") {
            self.connect_timeout_ms = parse_optional_override("SOCKLINE_CONNECT_TIMEOUT_MS", &v)?;
        }
        if let Some(v) = lookup("SOCKLINE_IO_TIMEOUT_MS") {
            self.io_timeout_ms = parse_optional_override("SOCKLINE_IO_TIMEOUT_MS", &v)?;
        }
        if let Some(v) = lookup("SOCKLINE_WORKERS") {
            self.workers = parse_override("SOCKLINE_WORKERS", &v)?;
        }
        if let Some(v) = lookup("SOCKLINE_QUEUE_CAPACITY") {
            self.queue_capacity = parse_override("SOCKLINE_QUEUE_CAPACITY", &v)?;
        }
        self.validate()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.default_port == 0 {
            return Err(ConfigError::Invalid("default_port must be 1-65535".into()));
        }
        if self.default_read_len == 0 {
            return Err(ConfigError::Invalid("default_read_len must be > 0".into()));
        }
        if self.workers == 0 {
            return Err(ConfigError::Invalid("workers must be > 0".into()));
        }
        if self.queue_capacity == 0 {
            return Err(ConfigError::Invalid("queue_capacity must be > 0".into()));
        }
        // Duration::ZERO は std の timeout API で拒否される
        if self.connect_timeout_ms == Some(0) || self.io_timeout_ms == Some(0) {
            return Err(ConfigError::Invalid(
                "timeouts must be > 0 ms (omit the key to disable)".into(),
            ));
        }
        Ok(())
    }

    pub fn connect_timeout(&self) -> Option<Duration> {
        self.connect_timeout_ms.map(Duration::from_millis)
    }

    pub fn io_timeout(&self) -> Option<Duration> {
        self.io_timeout_ms.map(Duration::from_millis)
    }
}

fn parse_override<T: FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_optional_override(key: &str, value: &str) -> Result<Option<u64>, ConfigError> {
    let trimmed = value.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("none") {
        return Ok(None);
    }
    parse_override(key, trimmed).map(Some)
}
