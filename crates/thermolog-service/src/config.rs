//! Server configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use thermolog_core::{ListenerOptions, PlausibleRange, RetryConfig, SourceSpec};

/// Server configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Server settings.
    pub server: ServerConfig,
    /// Storage settings.
    pub storage: StorageConfig,
    /// Serial ingestion settings.
    pub ingest: IngestConfig,
}

impl Config {
    /// Load `server.toml` from the platform config directory, or defaults if
    /// it does not exist.
    pub fn load_default() -> Result<Self, ConfigError> {
        let path = default_config_path();
        if path.exists() {
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Read and parse a TOML config file. Missing sections take defaults.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Read {
            path: path.as_ref().to_path_buf(),
            source: e,
        })?;
        toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.as_ref().to_path_buf(),
            source: e,
        })
    }

    /// Write the config as TOML, creating parent directories.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self).map_err(ConfigError::Serialize)?;

        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::Write {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        std::fs::write(path.as_ref(), content).map_err(|e| ConfigError::Write {
            path: path.as_ref().to_path_buf(),
            source: e,
        })
    }

    /// Check every section and report all problems together.
    ///
    /// # Example
    ///
    /// ```
    /// use thermolog_service::Config;
    ///
    /// let config = Config::default();
    /// config.validate().expect("Default config should be valid");
    /// ```
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();
        errors.extend(self.server.validate());
        errors.extend(self.storage.validate());
        errors.extend(self.ingest.validate());

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }

    /// [`load`](Self::load) followed by [`validate`](Self::validate).
    pub fn load_validated<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config = Self::load(path)?;
        config.validate()?;
        Ok(config)
    }
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// HTTP listen address, `host:port`.
    pub bind: String,
    /// Capacity of the live reading channel. Slow WebSocket clients lose the
    /// oldest readings once it fills.
    pub broadcast_buffer: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8080".to_string(),
            broadcast_buffer: 100,
        }
    }
}

impl ServerConfig {
    /// Check the bind address and channel capacity.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if self.bind.is_empty() {
            errors.push(ValidationError::new(
                "server.bind",
                "bind address cannot be empty",
            ));
        } else {
            match self.bind.rsplit_once(':') {
                None => errors.push(ValidationError::new(
                    "server.bind",
                    format!(
                        "'{}' is not a host:port address",
                        self.bind
                    ),
                )),
                Some((_, port)) => match port.parse::<u16>() {
                    Ok(0) => errors.push(ValidationError::new("server.bind", "port cannot be 0")),
                    Err(_) => errors.push(ValidationError::new(
                        "server.bind",
                        format!("invalid port '{}': must be a number 1-65535", port),
                    )),
                    Ok(_) => {}
                },
            }
        }

        if self.broadcast_buffer == 0 {
            errors.push(ValidationError::new(
                "server.broadcast_buffer",
                "broadcast buffer must be at least 1",
            ));
        }

        errors
    }
}

/// Storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// SQLite database file.
    pub path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: thermolog_store::default_db_path(),
        }
    }
}

impl StorageConfig {
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if self.path.as_os_str().is_empty() {
            errors.push(ValidationError::new(
                "storage.path",
                "database path cannot be empty",
            ));
        }

        errors
    }
}

/// Shortest accepted read timeout in milliseconds.
pub const MIN_READ_TIMEOUT_MS: u64 = 10;
/// Longest accepted read timeout in milliseconds.
pub const MAX_READ_TIMEOUT_MS: u64 = 60_000;

/// Serial ingestion configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Whether to run the ingestion listener.
    pub enabled: bool,
    /// Device path (`/dev/ttyUSB0`) or bridge address (`tcp://host:port`).
    pub source: String,
    /// Upper bound on a single read, in milliseconds.
    pub read_timeout_ms: u64,
    /// Consecutive stream failures tolerated before the listener gives up.
    pub max_consecutive_failures: u32,
    /// Lines longer than this many bytes are discarded.
    pub max_line_length: usize,
    /// Lowest plausible sensor value.
    pub min_value: f64,
    /// Highest plausible sensor value.
    pub max_value: f64,
    /// Delay between reopen attempts.
    pub backoff: BackoffConfig,
}

impl Default for IngestConfig {
    fn default() -> Self {
        let range = PlausibleRange::default();
        Self {
            enabled: true,
            source: "/dev/ttyUSB0".to_string(),
            read_timeout_ms: 1000,
            max_consecutive_failures: 5,
            max_line_length: 256,
            min_value: range.min,
            max_value: range.max,
            backoff: BackoffConfig::default(),
        }
    }
}

impl IngestConfig {
    /// Parse the configured source.
    pub fn source_spec(&self) -> thermolog_core::Result<SourceSpec> {
        self.source.parse()
    }

    /// Listener options described by this section.
    pub fn listener_options(&self) -> ListenerOptions {
        ListenerOptions::default()
            .read_timeout(Duration::from_millis(self.read_timeout_ms))
            .max_consecutive_failures(self.max_consecutive_failures)
            .max_line_length(self.max_line_length)
            .range(PlausibleRange::new(self.min_value, self.max_value))
            .backoff(self.backoff.retry_config())
    }

    /// Validate ingestion configuration.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if let Err(e) = self.source_spec() {
            errors.push(ValidationError::new("ingest.source", e.to_string()));
        }

        if !(MIN_READ_TIMEOUT_MS..=MAX_READ_TIMEOUT_MS).contains(&self.read_timeout_ms) {
            errors.push(ValidationError::new(
                "ingest.read_timeout_ms",
                format!(
                    "read timeout {} ms is out of range ({}-{} ms)",
                    self.read_timeout_ms, MIN_READ_TIMEOUT_MS, MAX_READ_TIMEOUT_MS
                ),
            ));
        }

        if self.max_line_length < 32 {
            errors.push(ValidationError::new(
                "ingest.max_line_length",
                format!(
                    "max line length {} is too short for a record (minimum 32)",
                    self.max_line_length
                ),
            ));
        }

        if !self.min_value.is_finite() || !self.max_value.is_finite() {
            errors.push(ValidationError::new(
                "ingest.min_value",
                "plausible range bounds must be finite numbers",
            ));
        } else if self.min_value >= self.max_value {
            errors.push(ValidationError::new(
                "ingest.min_value",
                format!(
                    "min_value {} must be less than max_value {}",
                    self.min_value, self.max_value
                ),
            ));
        }

        errors.extend(self.backoff.validate());
        errors
    }
}

/// Reconnect backoff configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffConfig {
    /// Delay before the first reopen, in milliseconds.
    pub initial_delay_ms: u64,
    /// Upper bound on any single delay, in milliseconds.
    pub max_delay_ms: u64,
    /// Growth factor between attempts.
    pub multiplier: f64,
    /// Add up to 25% random jitter to each delay.
    pub jitter: bool,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        let retry = RetryConfig::for_reconnect();
        Self {
            initial_delay_ms: retry.initial_delay.as_millis() as u64,
            max_delay_ms: retry.max_delay.as_millis() as u64,
            multiplier: retry.backoff_multiplier,
            jitter: retry.jitter,
        }
    }
}

impl BackoffConfig {
    /// Convert to the listener's retry type.
    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig::for_reconnect()
            .initial_delay(Duration::from_millis(self.initial_delay_ms))
            .max_delay(Duration::from_millis(self.max_delay_ms))
            .backoff_multiplier(self.multiplier)
            .jitter(self.jitter)
    }

    /// Validate backoff configuration.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if self.multiplier.is_nan() || self.multiplier < 1.0 {
            errors.push(ValidationError::new(
                "ingest.backoff.multiplier",
                format!("multiplier {} must be at least 1.0", self.multiplier),
            ));
        }
        if self.max_delay_ms < self.initial_delay_ms {
            errors.push(ValidationError::new(
                "ingest.backoff.max_delay_ms",
                format!(
                    "max delay {} ms is below initial delay {} ms",
                    self.max_delay_ms, self.initial_delay_ms
                ),
            ));
        }

        errors
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Invalid TOML in {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("Cannot encode config as TOML: {0}")]
    Serialize(toml::ser::Error),
    #[error("Cannot write {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Invalid configuration:\n{}", format_validation_errors(.0))]
    Validation(Vec<ValidationError>),
}

/// One rejected config field.
#[derive(Debug, Clone)]
pub struct ValidationError {
    /// The field path (e.g., `server.bind` or `ingest.backoff.multiplier`).
    pub field: String,
    /// What is wrong with it.
    pub message: String,
}

impl ValidationError {
    fn new(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

fn format_validation_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| format!("  - {}", e))
        .collect::<Vec<_>>()
        .join("\n")
}

/// `<config dir>/thermolog/server.toml`.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("thermolog")
        .join("server.toml")
}
