//! Scan Configuration System using Figment
//!
//! Settings are loaded from:
//! 1. A TOML file (base configuration)
//! 2. Environment variables (prefixed with `RUST_SCAN_`, nested keys split on `__`)
//!
//! Every key has a default, so an empty or missing file yields a usable
//! configuration.
//!
//! # Environment Variable Overrides
//!
//! ```text
//! RUST_SCAN_LOG_LEVEL=debug
//! RUST_SCAN_WRITER__TOLERANCE=0.001
//! RUST_SCAN_WRITER__TIMEOUT=250ms
//! RUST_SCAN_CHANNELS__WRITERS=[MOTOR:X,MOTOR:Y]
//! ```
//!
//! # Example
//!
//! ```toml
//! log_level = "info"
//!
//! [channels]
//! writers = ["MOTOR:X"]
//! readers = ["DET:I0"]
//! monitors = ["RING:CURRENT"]
//!
//! [connection]
//! attempts = 3
//! retry_delay = "100ms"
//!
//! [writer]
//! tolerance = 1e-5
//! timeout = "5s"
//!
//! [stream]
//! host = "detector-gateway"
//! port = 9999
//! receive_timeout = "1s"
//! ```

use std::path::Path;
use std::time::Duration;

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error_recovery::RetryPolicy;
use crate::hardware::StreamConfig;

/// Default configuration file name looked up by [`ScanSettings::load`].
pub const DEFAULT_CONFIG_FILE: &str = "rust_scan.toml";

/// Prefix of environment variable overrides.
pub const ENV_PREFIX: &str = "RUST_SCAN_";

/// Configuration error types
#[derive(Debug, Error)]
pub enum ConfigError {
    /// File or environment could not be read or parsed
    #[error("Configuration load error: {0}")]
    Load(#[from] figment::Error),
    /// A value is out of range
    #[error("Configuration validation error: {0}")]
    Validation(String),
}

/// Top-level scan settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanSettings {
    /// Channel names
    pub channels: ChannelSettings,
    /// Connection retry settings
    pub connection: ConnectionSettings,
    /// Actuator writer settings
    pub writer: WriterSettings,
    /// Reader settings
    pub reader: ReaderSettings,
    /// Acquisition stream settings
    pub stream: StreamConfig,
    /// Logging level (trace, debug, info, warn, error)
    pub log_level: String,
}

/// Channel names, in setpoint/readout order
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelSettings {
    /// Actuator channels written at every position
    pub writers: Vec<String>,
    /// Primary channels returned by every read
    pub readers: Vec<String>,
    /// Monitor-only channels, available from the cached frame
    pub monitors: Vec<String>,
}

/// Connection retry settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionSettings {
    /// Connection attempts per channel, the first one included
    pub attempts: u32,
    /// Delay between attempts
    #[serde(with = "humantime_serde")]
    pub retry_delay: Duration,
}

/// Actuator writer settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WriterSettings {
    /// A channel has converged when `|readback - target| < tolerance`
    pub tolerance: f64,
    /// Time allowed for all channels to converge
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
    /// Pause between poll cycles (0 = busy-poll)
    #[serde(with = "humantime_serde")]
    pub poll_interval: Duration,
}

/// Reader settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReaderSettings {
    /// Time allowed to observe a frame captured after the move
    #[serde(with = "humantime_serde")]
    pub read_timeout: Duration,
    /// Samples per channel taken by the plain channel reader
    pub n_measurements: usize,
}

// ============================================================================
// Default values
// ============================================================================

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            channels: ChannelSettings::default(),
            connection: ConnectionSettings::default(),
            writer: WriterSettings::default(),
            reader: ReaderSettings::default(),
            stream: StreamConfig::default(),
            log_level: "info".to_string(),
        }
    }
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        let policy = RetryPolicy::default();
        Self {
            attempts: policy.max_attempts,
            retry_delay: policy.backoff_delay,
        }
    }
}

impl Default for WriterSettings {
    fn default() -> Self {
        Self {
            tolerance: 1e-5,
            timeout: Duration::from_secs(5),
            poll_interval: Duration::ZERO,
        }
    }
}

impl Default for ReaderSettings {
    fn default() -> Self {
        Self {
            read_timeout: Duration::from_secs(10),
            n_measurements: 1,
        }
    }
}

impl ConnectionSettings {
    /// Retry policy for channel and stream connections
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.attempts,
            backoff_delay: self.retry_delay,
        }
    }
}

// ============================================================================
// Configuration Loading and Validation
// ============================================================================

impl ScanSettings {
    /// Load settings from `rust_scan.toml` and environment variables
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(DEFAULT_CONFIG_FILE)
    }

    /// Load settings from a specific file path
    ///
    /// Environment variables take precedence over the file. A missing file
    /// contributes nothing. The merged settings are validated.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let settings: Self = Figment::new()
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .map_err(ConfigError::Load)?;

        settings.validate()?;
        Ok(settings)
    }

    /// Validate settings after loading
    ///
    /// Checks:
    /// - Log level is valid (trace, debug, info, warn, error)
    /// - Tolerance is positive and finite
    /// - Connection attempts, timeouts, `n_measurements` and `queue_size` are non-zero
    pub fn validate(&self) -> Result<(), ConfigError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.log_level.as_str()) {
            return Err(ConfigError::Validation(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.log_level,
                valid_levels.join(", ")
            )));
        }

        if !(self.writer.tolerance.is_finite() && self.writer.tolerance > 0.0) {
            return Err(ConfigError::Validation(format!(
                "Invalid writer.tolerance {}. Must be a positive number",
                self.writer.tolerance
            )));
        }

        if self.connection.attempts == 0 {
            return Err(ConfigError::Validation(
                "connection.attempts must be > 0".to_string(),
            ));
        }

        let timeouts = [
            ("writer.timeout", self.writer.timeout),
            ("reader.read_timeout", self.reader.read_timeout),
            ("stream.receive_timeout", self.stream.receive_timeout),
        ];
        for (key, timeout) in timeouts {
            if timeout.is_zero() {
                return Err(ConfigError::Validation(format!("{key} must be > 0")));
            }
        }

        if self.reader.n_measurements == 0 {
            return Err(ConfigError::Validation(
                "reader.n_measurements must be > 0".to_string(),
            ));
        }

        if self.stream.queue_size == 0 {
            return Err(ConfigError::Validation(
                "stream.queue_size must be > 0".to_string(),
            ));
        }

        Ok(())
    }
}
