//! Custom error types for the scan engine.
//!
//! This module defines the primary error type, `ScanError`, for the whole crate.
//! Using the `thiserror` crate, it provides a centralized and consistent way to
//! surface every failure the engine can produce to the scan driver.
//!
//! ## Error Hierarchy
//!
//! `ScanError` consolidates the failure classes of a scan:
//!
//! - **`Construction`**: A malformed scan definition (axis-count mismatch, mixed
//!   step kinds, non-positive steps). Raised when a positioner is built, never
//!   recovered internally.
//! - **`Connection`**: A channel or the frame stream could not be connected after
//!   the bounded number of attempts in the retry policy.
//! - **`ConvergenceTimeout`**: The actuator writer ran out of time before every
//!   channel settled within tolerance. The error names no channel: the whole
//!   write failed.
//! - **`ReadTimeout`**: The synchronized reader saw no frame captured after the
//!   move before its deadline.
//! - **`EmptyCache`**: Monitor values were requested before any successful read.
//!   This is a programming error and is never retried.
//! - **`Channel` / `Stream`**: Failures reported by the I/O collaborators
//!   themselves, carried as text with the collaborator's context chain.
//!
//! Nothing in this crate suppresses or retries an error beyond the bounded
//! polling inside a single `write`/`read` call. The driver decides whether to
//! abort the scan or skip a position.

use std::time::Duration;

use thiserror::Error;

/// Convenience alias for results using the crate error type.
pub type AppResult<T> = std::result::Result<T, ScanError>;

/// Every failure a scan can report.
#[derive(Error, Debug)]
pub enum ScanError {
    /// The scan definition was rejected
    #[error("Invalid scan definition: {0}")]
    Construction(#[from] ConstructionError),

    /// Connection attempts were exhausted
    #[error("Cannot connect to '{target}' after {attempts} attempts")]
    Connection {
        /// Channel name, or the frame stream
        target: String,
        /// Attempts made, the first one included
        attempts: u32,
    },

    /// Some channel did not settle within tolerance in time
    #[error("Cannot achieve position within {timeout:?}")]
    ConvergenceTimeout {
        /// Budget of the failed write
        timeout: Duration,
    },

    /// No frame captured after the move arrived in time
    #[error("Read timeout of {timeout:?} exceeded: no frame captured after the move")]
    ReadTimeout {
        /// Budget of the failed read
        timeout: Duration,
    },

    /// Cached values were requested before a successful read
    #[error("Frame cache is empty, read() must succeed before cached values are available")]
    EmptyCache,

    /// A matched frame lacks a requested channel
    #[error("Channel '{0}' is missing from the received frame")]
    MissingChannel(String),

    /// Position and writer channel counts differ
    #[error("Expected {expected} setpoints, got {actual}")]
    SetpointMismatch {
        /// Writer channel count
        expected: usize,
        /// Setpoints in the position
        actual: usize,
    },

    /// Failure reported by the channel client
    #[error("Channel I/O error: {0}")]
    Channel(String),

    /// Failure reported by the frame stream
    #[error("Frame stream error: {0}")]
    Stream(String),

    /// Releasing resources failed; holds every failure
    #[error("Shutdown failed with errors")]
    ShutdownFailed(Vec<ScanError>),
}

impl ScanError {
    /// Wraps a channel collaborator failure, keeping its full context chain.
    pub fn channel(err: anyhow::Error) -> Self {
        ScanError::Channel(format!("{err:#}"))
    }

    /// Wraps a frame stream collaborator failure, keeping its full context chain.
    pub fn stream(err: anyhow::Error) -> Self {
        ScanError::Stream(format!("{err:#}"))
    }
}

/// Reasons a positioner refuses its scan definition.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConstructionError {
    /// A per-axis input has the wrong length
    #[error("'{field}' has {actual} axes, expected {expected}")]
    AxisCountMismatch {
        /// Offending input
        field: &'static str,
        /// Axis count of the scan
        expected: usize,
        /// Length found
        actual: usize,
    },

    /// Step counts and step sizes are mixed
    #[error("Step counts and step sizes cannot be mixed in one scan")]
    MixedStepTags,

    /// A step count of zero
    #[error("Step count must be positive")]
    InvalidStepCount,

    /// A step size that is not positive and finite
    #[error("Step size must be a positive finite number, got {0}")]
    InvalidStepSize(f64),

    /// Linear axes given different step counts
    #[error("All axes of a linear scan must use the same step count, got {0:?}")]
    StepCountMismatch(Vec<usize>),

    /// The sequence length overflows `usize`
    #[error("Scan has more positions than can be counted")]
    TooManyPositions,

    /// Zero passes
    #[error("Number of passes must be positive")]
    InvalidPasses,

    /// A vector positioner without waypoints
    #[error("At least one position is required")]
    EmptyPositions,
}
