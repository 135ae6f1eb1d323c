//! Core data types shared by the positioners, the writer and the readers.
//!
//! # Data Flow
//!
//! ```text
//! Positioner --[PositionVector]--> ActuatorWriter --(move done at t0)--> SynchronizedReader
//!                                                                          |
//!                                      FrameStream --[Frame]---------------+
//! ```
//!
//! Position vectors are plain `Vec<f64>` (one coordinate per axis). The
//! multi-area positioner moves several co-moving channels per axis and yields
//! a vector of vectors instead; both flatten into the setpoints written to the
//! actuators through [`Setpoints`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One coordinate per axis.
pub type PositionVector = Vec<f64>;

/// One coordinate vector per axis (several co-moving channels per axis slot).
pub type MultiPositionVector = Vec<Vec<f64>>;

/// A value sampled from a channel inside a frame.
///
/// Detectors deliver scalars, waveforms or strings, so frame values keep the
/// JSON shape they arrive in.
pub type ChannelValue = serde_json::Value;

/// Conversion of a position into the flat list of actuator setpoints.
pub trait Setpoints {
    /// Returns the setpoints in channel order.
    fn setpoints(&self) -> Vec<f64>;
}

impl Setpoints for PositionVector {
    fn setpoints(&self) -> Vec<f64> {
        self.clone()
    }
}

impl Setpoints for MultiPositionVector {
    fn setpoints(&self) -> Vec<f64> {
        self.iter().flatten().copied().collect()
    }
}

/// Frame timestamp as encoded on the acquisition stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FrameTimestamp {
    /// Seconds since the Unix epoch
    pub seconds: i64,
    /// Nanoseconds within the second
    pub nanoseconds: u32,
}

impl FrameTimestamp {
    /// Creates a timestamp from its two components.
    pub fn new(seconds: i64, nanoseconds: u32) -> Self {
        Self {
            seconds,
            nanoseconds,
        }
    }

    /// Splits a wall-clock instant into whole seconds and truncated nanoseconds.
    pub fn from_datetime(instant: DateTime<Utc>) -> Self {
        Self {
            seconds: instant.timestamp(),
            nanoseconds: instant.timestamp_subsec_nanos(),
        }
    }

    /// Current wall-clock time.
    pub fn now() -> Self {
        Self::from_datetime(Utc::now())
    }

    /// Returns true if this timestamp is at or after `reference`.
    ///
    /// Seconds are compared first; only when they are equal do the
    /// nanoseconds decide, and equality counts as a match.
    pub fn is_at_or_after(&self, reference: &FrameTimestamp) -> bool {
        if self.seconds == reference.seconds {
            self.nanoseconds >= reference.nanoseconds
        } else {
            self.seconds > reference.seconds
        }
    }
}

/// A timestamped bundle of channel values received from the acquisition stream.
///
/// Wire shape: `{ "timestamp": { "seconds": .., "nanoseconds": .. }, "data": { name: value } }`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    /// Capture time of the frame
    pub timestamp: FrameTimestamp,
    /// Sampled value per channel name
    pub data: HashMap<String, ChannelValue>,
}

impl Frame {
    /// Creates a frame from a timestamp and channel values.
    pub fn new<I, K>(timestamp: FrameTimestamp, data: I) -> Self
    where
        I: IntoIterator<Item = (K, ChannelValue)>,
        K: Into<String>,
    {
        Self {
            timestamp,
            data: data.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }

    /// Value of one channel, if present in this frame.
    pub fn value(&self, channel: &str) -> Option<&ChannelValue> {
        self.data.get(channel)
    }
}

/// Causal match rule: a received frame counts only if it was captured at or
/// after `reference`. A receive that timed out (`None`) never matches.
pub fn frame_matches(frame: Option<&Frame>, reference: &FrameTimestamp) -> bool {
    frame.is_some_and(|frame| frame.timestamp.is_at_or_after(reference))
}
