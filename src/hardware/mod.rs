//! Collaborator interfaces for control-system channels and the acquisition stream.
//!
//! The scan engine never talks to a wire protocol directly. It drives two
//! small capability traits:
//!
//! - [`ChannelClient`]: connect/get/put/disconnect on named process variables.
//!   Actuator setpoints and readbacks go through it.
//! - [`FrameStream`]: a live stream of timestamped frames carrying detector and
//!   monitor values.
//!
//! # Design Philosophy
//!
//! Each trait:
//! - Is async (uses #[async_trait])
//! - Uses anyhow::Result so implementations can attach context freely
//! - Performs exactly one attempt per call. Retrying a connection is the
//!   caller's policy (see [`crate::error_recovery`]), which keeps fakes trivial.
//!
//! [`mock`] provides in-memory implementations of both traits.

pub mod mock;

use std::fmt::Debug;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::core::Frame;

/// Access to named control-system channels.
#[async_trait]
pub trait ChannelClient: Send + Sync {
    /// Connection handle for one channel.
    type Handle: Send + Sync + Debug;

    /// Single connection attempt to the channel `name`.
    async fn connect(&self, name: &str) -> Result<Self::Handle>;

    /// Current value, or `None` if the channel has no value available right now.
    async fn get(&self, handle: &Self::Handle) -> Result<Option<f64>>;

    /// Requests a new value without waiting for it to be reached.
    async fn put(&self, handle: &Self::Handle, value: f64) -> Result<()>;

    /// Releases the connection.
    async fn disconnect(&self, handle: Self::Handle) -> Result<()>;
}

/// Where and how to subscribe to the acquisition stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamConfig {
    /// Stream host (implementation default when absent)
    #[serde(default)]
    pub host: Option<String>,
    /// Stream port (implementation default when absent)
    #[serde(default)]
    pub port: Option<u16>,
    /// Frames buffered by the client before old ones are dropped
    #[serde(default = "default_queue_size")]
    pub queue_size: usize,
    /// Upper bound for a single `receive` call
    #[serde(default = "default_receive_timeout", with = "humantime_serde")]
    pub receive_timeout: Duration,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            host: None,
            port: None,
            queue_size: default_queue_size(),
            receive_timeout: default_receive_timeout(),
        }
    }
}

fn default_queue_size() -> usize {
    20
}

fn default_receive_timeout() -> Duration {
    Duration::from_secs(1)
}

/// A live stream of timestamped frames.
#[async_trait]
pub trait FrameStream: Send {
    /// Subscribes to `channels` on the endpoint described by `config`.
    async fn connect(&mut self, config: &StreamConfig, channels: &[String]) -> Result<()>;

    /// Waits up to `timeout` for the next frame; `None` if none arrived in time.
    async fn receive(&mut self, timeout: Duration) -> Result<Option<Frame>>;

    /// Closes the subscription.
    async fn disconnect(&mut self) -> Result<()>;
}
