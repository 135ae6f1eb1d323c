//! Bounded retries for connection setup.
//!
//! A connection attempt is a single collaborator call; [`RetryPolicy`] decides
//! how many times it runs and how long to wait in between.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::error::ScanError;
use crate::hardware::{ChannelClient, FrameStream, StreamConfig};

/// Name reported in connection errors for the acquisition stream.
pub const STREAM_TARGET: &str = "frame stream";

/// Defines a policy for retrying an operation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// The maximum number of attempts, the first one included.
    pub max_attempts: u32,
    /// The delay between attempts.
    #[serde(with = "humantime_serde")]
    pub backoff_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_delay: Duration::from_millis(100),
        }
    }
}

impl RetryPolicy {
    /// Logs a failed attempt and waits before the next one, if any is left.
    async fn after_failure(&self, target: &str, attempt: u32, err: &anyhow::Error) {
        warn!(channel = target, attempt, error = %format!("{err:#}"), "connection attempt failed");
        if attempt < self.max_attempts {
            sleep(self.backoff_delay).await;
        }
    }

    fn exhausted(&self, target: &str) -> ScanError {
        ScanError::Connection {
            target: target.to_string(),
            attempts: self.max_attempts,
        }
    }
}

/// Runs `attempt` until it succeeds or the policy is exhausted.
///
/// Fails with [`ScanError::Connection`] naming `target` once every attempt failed.
pub async fn retry_connect<T, F, Fut>(
    target: &str,
    policy: &RetryPolicy,
    mut attempt: F,
) -> Result<T, ScanError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = anyhow::Result<T>>,
{
    for n in 1..=policy.max_attempts {
        match attempt().await {
            Ok(connection) => {
                debug!(channel = target, attempt = n, "connected");
                return Ok(connection);
            }
            Err(err) => policy.after_failure(target, n, &err).await,
        }
    }
    Err(policy.exhausted(target))
}

/// Subscribes `stream` to `channels`, retrying per `policy`.
pub async fn connect_stream<S: FrameStream + ?Sized>(
    stream: &mut S,
    config: &StreamConfig,
    channels: &[String],
    policy: &RetryPolicy,
) -> Result<(), ScanError> {
    for n in 1..=policy.max_attempts {
        match stream.connect(config, channels).await {
            Ok(()) => {
                info!(attempt = n, channels = channels.len(), "frame stream connected");
                return Ok(());
            }
            Err(err) => policy.after_failure(STREAM_TARGET, n, &err).await,
        }
    }
    Err(policy.exhausted(STREAM_TARGET))
}

/// Connects every channel in `names`, in order.
///
/// Channels connected before a failure are disconnected again before the
/// error is returned.
pub async fn connect_channels<C: ChannelClient>(
    client: &C,
    names: &[String],
    policy: &RetryPolicy,
) -> Result<Vec<C::Handle>, ScanError> {
    let mut handles = Vec::with_capacity(names.len());
    for name in names {
        match retry_connect(name, policy, move || client.connect(name)).await {
            Ok(handle) => handles.push(handle),
            Err(err) => {
                for handle in handles {
                    if let Err(close_err) = client.disconnect(handle).await {
                        warn!(error = %format!("{close_err:#}"), "disconnect after failed connect");
                    }
                }
                return Err(err);
            }
        }
    }
    Ok(handles)
}
