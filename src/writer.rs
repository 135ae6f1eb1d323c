//! Actuator writer: puts setpoints and waits for the readbacks to converge.
//!
//! A write puts every setpoint once, then polls the channels that have not
//! converged yet until all of them are within tolerance of their target or the
//! timeout elapses. A poll that yields no value leaves the channel unconverged
//! for that cycle; it is not an error.
//!
//! ```rust,ignore
//! let mut writer = ActuatorWriter::connect(client, &names, &RetryPolicy::default()).await?;
//! writer.write(&[1.0, 2.0], 1e-5, Duration::from_secs(5)).await?;
//! writer.close().await?;
//! ```

use std::time::Duration;

use anyhow::Context;
use tokio::time::{sleep_until, timeout_at, Instant};
use tracing::{debug, info, warn};

use crate::error::{AppResult, ScanError};
use crate::error_recovery::{connect_channels, RetryPolicy};
use crate::hardware::ChannelClient;

/// Per-channel "reached target" flags of the current write.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ConvergenceState {
    reached: Vec<bool>,
}

impl ConvergenceState {
    fn reset(&mut self, n_channels: usize) {
        self.reached.clear();
        self.reached.resize(n_channels, false);
    }

    fn mark(&mut self, index: usize) {
        self.reached[index] = true;
    }

    /// Whether channel `index` reached its target during the last write.
    pub fn is_reached(&self, index: usize) -> bool {
        self.reached.get(index).copied().unwrap_or(false)
    }

    /// Whether every channel reached its target.
    pub fn all_reached(&self) -> bool {
        self.reached.iter().all(|reached| *reached)
    }

    /// Number of channels still moving.
    pub fn pending(&self) -> usize {
        self.reached.iter().filter(|reached| !**reached).count()
    }
}

/// Drives a fixed, ordered set of actuator channels.
///
/// Owns its channel connections until [`ActuatorWriter::close`] is called.
pub struct ActuatorWriter<C: ChannelClient> {
    client: C,
    channels: Vec<String>,
    handles: Vec<C::Handle>,
    poll_interval: Duration,
    state: ConvergenceState,
    closed: bool,
}

impl<C: ChannelClient> ActuatorWriter<C> {
    /// Connects every channel in `channels`, retrying per `policy`.
    pub async fn connect(client: C, channels: &[String], policy: &RetryPolicy) -> AppResult<Self> {
        let handles = connect_channels(&client, channels, policy).await?;
        info!(channels = ?channels, "actuator writer connected");
        Ok(Self {
            client,
            channels: channels.to_vec(),
            handles,
            poll_interval: Duration::ZERO,
            state: ConvergenceState::default(),
            closed: false,
        })
    }

    /// Pause between poll cycles; zero busy-polls with a cooperative yield.
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Channel names in setpoint order.
    pub fn channels(&self) -> &[String] {
        &self.channels
    }

    /// Convergence flags of the last write.
    pub fn convergence(&self) -> &ConvergenceState {
        &self.state
    }

    /// Moves every channel to its value in `values` and waits until all readbacks
    /// are within `tolerance` (strictly), or fails after `timeout`.
    pub async fn write(
        &mut self,
        values: &[f64],
        tolerance: f64,
        timeout: Duration,
    ) -> AppResult<()> {
        if self.closed {
            return Err(ScanError::Channel("actuator writer is closed".into()));
        }
        if values.len() != self.handles.len() {
            return Err(ScanError::SetpointMismatch {
                expected: self.handles.len(),
                actual: values.len(),
            });
        }

        let deadline = Instant::now() + timeout;
        self.state.reset(values.len());

        for ((handle, name), value) in self.handles.iter().zip(&self.channels).zip(values) {
            match timeout_at(deadline, self.client.put(handle, *value)).await {
                Ok(result) => result
                    .with_context(|| format!("put {name}"))
                    .map_err(ScanError::channel)?,
                Err(_) => return Err(ScanError::ConvergenceTimeout { timeout }),
            }
        }

        let mut cycle = 0usize;
        loop {
            cycle += 1;
            for (index, (handle, name)) in self.handles.iter().zip(&self.channels).enumerate() {
                if self.state.is_reached(index) {
                    continue;
                }
                let current = match timeout_at(deadline, self.client.get(handle)).await {
                    Ok(result) => result
                        .with_context(|| format!("get {name}"))
                        .map_err(ScanError::channel)?,
                    Err(_) => {
                        warn!(
                            pending = self.state.pending(),
                            ?timeout,
                            "actuators did not converge"
                        );
                        return Err(ScanError::ConvergenceTimeout { timeout });
                    }
                };
                if let Some(current) = current {
                    if (current - values[index]).abs() < tolerance {
                        self.state.mark(index);
                    }
                }
            }

            if self.state.all_reached() {
                debug!(cycles = cycle, "actuators converged");
                return Ok(());
            }
            if Instant::now() >= deadline {
                warn!(pending = self.state.pending(), ?timeout, "actuators did not converge");
                return Err(ScanError::ConvergenceTimeout { timeout });
            }

            debug!(cycle, pending = self.state.pending(), "waiting for actuators");
            if self.poll_interval.is_zero() {
                tokio::task::yield_now().await;
            } else {
                sleep_until(deadline.min(Instant::now() + self.poll_interval)).await;
            }
        }
    }

    /// Releases every channel connection. Calling it again is a no-op.
    pub async fn close(&mut self) -> AppResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        let mut errors = Vec::new();
        for (handle, name) in self.handles.drain(..).zip(&self.channels) {
            if let Err(err) = self.client.disconnect(handle).await {
                errors.push(ScanError::channel(err.context(format!("disconnect {name}"))));
            }
        }
        info!(channels = self.channels.len(), "actuator writer closed");

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ScanError::ShutdownFailed(errors))
        }
    }
}

impl<C: ChannelClient> Drop for ActuatorWriter<C> {
    fn drop(&mut self) {
        if !self.closed && !self.handles.is_empty() {
            warn!(
                channels = self.handles.len(),
                "actuator writer dropped without close(), connections leaked"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::mock::MockChannelClient;
    use tracing_test::traced_test;

    const TOLERANCE: f64 = 1e-5;

    fn names() -> Vec<String> {
        vec!["MOTOR:X".to_string(), "MOTOR:Y".to_string()]
    }

    fn two_motors() -> MockChannelClient {
        MockChannelClient::new()
            .with_channel("MOTOR:X", 0.0)
            .with_channel("MOTOR:Y", 0.0)
    }

    async fn writer(client: &MockChannelClient) -> ActuatorWriter<MockChannelClient> {
        ActuatorWriter::connect(client.clone(), &names(), &RetryPolicy::default())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_write_converges_on_first_poll() {
        let client = two_motors();
        let mut writer = writer(&client).await;

        writer
            .write(&[1.0, 2.0], TOLERANCE, Duration::from_secs(1))
            .await
            .unwrap();

        assert!(writer.convergence().all_reached());
        assert_eq!(client.gets("MOTOR:X"), 1);
        assert_eq!(client.gets("MOTOR:Y"), 1);
        assert_eq!(client.puts("MOTOR:X"), vec![1.0]);
        writer.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_write_polls_only_unconverged_channels() {
        let client = two_motors().with_settle_reads("MOTOR:Y", 3);
        let mut writer = writer(&client).await;

        writer
            .write(&[1.0, 2.0], TOLERANCE, Duration::from_secs(1))
            .await
            .unwrap();

        assert_eq!(client.gets("MOTOR:X"), 1);
        assert_eq!(client.gets("MOTOR:Y"), 4);
        assert_eq!(client.value("MOTOR:Y"), Some(2.0));
        writer.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_missing_readback_is_not_an_error() {
        let client = two_motors().with_unavailable_reads("MOTOR:X", 2);
        let mut writer = writer(&client).await;

        writer
            .write(&[1.0, 2.0], TOLERANCE, Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(client.gets("MOTOR:X"), 3);
        writer.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_write_times_out_when_one_channel_is_stuck() {
        let client = two_motors().with_stuck("MOTOR:Y");
        let mut writer = writer(&client).await;

        let err = writer
            .write(&[1.0, 2.0], TOLERANCE, Duration::from_millis(50))
            .await
            .unwrap_err();

        assert!(matches!(err, ScanError::ConvergenceTimeout { .. }));
        assert!(writer.convergence().is_reached(0));
        assert!(!writer.convergence().is_reached(1));
        assert_eq!(client.gets("MOTOR:X"), 1);
        writer.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_tolerance_is_strict() {
        let client = two_motors().with_stuck("MOTOR:X").with_stuck("MOTOR:Y");
        let mut writer = writer(&client).await;

        // Readbacks stay at 0.0, exactly one tolerance away from the target.
        let err = writer
            .write(&[0.5, 0.5], 0.5, Duration::from_millis(20))
            .await
            .unwrap_err();
        assert!(matches!(err, ScanError::ConvergenceTimeout { .. }));

        writer
            .write(&[0.25, 0.25], 0.5, Duration::from_millis(20))
            .await
            .unwrap();
        writer.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_poll_interval() {
        let client = two_motors().with_settle_reads("MOTOR:X", 2);
        let mut writer = writer(&client)
            .await
            .with_poll_interval(Duration::from_millis(2));

        writer
            .write(&[1.0, 2.0], TOLERANCE, Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(client.gets("MOTOR:X"), 3);
        writer.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_setpoint_count_mismatch() {
        let client = two_motors();
        let mut writer = writer(&client).await;

        let err = writer
            .write(&[1.0], TOLERANCE, Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ScanError::SetpointMismatch {
                expected: 2,
                actual: 1
            }
        ));
        assert!(client.puts("MOTOR:X").is_empty());
        writer.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_close_releases_connections_once() {
        let client = two_motors();
        let mut writer = writer(&client).await;
        assert_eq!(client.open_connections(), 2);

        writer.close().await.unwrap();
        writer.close().await.unwrap();
        assert_eq!(client.open_connections(), 0);

        let err = writer
            .write(&[1.0, 2.0], TOLERANCE, Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, ScanError::Channel(_)));
    }

    #[tokio::test]
    #[traced_test]
    async fn test_drop_without_close_warns() {
        let client = two_motors();
        drop(writer(&client).await);
        assert!(logs_contain("dropped without close()"));
    }
}
