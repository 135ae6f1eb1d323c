//! Plain reader that samples channels directly, without stream synchronization.
use anyhow::Context;
use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, info, warn};

use super::Reader;
use crate::error::{AppResult, ScanError};
use crate::error_recovery::{connect_channels, RetryPolicy};
use crate::hardware::ChannelClient;

/// Values read from one channel at one position.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Sample {
    /// One get; `None` when the channel had no value.
    Single(Option<f64>),
    /// `n_measurements` consecutive gets.
    Series(Vec<Option<f64>>),
}

/// Gets every channel once, or `n_measurements` times, per position.
pub struct ChannelReader<C: ChannelClient> {
    client: C,
    channels: Vec<String>,
    handles: Vec<C::Handle>,
    n_measurements: usize,
    closed: bool,
}

impl<C: ChannelClient> ChannelReader<C> {
    /// Connects the channels in `channels`. `n_measurements` is clamped to at least one.
    pub async fn connect(
        client: C,
        channels: &[String],
        n_measurements: usize,
        policy: &RetryPolicy,
    ) -> AppResult<Self> {
        let handles = connect_channels(&client, channels, policy).await?;
        info!(channels = ?channels, n_measurements, "channel reader connected");
        Ok(Self {
            client,
            channels: channels.to_vec(),
            handles,
            n_measurements: n_measurements.max(1),
            closed: false,
        })
    }

    async fn get(&self, handle: &C::Handle, name: &str) -> AppResult<Option<f64>> {
        self.client
            .get(handle)
            .await
            .with_context(|| format!("get {name}"))
            .map_err(ScanError::channel)
    }
}

#[async_trait]
impl<C: ChannelClient> Reader for ChannelReader<C> {
    type Output = Vec<Sample>;

    async fn read(&mut self) -> AppResult<Vec<Sample>> {
        if self.closed {
            return Err(ScanError::Channel("channel reader is closed".into()));
        }

        let mut samples = Vec::with_capacity(self.handles.len());
        for (handle, name) in self.handles.iter().zip(&self.channels) {
            let sample = if self.n_measurements == 1 {
                Sample::Single(self.get(handle, name).await?)
            } else {
                let mut series = Vec::with_capacity(self.n_measurements);
                for _ in 0..self.n_measurements {
                    series.push(self.get(handle, name).await?);
                }
                Sample::Series(series)
            };
            samples.push(sample);
        }
        debug!(channels = samples.len(), "channels read");
        Ok(samples)
    }

    async fn close(&mut self) -> AppResult<()> {
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
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ScanError::ShutdownFailed(errors))
        }
    }
}

impl<C: ChannelClient> Drop for ChannelReader<C> {
    fn drop(&mut self) {
        if !self.closed && !self.handles.is_empty() {
            warn!(
                channels = self.handles.len(),
                "channel reader dropped without close(), connections leaked"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::mock::MockChannelClient;
    use serde_json::json;

    fn client() -> MockChannelClient {
        MockChannelClient::new()
            .with_channel("DET:I0", 3.0)
            .with_channel("DET:I1", 0.0)
            .with_unavailable_reads("DET:I1", 1)
    }

    fn names() -> Vec<String> {
        vec!["DET:I0".to_string(), "DET:I1".to_string()]
    }

    #[tokio::test]
    async fn test_single_measurement() {
        let client = client();
        let mut reader =
            ChannelReader::connect(client.clone(), &names(), 1, &RetryPolicy::default())
                .await
                .unwrap();

        let samples = reader.read().await.unwrap();
        assert_eq!(samples, vec![Sample::Single(Some(3.0)), Sample::Single(None)]);

        // Zero is a valid reading.
        let samples = reader.read().await.unwrap();
        assert_eq!(samples[1], Sample::Single(Some(0.0)));

        reader.close().await.unwrap();
        assert_eq!(client.open_connections(), 0);
    }

    #[tokio::test]
    async fn test_series_measurement() {
        let client = client();
        let mut reader =
            ChannelReader::connect(client.clone(), &names(), 3, &RetryPolicy::default())
                .await
                .unwrap();

        let samples = reader.read().await.unwrap();
        assert_eq!(
            samples,
            vec![
                Sample::Series(vec![Some(3.0); 3]),
                Sample::Series(vec![None, Some(0.0), Some(0.0)]),
            ]
        );
        assert_eq!(client.gets("DET:I0"), 3);
        assert_eq!(
            serde_json::to_value(&samples[1]).unwrap(),
            json!([null, 0.0, 0.0])
        );
        reader.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_read_after_close_fails() {
        let mut reader = ChannelReader::connect(client(), &names(), 1, &RetryPolicy::default())
            .await
            .unwrap();
        reader.close().await.unwrap();
        assert!(matches!(reader.read().await, Err(ScanError::Channel(_))));
    }
}
