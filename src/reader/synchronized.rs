//! Causal frame matching against a live acquisition stream.
//!
//! `read()` stamps the wall-clock time at entry and discards frames captured
//! before it. The first frame at or after that instant is cached: its primary
//! channel values are returned, its monitor values stay available through
//! [`SynchronizedReader::read_cached_monitors`] until the next successful read.
//!
//! ```text
//! Idle --read()--> Polling --match--> Idle (cache updated)
//!                     \---deadline--> Idle (ReadTimeout, cache unchanged)
//! ```

use std::time::Duration;

use async_trait::async_trait;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, info, warn};

use super::Reader;
use crate::core::{frame_matches, ChannelValue, Frame, FrameTimestamp};
use crate::error::{AppResult, ScanError};
use crate::error_recovery::{connect_stream, RetryPolicy};
use crate::hardware::{FrameStream, StreamConfig};

/// Reads primary channels from the first frame captured after each move.
pub struct SynchronizedReader<S: FrameStream> {
    stream: S,
    config: StreamConfig,
    primaries: Vec<String>,
    monitors: Vec<String>,
    read_timeout: Duration,
    cache: Option<Frame>,
    closed: bool,
}

impl<S: FrameStream> SynchronizedReader<S> {
    /// Subscribes `stream` to the primary and monitor channels.
    pub async fn connect(
        mut stream: S,
        config: StreamConfig,
        primaries: Vec<String>,
        monitors: Vec<String>,
        read_timeout: Duration,
        policy: &RetryPolicy,
    ) -> AppResult<Self> {
        let channels: Vec<String> = primaries.iter().chain(&monitors).cloned().collect();
        connect_stream(&mut stream, &config, &channels, policy).await?;
        info!(
            primaries = primaries.len(),
            monitors = monitors.len(),
            "synchronized reader connected"
        );

        Ok(Self {
            stream,
            config,
            primaries,
            monitors,
            read_timeout,
            cache: None,
            closed: false,
        })
    }

    /// Frame matched by the last successful read.
    pub fn cached_frame(&self) -> Option<&Frame> {
        self.cache.as_ref()
    }

    /// Monitor values of the frame matched by the last successful read.
    pub fn read_cached_monitors(&self) -> AppResult<Vec<ChannelValue>> {
        let frame = self.cache.as_ref().ok_or(ScanError::EmptyCache)?;
        extract(frame, &self.monitors)
    }

    async fn wait_for_frame(&mut self, reference: FrameTimestamp) -> AppResult<Frame> {
        let deadline = Instant::now() + self.read_timeout;
        let mut skipped = 0usize;

        loop {
            let now = Instant::now();
            if now >= deadline {
                warn!(skipped, timeout = ?self.read_timeout, "no frame captured after the move");
                return Err(ScanError::ReadTimeout {
                    timeout: self.read_timeout,
                });
            }

            let wait = self.config.receive_timeout.min(deadline - now);
            let received = match timeout_at(deadline, self.stream.receive(wait)).await {
                Ok(result) => result.map_err(ScanError::stream)?,
                Err(_) => None,
            };

            match received {
                Some(frame) if frame_matches(Some(&frame), &reference) => {
                    debug!(skipped, seconds = frame.timestamp.seconds, "frame matched");
                    return Ok(frame);
                }
                Some(frame) => {
                    skipped += 1;
                    debug!(
                        seconds = frame.timestamp.seconds,
                        nanoseconds = frame.timestamp.nanoseconds,
                        "stale frame skipped"
                    );
                }
                None => debug!("receive timed out"),
            }
        }
    }
}

fn extract(frame: &Frame, channels: &[String]) -> AppResult<Vec<ChannelValue>> {
    channels
        .iter()
        .map(|name| {
            frame
                .value(name)
                .cloned()
                .ok_or_else(|| ScanError::MissingChannel(name.clone()))
        })
        .collect()
}

#[async_trait]
impl<S: FrameStream> Reader for SynchronizedReader<S> {
    type Output = Vec<ChannelValue>;

    async fn read(&mut self) -> AppResult<Vec<ChannelValue>> {
        if self.closed {
            return Err(ScanError::Stream("synchronized reader is closed".into()));
        }
        let reference = FrameTimestamp::now();
        let frame = self.wait_for_frame(reference).await?;
        let values = extract(&frame, &self.primaries)?;
        self.cache = Some(frame);
        Ok(values)
    }

    async fn close(&mut self) -> AppResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.cache = None;
        self.stream
            .disconnect()
            .await
            .map_err(|err| ScanError::ShutdownFailed(vec![ScanError::stream(err)]))?;
        info!("synchronized reader closed");
        Ok(())
    }
}

impl<S: FrameStream> Drop for SynchronizedReader<S> {
    fn drop(&mut self) {
        if !self.closed {
            warn!("synchronized reader dropped without close(), stream left connected");
        }
    }
}
