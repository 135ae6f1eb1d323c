//! Mock Hardware Implementations
//!
//! Provides simulated channels and a simulated acquisition stream for testing
//! without a control system. All mock devices use async-safe operations
//! (tokio::time::sleep, not std::thread::sleep).
//!
//! # Available Mocks
//!
//! - `MockChannelClient` - Simulated actuator/readback channels that settle after
//!   a configurable number of reads
//! - `MockFrameStream` - Simulated frame stream, either scripted or live
//!
//! Both mocks are cheap to clone or probe, so a test can keep observing them
//! after handing them to the writer or reader.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::time::sleep;
use tracing::debug;

use crate::core::{ChannelValue, Frame, FrameTimestamp};
use crate::hardware::{ChannelClient, FrameStream, StreamConfig};

// =============================================================================
// MockChannelClient - Simulated Channels
// =============================================================================

/// Handle returned by [`MockChannelClient::connect`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MockHandle {
    name: String,
    id: u64,
}

impl MockHandle {
    /// Channel this handle is connected to.
    pub fn name(&self) -> &str {
        &self.name
    }
}

#[derive(Debug, Clone, Default)]
struct MockChannel {
    value: f64,
    target: Option<f64>,
    settle_reads: u32,
    reads_until_settled: u32,
    stuck: bool,
    unavailable_reads: u32,
    connect_failures: u32,
    connect_attempts: u32,
    gets: usize,
    puts: Vec<f64>,
}

#[derive(Debug, Default)]
struct MockChannelState {
    channels: HashMap<String, MockChannel>,
    open: HashMap<u64, String>,
    next_id: u64,
}

/// Simulated control-system channels
///
/// Simulates motors with:
/// - A readback that reaches the setpoint after `settle_reads` reads
/// - Optional stuck channels that never move
/// - Optional transient unavailability (`get` returns no value)
/// - Optional refused connection attempts
///
/// # Example
///
/// ```rust,ignore
/// let client = MockChannelClient::new()
///     .with_channel("MOTOR:X", 0.0)
///     .with_settle_reads("MOTOR:X", 3);
/// let handle = client.connect("MOTOR:X").await?;
/// client.put(&handle, 1.5).await?;
/// // three intermediate readbacks, then 1.5
/// ```
#[derive(Debug, Clone, Default)]
pub struct MockChannelClient {
    state: Arc<Mutex<MockChannelState>>,
}

impl MockChannelClient {
    /// Create a client without channels
    pub fn new() -> Self {
        Self::default()
    }

    fn update(self, name: &str, apply: impl FnOnce(&mut MockChannel)) -> Self {
        {
            let mut state = self.state.lock();
            apply(state.channels.entry(name.to_string()).or_default());
        }
        self
    }

    /// Add a channel holding `value`
    pub fn with_channel(self, name: &str, value: f64) -> Self {
        self.update(name, |channel| channel.value = value)
    }

    /// Readback reaches the setpoint on the read after `reads` intermediate reads
    pub fn with_settle_reads(self, name: &str, reads: u32) -> Self {
        self.update(name, |channel| channel.settle_reads = reads)
    }

    /// Channel accepts puts but its readback never moves
    pub fn with_stuck(self, name: &str) -> Self {
        self.update(name, |channel| channel.stuck = true)
    }

    /// The next `reads` gets return no value
    pub fn with_unavailable_reads(self, name: &str, reads: u32) -> Self {
        self.update(name, |channel| channel.unavailable_reads = reads)
    }

    /// The next `failures` connection attempts are refused
    pub fn with_connect_failures(self, name: &str, failures: u32) -> Self {
        self.update(name, |channel| channel.connect_failures = failures)
    }

    /// Current readback of a channel
    pub fn value(&self, name: &str) -> Option<f64> {
        self.state.lock().channels.get(name).map(|c| c.value)
    }

    /// Every value written to a channel, oldest first
    pub fn puts(&self, name: &str) -> Vec<f64> {
        self.state
            .lock()
            .channels
            .get(name)
            .map(|c| c.puts.clone())
            .unwrap_or_default()
    }

    /// Number of gets served for a channel
    pub fn gets(&self, name: &str) -> usize {
        self.state.lock().channels.get(name).map_or(0, |c| c.gets)
    }

    /// Number of connection attempts made for a channel
    pub fn connect_attempts(&self, name: &str) -> u32 {
        self.state
            .lock()
            .channels
            .get(name)
            .map_or(0, |c| c.connect_attempts)
    }

    /// Number of handles not yet disconnected
    pub fn open_connections(&self) -> usize {
        self.state.lock().open.len()
    }
}

fn check_open(state: &MockChannelState, handle: &MockHandle) -> Result<()> {
    if !state.open.contains_key(&handle.id) {
        bail!("MockChannelClient: handle for '{}' is not connected", handle.name);
    }
    Ok(())
}

#[async_trait]
impl ChannelClient for MockChannelClient {
    type Handle = MockHandle;

    async fn connect(&self, name: &str) -> Result<MockHandle> {
        let mut state = self.state.lock();
        let channel = state
            .channels
            .get_mut(name)
            .ok_or_else(|| anyhow!("MockChannelClient: unknown channel '{name}'"))?;
        channel.connect_attempts += 1;
        if channel.connect_failures > 0 {
            channel.connect_failures -= 1;
            bail!("MockChannelClient: connection to '{name}' refused");
        }

        state.next_id += 1;
        let id = state.next_id;
        state.open.insert(id, name.to_string());
        Ok(MockHandle {
            name: name.to_string(),
            id,
        })
    }

    async fn get(&self, handle: &MockHandle) -> Result<Option<f64>> {
        let mut state = self.state.lock();
        check_open(&state, handle)?;
        let channel = state
            .channels
            .get_mut(&handle.name)
            .ok_or_else(|| anyhow!("MockChannelClient: unknown channel '{}'", handle.name))?;

        channel.gets += 1;
        if channel.unavailable_reads > 0 {
            channel.unavailable_reads -= 1;
            return Ok(None);
        }

        if let (Some(target), false) = (channel.target, channel.stuck) {
            if channel.reads_until_settled == 0 {
                channel.value = target;
                channel.target = None;
            } else {
                channel.reads_until_settled -= 1;
                channel.value += (target - channel.value) / 2.0;
            }
        }
        Ok(Some(channel.value))
    }

    async fn put(&self, handle: &MockHandle, value: f64) -> Result<()> {
        let mut state = self.state.lock();
        check_open(&state, handle)?;
        let channel = state
            .channels
            .get_mut(&handle.name)
            .ok_or_else(|| anyhow!("MockChannelClient: unknown channel '{}'", handle.name))?;

        debug!(channel = %handle.name, value, "MockChannelClient: put");
        channel.puts.push(value);
        channel.target = Some(value);
        channel.reads_until_settled = channel.settle_reads;
        Ok(())
    }

    async fn disconnect(&self, handle: MockHandle) -> Result<()> {
        let mut state = self.state.lock();
        if state.open.remove(&handle.id).is_none() {
            bail!("MockChannelClient: '{}' already disconnected", handle.name);
        }
        Ok(())
    }
}

// =============================================================================
// MockFrameStream - Simulated Acquisition Stream
// =============================================================================

/// Produces the channel values of a live frame.
pub type FrameSource = Box<dyn FnMut() -> HashMap<String, ChannelValue> + Send>;

/// Shared view on a [`MockFrameStream`] that survives moving the stream.
#[derive(Debug, Clone, Default)]
pub struct MockStreamProbe {
    connected: Arc<AtomicBool>,
    receives: Arc<AtomicUsize>,
    disconnects: Arc<AtomicUsize>,
    channels: Arc<Mutex<Vec<String>>>,
}

impl MockStreamProbe {
    /// Whether the stream is currently connected
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Number of receive calls served
    pub fn receives(&self) -> usize {
        self.receives.load(Ordering::SeqCst)
    }

    /// Number of disconnect calls
    pub fn disconnects(&self) -> usize {
        self.disconnects.load(Ordering::SeqCst)
    }

    /// Channels requested at connection time
    pub fn channels(&self) -> Vec<String> {
        self.channels.lock().clone()
    }
}

/// Simulated frame stream
///
/// Serves scripted receive results first (`None` entries simulate a receive
/// timeout), then falls back to a live source that stamps every frame with the
/// current time after waiting one frame period. Without a live source an
/// exhausted script behaves like a silent stream.
pub struct MockFrameStream {
    script: VecDeque<Option<Frame>>,
    source: Option<FrameSource>,
    period: Duration,
    connect_failures: u32,
    probe: MockStreamProbe,
}

impl MockFrameStream {
    /// Stream replaying `script` in order
    pub fn scripted(script: Vec<Option<Frame>>) -> Self {
        Self {
            script: script.into(),
            source: None,
            period: Duration::ZERO,
            connect_failures: 0,
            probe: MockStreamProbe::default(),
        }
    }

    /// Stream emitting a fresh frame from `source` every `period`
    pub fn live(period: Duration, source: FrameSource) -> Self {
        Self {
            source: Some(source),
            period,
            ..Self::scripted(Vec::new())
        }
    }

    /// Serve `script` before switching to the live source
    pub fn with_script(mut self, script: Vec<Option<Frame>>) -> Self {
        self.script = script.into();
        self
    }

    /// The next `failures` connection attempts are refused
    pub fn with_connect_failures(mut self, failures: u32) -> Self {
        self.connect_failures = failures;
        self
    }

    /// Observer that stays valid after the stream is moved
    pub fn probe(&self) -> MockStreamProbe {
        self.probe.clone()
    }
}

#[async_trait]
impl FrameStream for MockFrameStream {
    async fn connect(&mut self, config: &StreamConfig, channels: &[String]) -> Result<()> {
        if self.connect_failures > 0 {
            self.connect_failures -= 1;
            bail!("MockFrameStream: connection refused");
        }
        debug!(
            host = ?config.host,
            port = ?config.port,
            channels = channels.len(),
            "MockFrameStream: connected"
        );
        *self.probe.channels.lock() = channels.to_vec();
        self.probe.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn receive(&mut self, timeout: Duration) -> Result<Option<Frame>> {
        if !self.probe.is_connected() {
            bail!("MockFrameStream: receive on a disconnected stream");
        }
        self.probe.receives.fetch_add(1, Ordering::SeqCst);

        if let Some(entry) = self.script.pop_front() {
            if entry.is_none() {
                sleep(timeout).await;
            }
            return Ok(entry);
        }

        match self.source.as_mut() {
            Some(source) if self.period <= timeout => {
                sleep(self.period).await;
                Ok(Some(Frame {
                    timestamp: FrameTimestamp::now(),
                    data: source(),
                }))
            }
            _ => {
                sleep(timeout).await;
                Ok(None)
            }
        }
    }

    async fn disconnect(&mut self) -> Result<()> {
        self.probe.disconnects.fetch_add(1, Ordering::SeqCst);
        self.probe.connected.store(false, Ordering::SeqCst);
        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
