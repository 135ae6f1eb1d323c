//! Scan driver: one position at a time, move then read then report.
//!
//! ```text
//! for position in positioner.positions():
//!     writer.write(position.setpoints())   // waits for convergence
//!     data = reader.read()                 // first frame after the move
//!     callbacks(position, data)
//!     processor.process(position, data)
//! ```
//!
//! The writer and the reader are closed when the scan ends, whether it
//! completed or failed. A failure while closing is reported as
//! [`ScanError::ShutdownFailed`] unless the scan itself already failed, in
//! which case the scan error wins and the close failure is logged.

use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::core::Setpoints;
use crate::error::{AppResult, ScanError};
use crate::hardware::ChannelClient;
use crate::positioner::Positioner;
use crate::reader::Reader;
use crate::writer::ActuatorWriter;

/// Per-position callback.
pub type Callback<P, D> = Box<dyn FnMut(&P, &D) + Send>;

/// Runs registered callbacks in registration order, on the scan task.
pub struct CallbackExecutor<P, D> {
    callbacks: Vec<Callback<P, D>>,
}

impl<P, D> Default for CallbackExecutor<P, D> {
    fn default() -> Self {
        Self {
            callbacks: Vec::new(),
        }
    }
}

impl<P, D> CallbackExecutor<P, D> {
    /// Creates an executor with no callbacks.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a callback; it runs after the ones already registered.
    pub fn register(&mut self, callback: impl FnMut(&P, &D) + Send + 'static) {
        self.callbacks.push(Box::new(callback));
    }

    /// Number of registered callbacks.
    pub fn len(&self) -> usize {
        self.callbacks.len()
    }

    /// Whether no callback is registered.
    pub fn is_empty(&self) -> bool {
        self.callbacks.is_empty()
    }

    /// Runs every callback with one acquired point.
    pub fn execute(&mut self, position: &P, data: &D) {
        for callback in &mut self.callbacks {
            callback(position, data);
        }
    }
}

/// Consumer of the `(position, data)` pairs of a scan.
pub trait DataProcessor<P, D> {
    /// Handles one acquired point; called once per position, in scan order.
    fn process(&mut self, position: &P, data: &D);
}

/// One acquired scan point.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ScanPoint<P, D> {
    /// Position the actuators converged to
    pub position: P,
    /// Reader output captured after the move
    pub data: D,
}

/// Keeps every `(position, data)` pair in acquisition order.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ScanCollector<P, D> {
    points: Vec<ScanPoint<P, D>>,
}

impl<P, D> Default for ScanCollector<P, D> {
    fn default() -> Self {
        Self { points: Vec::new() }
    }
}

impl<P, D> ScanCollector<P, D> {
    /// Creates an empty collector.
    pub fn new() -> Self {
        Self::default()
    }

    /// Points collected so far.
    pub fn points(&self) -> &[ScanPoint<P, D>] {
        &self.points
    }

    /// Consumes the collector, returning its points.
    pub fn into_points(self) -> Vec<ScanPoint<P, D>> {
        self.points
    }
}

impl<P: Clone, D: Clone> DataProcessor<P, D> for ScanCollector<P, D> {
    fn process(&mut self, position: &P, data: &D) {
        self.points.push(ScanPoint {
            position: position.clone(),
            data: data.clone(),
        });
    }
}

/// An open-loop scan over a positioner with one writer and one reader.
pub struct Scan<P, C, R>
where
    P: Positioner,
    C: ChannelClient,
    R: Reader,
{
    positioner: P,
    writer: ActuatorWriter<C>,
    reader: R,
    tolerance: f64,
    write_timeout: Duration,
    callbacks: CallbackExecutor<P::Position, R::Output>,
}

impl<P, C, R> Scan<P, C, R>
where
    P: Positioner,
    P::Position: Setpoints,
    C: ChannelClient,
    R: Reader,
{
    /// Takes ownership of a connected writer and reader.
    pub fn new(
        positioner: P,
        writer: ActuatorWriter<C>,
        reader: R,
        tolerance: f64,
        write_timeout: Duration,
    ) -> Self {
        Self {
            positioner,
            writer,
            reader,
            tolerance,
            write_timeout,
            callbacks: CallbackExecutor::new(),
        }
    }

    /// Registers a callback run after every acquired position.
    pub fn on_position(
        mut self,
        callback: impl FnMut(&P::Position, &R::Output) + Send + 'static,
    ) -> Self {
        self.callbacks.register(callback);
        self
    }

    /// Runs the scan to completion, then closes the writer and the reader.
    ///
    /// Returns the number of acquired positions.
    pub async fn run<D>(mut self, processor: &mut D) -> AppResult<usize>
    where
        D: DataProcessor<P::Position, R::Output>,
    {
        info!(
            positions = self.positioner.num_positions(),
            channels = ?self.writer.channels(),
            "scan started"
        );
        let result = self.acquire(processor).await;
        let shutdown = self.shutdown().await;

        match (result, shutdown) {
            (Ok(acquired), Ok(())) => {
                info!(acquired, "scan finished");
                Ok(acquired)
            }
            (Ok(_), Err(err)) => Err(err),
            (Err(err), Ok(())) => {
                warn!(error = %err, "scan aborted");
                Err(err)
            }
            (Err(err), Err(shutdown_err)) => {
                warn!(error = %err, shutdown = ?shutdown_err, "scan aborted, shutdown failed");
                Err(err)
            }
        }
    }

    async fn acquire<D>(&mut self, processor: &mut D) -> AppResult<usize>
    where
        D: DataProcessor<P::Position, R::Output>,
    {
        let mut acquired = 0;
        for (index, position) in self.positioner.positions().enumerate() {
            debug!(index, "moving to position");
            self.writer
                .write(&position.setpoints(), self.tolerance, self.write_timeout)
                .await?;
            let data = self.reader.read().await?;
            self.callbacks.execute(&position, &data);
            processor.process(&position, &data);
            acquired += 1;
        }
        Ok(acquired)
    }

    async fn shutdown(&mut self) -> AppResult<()> {
        let mut errors = Vec::new();
        for result in [self.writer.close().await, self.reader.close().await] {
            match result {
                Ok(()) => {}
                Err(ScanError::ShutdownFailed(inner)) => errors.extend(inner),
                Err(err) => errors.push(err),
            }
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ScanError::ShutdownFailed(errors))
        }
    }
}
