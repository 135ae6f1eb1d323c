//! Readers acquire the data recorded at each scan position.
//!
//! - [`SynchronizedReader`]: waits for the first stream frame captured after
//!   the move and caches it, so monitor values come from the same frame.
//! - [`ChannelReader`]: gets channel values directly, one or more samples each.

pub mod channel;
pub mod synchronized;

pub use channel::{ChannelReader, Sample};
pub use synchronized::SynchronizedReader;

use async_trait::async_trait;

use crate::error::AppResult;

/// Per-position data acquisition, owning its connections until closed.
#[async_trait]
pub trait Reader: Send {
    /// Values produced by one read.
    type Output: Send;

    /// Acquires the values for the position that was just reached.
    async fn read(&mut self) -> AppResult<Self::Output>;

    /// Releases the connections. Calling it again is a no-op.
    async fn close(&mut self) -> AppResult<()>;
}
