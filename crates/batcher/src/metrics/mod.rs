//! Metrics facade for the channel management core.

mod noop;
pub use noop::NoopBatcherMetrics;

use crate::{
    errors::FullReason,
    params::ChannelId,
    types::{L2Block, L2BlockInfo},
};

/// Sink for the counters and gauges the channel manager records.
///
/// Implementations are expected to be fast and non-blocking; every method is
/// invoked synchronously while the manager holds its lock.
pub trait BatcherMetrics: Send + Sync {
    /// An L2 block entered the pending queue (or re-entered it after a
    /// channel was invalidated).
    fn record_l2_block_in_pending_queue(&self, block: &L2Block);

    /// An L2 block was consumed into a channel.
    fn record_l2_block_in_channel(&self, block: &L2Block);

    /// A batch of blocks was added to the current channel.
    fn record_l2_blocks_added(
        &self,
        latest_l2: Option<&L2BlockInfo>,
        blocks_added: usize,
        total_blocks: usize,
        input_bytes: usize,
        ready_bytes: usize,
    );

    /// A new channel was opened.
    fn record_channel_opened(&self, id: ChannelId, total_blocks: usize);

    /// A channel was closed with the given accounting.
    #[allow(clippy::too_many_arguments)]
    fn record_channel_closed(
        &self,
        id: ChannelId,
        pending_blocks: usize,
        num_frames: u16,
        input_bytes: usize,
        output_bytes: usize,
        full_reason: Option<FullReason>,
    );

    /// A batch transaction reached a terminal outcome.
    fn record_batch_tx_submitted(&self);

    /// The estimated DA bytes of blocks queued but not yet in a channel.
    fn pending_da_bytes(&self) -> f64;
}
