//! No-op implementation of the metrics facade.

use crate::{
    errors::FullReason,
    metrics::BatcherMetrics,
    params::ChannelId,
    types::{L2Block, L2BlockInfo},
};

/// No-op implementation of [BatcherMetrics].
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopBatcherMetrics;

impl BatcherMetrics for NoopBatcherMetrics {
    fn record_l2_block_in_pending_queue(&self, _block: &L2Block) {
        // No-op
    }

    fn record_l2_block_in_channel(&self, _block: &L2Block) {
        // No-op
    }

    fn record_l2_blocks_added(
        &self,
        _latest_l2: Option<&L2BlockInfo>,
        _blocks_added: usize,
        _total_blocks: usize,
        _input_bytes: usize,
        _ready_bytes: usize,
    ) {
        // No-op
    }

    fn record_channel_opened(&self, _id: ChannelId, _total_blocks: usize) {
        // No-op
    }

    fn record_channel_closed(
        &self,
        _id: ChannelId,
        _pending_blocks: usize,
        _num_frames: u16,
        _input_bytes: usize,
        _output_bytes: usize,
        _full_reason: Option<FullReason>,
    ) {
        // No-op
    }

    fn record_batch_tx_submitted(&self) {
        // No-op
    }

    fn pending_da_bytes(&self) -> f64 {
        0.0
    }
}
