//! Test utilities for the channel management core.

mod tracing;
pub use tracing::{CollectingLayer, TraceStorage};

use crate::{
    config::{ChannelConfig, ChannelConfigProvider},
    errors::FullReason,
    metrics::BatcherMetrics,
    params::ChannelId,
    types::{BlockInfo, L1BlockInfo, L2Block, L2BlockInfo},
};
use alloy_primitives::B256;
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, Mutex, PoisonError,
};

/// Deterministic hash for an L2 block number.
pub fn l2_hash(number: u64) -> B256 {
    let mut out = B256::ZERO;
    out.0[0] = 0x02;
    out.0[24..].copy_from_slice(&number.to_be_bytes());
    out
}

/// Deterministic hash for an L1 block number.
pub fn l1_hash(number: u64) -> B256 {
    let mut out = B256::ZERO;
    out.0[0] = 0x01;
    out.0[24..].copy_from_slice(&number.to_be_bytes());
    out
}

/// Builds a deterministic [L2Block] with a small payload.
pub fn test_block(number: u64, parent_hash: B256, l1_origin: u64) -> L2Block {
    L2Block {
        info: BlockInfo::new(l2_hash(number), number, parent_hash, number * 2),
        l1_info: L1BlockInfo {
            hash: l1_hash(l1_origin),
            number: l1_origin,
            sequence_number: 0,
        },
        transactions: vec![number.to_be_bytes().to_vec().into()],
    }
}

/// Deterministic pseudo-random bytes that resist compression, for tests
/// that need a channel to span several frames.
pub fn noisy_payload(seed: u64, len: usize) -> Vec<u8> {
    let mut x = seed.wrapping_mul(0x9E37_79B9_7F4A_7C15) | 1;
    (0..len)
        .map(|_| {
            x ^= x << 13;
            x ^= x >> 7;
            x ^= x << 17;
            (x >> 24) as u8
        })
        .collect()
}

/// Builds `count` parent-linked blocks starting at `start`, all with the
/// given L1 origin.
pub fn test_block_chain(start: u64, count: u64, l1_origin: u64) -> Vec<L2Block> {
    let mut parent = l2_hash(start.wrapping_sub(1));
    (start..start + count)
        .map(|number| {
            let block = test_block(number, parent, l1_origin);
            parent = block.info.hash;
            block
        })
        .collect()
}

/// A shared, mutable [ChannelConfigProvider] whose handle can be cloned into
/// a manager while the test keeps flipping it.
#[derive(Debug, Clone, Default)]
pub struct TestChannelConfigProvider(Arc<Mutex<ChannelConfig>>);

impl TestChannelConfigProvider {
    /// Creates a provider returning the given configuration.
    pub fn new(cfg: ChannelConfig) -> Self {
        Self(Arc::new(Mutex::new(cfg)))
    }

    /// Replaces the provided configuration.
    pub fn set(&self, cfg: ChannelConfig) {
        *self.0.lock().unwrap_or_else(PoisonError::into_inner) = cfg;
    }
}

impl ChannelConfigProvider for TestChannelConfigProvider {
    fn channel_config(&self) -> ChannelConfig {
        *self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A [BatcherMetrics] sink that counts events and tracks the pending-DA
/// gauge, for assertions.
#[derive(Debug, Default)]
pub struct TestBatcherMetrics {
    /// Channels opened.
    pub channels_opened: AtomicUsize,
    /// Channels closed.
    pub channels_closed: AtomicUsize,
    /// Terminal transaction outcomes recorded.
    pub batch_txs_submitted: AtomicUsize,
    /// Blocks consumed into channels.
    pub blocks_in_channel: AtomicUsize,
    pending_da: Mutex<f64>,
}

impl TestBatcherMetrics {
    /// Overrides the pending-DA gauge.
    pub fn set_pending_da_bytes(&self, value: f64) {
        *self.pending_da.lock().unwrap_or_else(PoisonError::into_inner) = value;
    }
}

impl BatcherMetrics for TestBatcherMetrics {
    fn record_l2_block_in_pending_queue(&self, block: &L2Block) {
        *self.pending_da.lock().unwrap_or_else(PoisonError::into_inner) +=
            block.da_size() as f64;
    }

    fn record_l2_block_in_channel(&self, block: &L2Block) {
        self.blocks_in_channel.fetch_add(1, Ordering::Relaxed);
        *self.pending_da.lock().unwrap_or_else(PoisonError::into_inner) -=
            block.da_size() as f64;
    }

    fn record_l2_blocks_added(
        &self,
        _latest_l2: Option<&L2BlockInfo>,
        _blocks_added: usize,
        _total_blocks: usize,
        _input_bytes: usize,
        _ready_bytes: usize,
    ) {
    }

    fn record_channel_opened(&self, _id: ChannelId, _total_blocks: usize) {
        self.channels_opened.fetch_add(1, Ordering::Relaxed);
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
        self.channels_closed.fetch_add(1, Ordering::Relaxed);
    }

    fn record_batch_tx_submitted(&self) {
        self.batch_txs_submitted.fetch_add(1, Ordering::Relaxed);
    }

    fn pending_da_bytes(&self) -> f64 {
        *self.pending_da.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
