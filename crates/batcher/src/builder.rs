//! The per-channel build state: accepted blocks, L1 origin range, timeout
//! tracking, and frame materialization.

use crate::{
    channel_out::ChannelOut,
    config::ChannelConfig,
    errors::{ChannelOutError, FullReason},
    params::ChannelId,
    types::{BlockId, Frame, L1BlockInfo, L2Block},
};
use std::sync::Arc;
use tracing::debug;

/// Wraps one [ChannelOut] with the metadata the manager needs to time out,
/// requeue, and prune the channel.
///
/// The block list is append-only: once a block is accepted by the codec it is
/// part of the channel for the channel's lifetime, so an invalidated channel
/// can requeue exactly what it consumed.
#[derive(Debug)]
pub struct ChannelBuilder {
    /// The configuration the channel was opened with.
    cfg: ChannelConfig,
    /// The codec compressing this channel's blocks.
    co: Box<dyn ChannelOut>,
    /// Blocks accepted by the codec, in order.
    blocks: Vec<Arc<L2Block>>,
    /// The lowest L1 origin among the accepted blocks.
    oldest_l1_origin: BlockId,
    /// The highest L1 origin among the accepted blocks.
    latest_l1_origin: BlockId,
    /// The first accepted L2 block.
    oldest_l2: BlockId,
    /// The most recently accepted L2 block.
    latest_l2: BlockId,
    /// The L1 block number construction began at; seeds the duration timeout.
    open_l1_block: u64,
    /// Why the channel is full, once it is.
    full_reason: Option<FullReason>,
}

impl ChannelBuilder {
    /// Creates a new [ChannelBuilder] on top of the given codec.
    pub fn new(cfg: ChannelConfig, open_l1_block: u64, co: Box<dyn ChannelOut>) -> Self {
        Self {
            cfg,
            co,
            blocks: Vec::new(),
            oldest_l1_origin: BlockId::default(),
            latest_l1_origin: BlockId::default(),
            oldest_l2: BlockId::default(),
            latest_l2: BlockId::default(),
            open_l1_block,
            full_reason: None,
        }
    }

    /// Adds a block to the channel.
    ///
    /// On success the L1 origin range and L2 range are extended. On
    /// [ChannelOutError::ChannelFull] the builder's block state is untouched
    /// and the error propagates so the caller stops feeding.
    pub fn add_block(&mut self, block: &Arc<L2Block>) -> Result<L1BlockInfo, ChannelOutError> {
        if let Some(reason) = self.full_reason {
            return Err(ChannelOutError::ChannelFull(reason));
        }
        match self.co.add_block(block) {
            Ok(l1_info) => {
                let origin = l1_info.id();
                if self.blocks.is_empty() {
                    self.oldest_l1_origin = origin;
                    self.oldest_l2 = block.id();
                }
                if origin.number > self.latest_l1_origin.number {
                    self.latest_l1_origin = origin;
                }
                self.latest_l2 = block.id();
                self.blocks.push(block.clone());
                Ok(l1_info)
            }
            Err(ChannelOutError::ChannelFull(reason)) => {
                self.set_full(reason);
                Err(ChannelOutError::ChannelFull(reason))
            }
            Err(err) => Err(err),
        }
    }

    /// Marks the builder full with reason [FullReason::DurationTimeout] once
    /// the channel has been open for the configured number of L1 blocks.
    /// Idempotent; a zero duration disables the timeout.
    pub fn check_timeout(&mut self, current_l1: u64) {
        if self.cfg.max_channel_duration == 0 || self.is_full() {
            return;
        }
        if current_l1.saturating_sub(self.open_l1_block) >= self.cfg.max_channel_duration {
            debug!(
                target: "channel-builder",
                current_l1,
                open_l1_block = self.open_l1_block,
                "channel duration timed out"
            );
            self.set_full(FullReason::DurationTimeout);
        }
    }

    /// Asks the codec to materialize frames. A full builder closes its codec
    /// so the final frame is flagged; the full reason is preserved.
    pub fn output_frames(&mut self) -> Result<(), ChannelOutError> {
        if self.is_full() {
            self.co.close()?;
        }
        self.co.output_frames()
    }

    fn set_full(&mut self, reason: FullReason) {
        if self.full_reason.is_none() {
            self.full_reason = Some(reason);
        }
    }

    /// Pops the next materialized frame from the codec.
    pub(crate) fn next_frame(&mut self) -> Option<Frame> {
        self.co.next_frame()
    }

    /// The channel id.
    pub fn id(&self) -> ChannelId {
        self.co.id()
    }

    /// The configuration the channel was opened with.
    pub const fn cfg(&self) -> &ChannelConfig {
        &self.cfg
    }

    /// Whether the builder has been marked full.
    pub const fn is_full(&self) -> bool {
        self.full_reason.is_some()
    }

    /// The reason the builder is full, if it is.
    pub const fn full_err(&self) -> Option<FullReason> {
        self.full_reason
    }

    /// The blocks accepted into this channel.
    pub fn blocks(&self) -> &[Arc<L2Block>] {
        &self.blocks
    }

    /// The L1 block number construction began at.
    pub const fn open_l1_block(&self) -> u64 {
        self.open_l1_block
    }

    /// The lowest L1 origin among the accepted blocks.
    pub const fn oldest_l1_origin(&self) -> BlockId {
        self.oldest_l1_origin
    }

    /// The highest L1 origin among the accepted blocks.
    pub const fn latest_l1_origin(&self) -> BlockId {
        self.latest_l1_origin
    }

    /// The first accepted L2 block.
    pub const fn oldest_l2(&self) -> BlockId {
        self.oldest_l2
    }

    /// The most recently accepted L2 block.
    pub const fn latest_l2(&self) -> BlockId {
        self.latest_l2
    }

    /// Uncompressed input bytes accepted by the codec.
    pub fn input_bytes(&self) -> usize {
        self.co.input_bytes()
    }

    /// Compressed bytes packed into frames so far.
    pub fn output_bytes(&self) -> usize {
        self.co.output_bytes()
    }

    /// Compressed bytes awaiting framing.
    pub fn ready_bytes(&self) -> usize {
        self.co.ready_bytes()
    }

    /// Frames materialized so far.
    pub fn total_frames(&self) -> u16 {
        self.co.total_frames()
    }
}
