//! A channel: build state plus the lifecycle of its frames as L1
//! transactions.

use crate::{
    builder::ChannelBuilder,
    channel_out::ChannelOut,
    config::ChannelConfig,
    errors::{ChannelOutError, FullReason},
    params::ChannelId,
    types::{BlockId, Frame, L1BlockInfo, L2Block, TxData, TxId},
};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tracing::{debug, warn};

/// Composes a [ChannelBuilder] with frame-submission tracking: frames waiting
/// to be dispatched, in-flight transaction ids, confirmations, and the
/// inclusion timeout latch.
///
/// Frames stay resubmittable for the channel's lifetime: a failed transaction
/// returns its frame to the head of the pending deque, and the next dispatch
/// re-sends the same bytes under a fresh [TxId].
#[derive(Debug)]
pub struct Channel {
    /// The underlying build state.
    builder: ChannelBuilder,
    /// Frames awaiting dispatch, oldest first.
    pending_frames: VecDeque<Frame>,
    /// Frames currently out as transactions, by id.
    inflight: HashMap<TxId, Frame>,
    /// Frames confirmed on L1.
    confirmed_count: u16,
    /// Dispatch attempts so far; doubles as the [TxId] attempt sequence.
    attempts: u32,
    /// The L1 block number by which every frame must be included.
    max_inclusion_block: u64,
    /// Latched once any frame confirmed past `max_inclusion_block`.
    timed_out: bool,
}

impl Channel {
    /// Creates a new open [Channel].
    pub fn new(cfg: ChannelConfig, open_l1_block: u64, co: Box<dyn ChannelOut>) -> Self {
        let max_inclusion_block =
            (open_l1_block + cfg.max_channel_duration).saturating_sub(cfg.sub_safety_margin);
        Self {
            builder: ChannelBuilder::new(cfg, open_l1_block, co),
            pending_frames: VecDeque::new(),
            inflight: HashMap::new(),
            confirmed_count: 0,
            attempts: 0,
            max_inclusion_block,
            timed_out: false,
        }
    }

    /// The channel id.
    pub fn id(&self) -> ChannelId {
        self.builder.id()
    }

    /// Whether a frame is waiting to be dispatched (including frames requeued
    /// after a failed transaction).
    pub fn has_tx_data(&self) -> bool {
        !self.pending_frames.is_empty()
    }

    /// Pops the next pending frame and dispatches it under a fresh [TxId].
    pub fn next_tx_data(&mut self) -> Option<TxData> {
        let frame = self.pending_frames.pop_front()?;
        self.attempts += 1;
        let id = TxId::new(self.id(), frame.number, self.attempts);
        self.inflight.insert(id, frame.clone());
        debug!(target: "channel", id = %id, "dispatching frame");
        Some(TxData { id, frame })
    }

    /// Records a failed transaction, returning its frame to the head of the
    /// pending deque so dispatch order is preserved across retries.
    pub fn tx_failed(&mut self, id: &TxId) {
        match self.inflight.remove(id) {
            Some(frame) => self.pending_frames.push_front(frame),
            None => warn!(target: "channel", id = %id, "unknown transaction marked as failed"),
        }
    }

    /// Records a confirmed transaction. Returns `true` when the inclusion
    /// block exceeds the channel's inclusion bound, latching the channel as
    /// timed out.
    pub fn tx_confirmed(&mut self, id: &TxId, inclusion_block: BlockId) -> bool {
        let Some(_frame) = self.inflight.remove(id) else {
            warn!(target: "channel", id = %id, "unknown transaction marked as confirmed");
            return false;
        };
        self.confirmed_count += 1;
        if inclusion_block.number > self.max_inclusion_block {
            warn!(
                target: "channel",
                id = %id,
                inclusion_block = inclusion_block.number,
                max_inclusion_block = self.max_inclusion_block,
                "transaction included too late, channel timed out"
            );
            self.timed_out = true;
            return true;
        }
        false
    }

    /// Whether no frame of this channel has ever been dispatched.
    pub const fn none_submitted(&self) -> bool {
        self.attempts == 0
    }

    /// Whether every frame has been dispatched and confirmed.
    pub fn is_fully_submitted(&self) -> bool {
        self.builder.is_full() && self.confirmed_count == self.builder.total_frames()
    }

    /// Whether a frame confirmed past the inclusion bound.
    pub const fn is_timed_out(&self) -> bool {
        self.timed_out
    }

    /// The L1 block number by which every frame must be included.
    pub const fn max_inclusion_block(&self) -> u64 {
        self.max_inclusion_block
    }

    /// Materializes frames from the builder into the pending deque.
    pub(crate) fn output_frames(&mut self) -> Result<(), ChannelOutError> {
        self.builder.output_frames()?;
        while let Some(frame) = self.builder.next_frame() {
            self.pending_frames.push_back(frame);
        }
        Ok(())
    }

    /// Adds a block to the channel's builder.
    pub fn add_block(&mut self, block: &Arc<L2Block>) -> Result<L1BlockInfo, ChannelOutError> {
        self.builder.add_block(block)
    }

    /// Forwards the current L1 head to the builder's duration timeout.
    pub fn check_timeout(&mut self, current_l1: u64) {
        self.builder.check_timeout(current_l1);
    }

    /// Whether the channel is full (no further blocks accepted).
    pub fn is_full(&self) -> bool {
        self.builder.is_full()
    }

    /// The reason the channel is full, if it is.
    pub const fn full_err(&self) -> Option<FullReason> {
        self.builder.full_err()
    }

    /// The blocks consumed into this channel.
    pub fn blocks(&self) -> &[Arc<L2Block>] {
        self.builder.blocks()
    }

    /// The lowest L1 origin among the channel's blocks.
    pub const fn oldest_l1_origin(&self) -> BlockId {
        self.builder.oldest_l1_origin()
    }

    /// The highest L1 origin among the channel's blocks.
    pub const fn latest_l1_origin(&self) -> BlockId {
        self.builder.latest_l1_origin()
    }

    /// The first L2 block in the channel.
    pub const fn oldest_l2(&self) -> BlockId {
        self.builder.oldest_l2()
    }

    /// The last L2 block in the channel.
    pub const fn latest_l2(&self) -> BlockId {
        self.builder.latest_l2()
    }

    /// Uncompressed input bytes accepted by the channel's codec.
    pub fn input_bytes(&self) -> usize {
        self.builder.input_bytes()
    }

    /// Compressed bytes packed into frames so far.
    pub fn output_bytes(&self) -> usize {
        self.builder.output_bytes()
    }

    /// Compressed bytes awaiting framing.
    pub fn ready_bytes(&self) -> usize {
        self.builder.ready_bytes()
    }

    /// Frames materialized so far.
    pub fn total_frames(&self) -> u16 {
        self.builder.total_frames()
    }

    /// Frames currently pending dispatch.
    pub fn pending_frame_count(&self) -> usize {
        self.pending_frames.len()
    }

    /// Frames currently in flight as transactions.
    pub fn inflight_count(&self) -> usize {
        self.inflight.len()
    }

    /// Frames confirmed on L1.
    pub const fn confirmed_count(&self) -> u16 {
        self.confirmed_count
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        channel_out::CompressorChannelOut,
        test_utils::{noisy_payload, test_block},
    };
    use alloy_primitives::B256;

    fn full_channel(max_frame_size: usize) -> Channel {
        let cfg = ChannelConfig {
            target_num_frames: 1,
            max_frame_size,
            max_channel_duration: 10,
            sub_safety_margin: 2,
            ..Default::default()
        };
        let co = CompressorChannelOut::new([0xEE; 16], &cfg).unwrap();
        let mut channel = Channel::new(cfg, 100, Box::new(co));
        let mut block = test_block(10, B256::with_last_byte(1), 100);
        // An incompressible payload guarantees several frames at small
        // frame sizes.
        block.transactions = vec![noisy_payload(10, 300).into()];
        channel.add_block(&Arc::new(block)).unwrap();
        channel.check_timeout(110);
        channel.output_frames().unwrap();
        channel
    }

    #[test]
    fn test_max_inclusion_block() {
        let cfg = ChannelConfig {
            max_channel_duration: 10,
            sub_safety_margin: 2,
            ..Default::default()
        };
        let co = CompressorChannelOut::new([0x00; 16], &cfg).unwrap();
        let channel = Channel::new(cfg, 100, Box::new(co));
        assert_eq!(channel.max_inclusion_block(), 108);
    }

    #[test]
    fn test_dispatch_and_confirm_all() {
        let mut channel = full_channel(50);
        let total = channel.total_frames();
        assert!(total > 0);
        assert!(channel.none_submitted());

        let mut txs = Vec::new();
        while channel.has_tx_data() {
            txs.push(channel.next_tx_data().unwrap());
        }
        assert_eq!(txs.len() as u16, total);
        assert!(!channel.none_submitted());
        assert!(!channel.is_fully_submitted());

        for tx in &txs {
            let timed_out =
                channel.tx_confirmed(&tx.id, BlockId { hash: B256::ZERO, number: 105 });
            assert!(!timed_out);
        }
        assert!(channel.is_fully_submitted());
        assert!(!channel.is_timed_out());
    }

    #[test]
    fn test_failed_frame_requeued_at_head() {
        let mut channel = full_channel(50);
        let tx1 = channel.next_tx_data().unwrap();
        channel.tx_failed(&tx1.id);

        let tx2 = channel.next_tx_data().unwrap();
        assert_eq!(tx2.frame, tx1.frame);
        assert_ne!(tx2.id, tx1.id);
        assert!(tx2.id > tx1.id);
    }

    #[test]
    fn test_late_inclusion_latches_timeout() {
        let mut channel = full_channel(50);
        let tx = channel.next_tx_data().unwrap();
        // max inclusion block is 100 + 10 - 2 = 108.
        assert!(channel.tx_confirmed(&tx.id, BlockId { hash: B256::ZERO, number: 109 }));
        assert!(channel.is_timed_out());
    }

    #[test]
    fn test_unknown_ids_ignored() {
        let mut channel = full_channel(50);
        let bogus = TxId::new([0x12; 16], 0, 1);
        channel.tx_failed(&bogus);
        assert!(!channel.tx_confirmed(&bogus, BlockId::default()));
        assert_eq!(channel.confirmed_count(), 0);
    }

    #[test]
    fn test_frame_conservation() {
        let mut channel = full_channel(50);
        let total = channel.total_frames() as usize;
        let tx = channel.next_tx_data().unwrap();
        assert_eq!(
            channel.pending_frame_count() + channel.inflight_count()
                + channel.confirmed_count() as usize,
            total
        );
        channel.tx_confirmed(&tx.id, BlockId { hash: B256::ZERO, number: 105 });
        assert_eq!(
            channel.pending_frame_count() + channel.inflight_count()
                + channel.confirmed_count() as usize,
            total
        );
    }
}
