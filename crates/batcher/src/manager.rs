//! The channel manager: the public, concurrency-safe surface of the batch
//! submission core.

use crate::{
    channel::Channel,
    channel_out::{default_channel_out_factory, ChannelOutFactory},
    config::{ChannelConfig, ChannelConfigProvider, RollupConfig},
    errors::{BatcherError, ChannelOutError},
    metrics::BatcherMetrics,
    params::ChannelId,
    types::{BlockId, L1BlockInfo, L2Block, L2BlockInfo, SyncStatus, TxData, TxId},
};
use alloy_primitives::{hex, B256};
use std::{
    collections::{HashMap, VecDeque},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};
use tracing::{debug, info, trace, warn};

/// Stores a contiguous set of L2 blocks and turns them into channels.
///
/// Blocks enter through [add_l2_block](Self::add_l2_block); frames leave
/// through [tx_data](Self::tx_data) and their terminal outcomes come back
/// through [tx_failed](Self::tx_failed) and [tx_confirmed](Self::tx_confirmed),
/// which drive re-sends and channel-timeout requeues.
///
/// Every public operation acquires one exclusive lock for its full duration,
/// so the manager is safe for concurrent access. It performs no background
/// work: timeouts are deterministic functions of the L1 head numbers supplied
/// by the caller.
pub struct ChannelManager {
    inner: Mutex<State>,
}

impl core::fmt::Debug for ChannelManager {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let state = self.state();
        f.debug_struct("ChannelManager")
            .field("blocks", &state.blocks.len())
            .field("block_cursor", &state.block_cursor)
            .field("channels", &state.channel_queue.len())
            .field("inflight_txs", &state.tx_channels.len())
            .finish_non_exhaustive()
    }
}

impl ChannelManager {
    /// Creates a new [ChannelManager]. The initial default [ChannelConfig]
    /// is pulled from the provider; the channel-out factory defaults to the
    /// built-in compressor codec.
    pub fn new(
        metrics: Arc<dyn BatcherMetrics>,
        cfg_provider: Box<dyn ChannelConfigProvider>,
        rollup_cfg: RollupConfig,
    ) -> Self {
        let default_cfg = cfg_provider.channel_config();
        Self {
            inner: Mutex::new(State {
                metrics,
                cfg_provider,
                rollup_cfg,
                out_factory: default_channel_out_factory(),
                blocks: VecDeque::new(),
                block_cursor: 0,
                l1_origin_last_submitted_channel: BlockId::default(),
                default_cfg,
                tip: None,
                current_channel: None,
                channel_queue: Vec::new(),
                tx_channels: HashMap::new(),
            }),
        }
    }

    /// Replaces the channel-out factory. Intended for tests.
    pub fn set_channel_out_factory(&self, out_factory: ChannelOutFactory) {
        self.state().out_factory = out_factory;
    }

    /// Appends an L2 block to the pending queue. Returns
    /// [BatcherError::Reorg] if the block does not extend the block most
    /// recently added; the parent check is skipped for the first block after
    /// a [clear](Self::clear).
    pub fn add_l2_block(&self, block: L2Block) -> Result<(), BatcherError> {
        self.state().add_l2_block(block)
    }

    /// Clears the entire state of the channel manager, seeding the L1-origin
    /// watermark used for subsequent channels' duration timeouts. Intended
    /// for startup and L2-reorg recovery.
    pub fn clear(&self, l1_origin_last_submitted_channel: BlockId) {
        self.state().clear(l1_origin_last_submitted_channel);
    }

    /// Returns the next tx data that should be submitted to L1.
    ///
    /// If the first channel with data is mid-submission, its remaining
    /// frames are returned unconditionally. Otherwise the config provider is
    /// re-queried and, if the preferred DA modality changed, the unsubmitted
    /// channel is invalidated and its blocks rebuilt under the new config
    /// before a frame is returned. [BatcherError::Eof] signals that nothing
    /// is ready right now.
    pub fn tx_data(&self, l1_head: BlockId) -> Result<TxData, BatcherError> {
        self.state().tx_data(l1_head)
    }

    /// Records a transaction as failed. Its frame re-enters the pending
    /// queue and will be re-dispatched by a later [tx_data](Self::tx_data).
    pub fn tx_failed(&self, id: &TxId) {
        self.state().tx_failed(id);
    }

    /// Records a transaction as confirmed at the given L1 inclusion block.
    /// A confirmation past the owning channel's inclusion bound times the
    /// channel out and requeues its blocks.
    pub fn tx_confirmed(&self, id: &TxId, inclusion_block: BlockId) {
        self.state().tx_confirmed(id, inclusion_block);
    }

    /// Dequeues blocks from the head of the queue that the remote node now
    /// considers safe. Anomalous safe heads (reversed, ahead of our view, or
    /// on a different chain) trigger a full [clear](Self::clear).
    pub fn prune_safe_blocks(&self, new_safe_head: L2BlockInfo) {
        self.state().prune_safe_blocks(new_safe_head);
    }

    /// Drops channels whose blocks are all at or below the new safe head.
    pub fn prune_channels(&self, new_safe_head: L2BlockInfo) {
        self.state().prune_channels(new_safe_head);
    }

    /// Infers from the supplied [SyncStatus] whether the remote node made
    /// the safe-head progress that fully submitted channels imply.
    pub fn check_expected_progress(&self, sync_status: SyncStatus) -> Result<(), BatcherError> {
        self.state().check_expected_progress(&sync_status)
    }

    /// The estimated bytes pending for the DA layer, from blocks queued but
    /// not yet in a channel, clamped to the `i64` range.
    pub fn pending_da_bytes(&self) -> i64 {
        self.state().pending_da_bytes()
    }

    /// Shutdown cross-check: errors with [BatcherError::PendingAfterClose]
    /// when pending blocks remain or any channel still holds undelivered
    /// data. Never mutates state; the caller decides whether to drain or
    /// abandon.
    pub fn close(&self) -> Result<(), BatcherError> {
        self.state().close()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// The state owned by the manager's lock.
struct State {
    metrics: Arc<dyn BatcherMetrics>,
    cfg_provider: Box<dyn ChannelConfigProvider>,
    rollup_cfg: RollupConfig,
    out_factory: ChannelOutFactory,

    /// All blocks since the last clear, in chain order.
    blocks: VecDeque<Arc<L2Block>>,
    /// Index into `blocks`: everything before it has been consumed into a
    /// channel, everything from it on is pending.
    block_cursor: usize,
    /// The highest L1 origin among channels whose frames have started being
    /// sent; seeds the duration timeout of subsequent channels.
    l1_origin_last_submitted_channel: BlockId,
    /// The config to open the next channel with.
    default_cfg: ChannelConfig,
    /// Hash of the most recently appended block, for reorg detection.
    tip: Option<B256>,

    /// The open channel accepting new blocks, if any. Always the youngest
    /// entry of `channel_queue`.
    current_channel: Option<ChannelId>,
    /// All live channels, oldest first. Every channel before the current one
    /// is closed.
    channel_queue: Vec<Channel>,
    /// Owning channel of every in-flight transaction.
    tx_channels: HashMap<TxId, ChannelId>,
}

impl core::fmt::Debug for State {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("State")
            .field("blocks", &self.blocks.len())
            .field("block_cursor", &self.block_cursor)
            .field("channels", &self.channel_queue.len())
            .field("tx_channels", &self.tx_channels.len())
            .finish_non_exhaustive()
    }
}

impl State {
    fn pending_blocks(&self) -> usize {
        self.blocks.len() - self.block_cursor
    }

    fn channel_index(&self, id: ChannelId) -> Option<usize> {
        self.channel_queue.iter().position(|ch| ch.id() == id)
    }

    fn current_channel_index(&self) -> Option<usize> {
        let id = self.current_channel?;
        self.channel_queue.iter().rposition(|ch| ch.id() == id)
    }

    fn current_channel_mut(&mut self) -> Option<&mut Channel> {
        let idx = self.current_channel_index()?;
        Some(&mut self.channel_queue[idx])
    }

    fn add_l2_block(&mut self, block: L2Block) -> Result<(), BatcherError> {
        if let Some(tip) = self.tip {
            if tip != block.info.parent_hash {
                return Err(BatcherError::Reorg);
            }
        }

        let block = Arc::new(block);
        self.metrics.record_l2_block_in_pending_queue(&block);
        self.tip = Some(block.info.hash);
        self.blocks.push_back(block);
        Ok(())
    }

    fn clear(&mut self, l1_origin_last_submitted_channel: BlockId) {
        trace!(target: "channel-manager", "clearing channel manager state");
        self.blocks.clear();
        self.block_cursor = 0;
        self.l1_origin_last_submitted_channel = l1_origin_last_submitted_channel;
        self.tip = None;
        self.current_channel = None;
        self.channel_queue.clear();
        self.tx_channels.clear();
    }

    fn tx_failed(&mut self, id: &TxId) {
        match self.tx_channels.remove(id) {
            Some(chid) => match self.channel_index(chid) {
                Some(idx) => self.channel_queue[idx].tx_failed(id),
                None => warn!(
                    target: "channel-manager",
                    id = %id,
                    "failed transaction's channel no longer in state"
                ),
            },
            None => warn!(
                target: "channel-manager",
                id = %id,
                "transaction from unknown channel marked as failed"
            ),
        }
    }

    fn tx_confirmed(&mut self, id: &TxId, inclusion_block: BlockId) {
        match self.tx_channels.remove(id) {
            Some(chid) => match self.channel_index(chid) {
                Some(idx) => {
                    if self.channel_queue[idx].tx_confirmed(id, inclusion_block) {
                        self.handle_channel_invalidated(idx);
                    }
                }
                None => warn!(
                    target: "channel-manager",
                    id = %id,
                    "confirmed transaction's channel no longer in state"
                ),
            },
            None => warn!(
                target: "channel-manager",
                id = %id,
                "transaction from unknown channel marked as confirmed"
            ),
        }
        self.metrics.record_batch_tx_submitted();
        debug!(
            target: "channel-manager",
            id = %id,
            block = %inclusion_block,
            "marked transaction as confirmed"
        );
    }

    /// Moves the block cursor back to the block with the supplied id, if it
    /// is in the queue and the cursor is ahead of it. Panics when the block
    /// is not in state, which indicates a programmer error elsewhere.
    fn rewind_to_block(&mut self, block: BlockId) {
        let head_number = match self.blocks.front() {
            Some(head) if block.number >= head.info.number => head.info.number,
            _ => panic!("tried to rewind to nonexistent block"),
        };
        let idx = (block.number - head_number) as usize;
        match self.blocks.get(idx) {
            Some(found) if found.info.hash == block.hash => {
                if idx < self.block_cursor {
                    self.block_cursor = idx;
                }
            }
            _ => panic!("tried to rewind to nonexistent block"),
        }
    }

    /// Requeues the blocks of the channel at `idx` and drops it from the
    /// queue along with every newer channel, which necessarily share the
    /// requeued blocks.
    fn handle_channel_invalidated(&mut self, idx: usize) {
        let blocks: Vec<Arc<L2Block>> = self.channel_queue[idx].blocks().to_vec();
        if blocks.is_empty() {
            // A channel can time out before any blocks were added, leaving a
            // header-only frame and nothing to requeue.
            debug!(target: "channel-manager", "invalidated channel had no blocks");
        } else {
            for block in &blocks {
                self.metrics.record_l2_block_in_pending_queue(block);
            }
            self.rewind_to_block(blocks[0].id());
        }

        let dropped: Vec<ChannelId> =
            self.channel_queue[idx..].iter().map(Channel::id).collect();
        self.channel_queue.truncate(idx);
        self.tx_channels.retain(|_, chid| !dropped.contains(chid));
        self.current_channel = None;
    }

    fn tx_data(&mut self, l1_head: BlockId) -> Result<TxData, BatcherError> {
        let idx = self.get_ready_channel(l1_head)?;

        // A channel that has started being submitted is never reconfigured.
        if !self.channel_queue[idx].none_submitted() {
            return self.next_tx_data(idx);
        }

        let new_cfg = self.cfg_provider.channel_config();
        if new_cfg.use_blobs == self.default_cfg.use_blobs {
            debug!(
                target: "channel-manager",
                use_blobs = self.default_cfg.use_blobs,
                "recomputed optimal channel config: no DA type switch"
            );
            return self.next_tx_data(idx);
        }

        info!(
            target: "channel-manager",
            use_blobs_before = self.default_cfg.use_blobs,
            use_blobs_after = new_cfg.use_blobs,
            "recomputed optimal channel config: switching DA type and requeueing blocks"
        );
        self.handle_channel_invalidated(idx);
        self.default_cfg = new_cfg;

        let idx = self.get_ready_channel(l1_head)?;
        self.next_tx_data(idx)
    }

    /// Dispatches the next frame of the channel at `idx`, recording the
    /// fresh id in the tx index and advancing the L1-origin watermark.
    fn next_tx_data(&mut self, idx: usize) -> Result<TxData, BatcherError> {
        let channel = &mut self.channel_queue[idx];
        if !channel.has_tx_data() {
            trace!(target: "channel-manager", "no next tx data");
            return Err(BatcherError::Eof);
        }
        let chid = channel.id();
        let latest_l1_origin = channel.latest_l1_origin();
        let tx = channel.next_tx_data().ok_or(BatcherError::Eof)?;

        if latest_l1_origin.number > self.l1_origin_last_submitted_channel.number {
            self.l1_origin_last_submitted_channel = latest_l1_origin;
        }
        self.tx_channels.insert(tx.id, chid);
        Ok(tx)
    }

    /// Returns the index of the next channel ready to submit data, creating
    /// and filling a channel from the pending blocks if necessary. Returns
    /// [BatcherError::Eof] when there is nothing to send.
    fn get_ready_channel(&mut self, l1_head: BlockId) -> Result<usize, BatcherError> {
        let first_with_tx_data = self.channel_queue.iter().position(Channel::has_tx_data);
        debug!(
            target: "channel-manager",
            l1_head = %l1_head,
            txdata_pending = first_with_tx_data.is_some(),
            blocks_pending = self.blocks.len(),
            "requested tx data"
        );
        if let Some(idx) = first_with_tx_data {
            return Ok(idx);
        }

        // Without pending blocks no valid frames can be produced.
        if self.pending_blocks() == 0 {
            return Err(BatcherError::Eof);
        }

        self.ensure_channel_with_space(l1_head)?;
        self.process_blocks()?;

        // Register the current L1 head only after all pending blocks have
        // been processed: even if the timeout fires now, it is better to
        // have every available block included in this channel.
        self.register_l1_block(l1_head);

        self.output_frames()?;

        match self.current_channel_index() {
            Some(idx) if self.channel_queue[idx].has_tx_data() => Ok(idx),
            _ => Err(BatcherError::Eof),
        }
    }

    /// Ensures the current channel exists and has space; opens a new channel
    /// bound to the default config otherwise.
    fn ensure_channel_with_space(&mut self, l1_head: BlockId) -> Result<(), BatcherError> {
        if let Some(idx) = self.current_channel_index() {
            if !self.channel_queue[idx].is_full() {
                return Ok(());
            }
        }

        // Reuse the config from the last channel. It is reassessed at
        // submission time, but this is the best guess for now.
        let cfg = self.default_cfg;
        let co = (self.out_factory)(&cfg, &self.rollup_cfg)?;
        let channel = Channel::new(cfg, self.l1_origin_last_submitted_channel.number, co);

        info!(
            target: "channel-manager",
            id = %hex::encode(channel.id()),
            l1_head = %l1_head,
            blocks_pending = self.pending_blocks(),
            l1_origin_last_submitted_channel = %self.l1_origin_last_submitted_channel,
            batch_type = cfg.batch_type,
            compression_algo = ?cfg.compression_algo,
            target_num_frames = cfg.target_num_frames,
            max_frame_size = cfg.max_frame_size,
            use_blobs = cfg.use_blobs,
            "created channel"
        );
        self.metrics.record_channel_opened(channel.id(), self.blocks.len());

        self.current_channel = Some(channel.id());
        self.channel_queue.push(channel);
        Ok(())
    }

    /// Adds pending blocks to the current channel until the queue is
    /// exhausted or the channel is full. The block a full channel rejects is
    /// not consumed.
    fn process_blocks(&mut self) -> Result<(), BatcherError> {
        let mut blocks_added = 0usize;
        let mut latest_l2: Option<L2BlockInfo> = None;

        while self.block_cursor + blocks_added < self.blocks.len() {
            let block = self.blocks[self.block_cursor + blocks_added].clone();
            let metrics = self.metrics.clone();
            let Some(channel) = self.current_channel_mut() else {
                break;
            };
            match channel.add_block(&block) {
                Ok(l1_info) => {
                    let id = channel.id();
                    let now_full = channel.is_full();
                    blocks_added += 1;
                    latest_l2 = Some(l2_block_info_from(&block, l1_info));
                    metrics.record_l2_block_in_channel(&block);
                    debug!(
                        target: "channel-manager",
                        id = %hex::encode(id),
                        block = %block.id(),
                        "added block to channel"
                    );
                    // The block was consumed, but the channel cannot take
                    // another one.
                    if now_full {
                        break;
                    }
                }
                Err(ChannelOutError::ChannelFull(_)) => break,
                Err(err) => return Err(err.into()),
            }
        }

        self.block_cursor += blocks_added;

        let (input_bytes, ready_bytes) = self
            .current_channel_index()
            .map(|idx| {
                let ch = &self.channel_queue[idx];
                (ch.input_bytes(), ch.ready_bytes())
            })
            .unwrap_or_default();
        self.metrics.record_l2_blocks_added(
            latest_l2.as_ref(),
            blocks_added,
            self.blocks.len(),
            input_bytes,
            ready_bytes,
        );
        debug!(
            target: "channel-manager",
            blocks_added,
            blocks_pending = self.pending_blocks(),
            input_bytes,
            ready_bytes,
            "added blocks to channel"
        );
        Ok(())
    }

    /// Forwards the L1 head to the current channel's duration timeout.
    fn register_l1_block(&mut self, l1_head: BlockId) {
        let Some(channel) = self.current_channel_mut() else {
            return;
        };
        channel.check_timeout(l1_head.number);
        let (channel_full, full_reason) = (channel.is_full(), channel.full_err());
        debug!(
            target: "channel-manager",
            l1_head = %l1_head,
            channel_full,
            full_reason = ?full_reason,
            "new L1 block registered at channel builder"
        );
    }

    /// Generates frames for the current channel and, if the channel closed,
    /// records the closure and its compression ratio.
    fn output_frames(&mut self) -> Result<(), BatcherError> {
        let pending_blocks = self.pending_blocks();
        let metrics = self.metrics.clone();
        let Some(channel) = self.current_channel_mut() else {
            return Ok(());
        };
        channel.output_frames()?;
        if !channel.is_full() {
            return Ok(());
        }

        let (input_bytes, output_bytes) = (channel.input_bytes(), channel.output_bytes());
        metrics.record_channel_closed(
            channel.id(),
            pending_blocks,
            channel.total_frames(),
            input_bytes,
            output_bytes,
            channel.full_err(),
        );

        let compr_ratio =
            if input_bytes > 0 { output_bytes as f64 / input_bytes as f64 } else { 0.0 };
        info!(
            target: "channel-manager",
            id = %hex::encode(channel.id()),
            blocks_pending = pending_blocks,
            num_frames = channel.total_frames(),
            input_bytes,
            output_bytes,
            oldest_l1_origin = %channel.oldest_l1_origin(),
            latest_l1_origin = %channel.latest_l1_origin(),
            oldest_l2 = %channel.oldest_l2(),
            latest_l2 = %channel.latest_l2(),
            full_reason = ?channel.full_err(),
            compr_ratio,
            "channel closed"
        );
        Ok(())
    }

    fn prune_safe_blocks(&mut self, new_safe_head: L2BlockInfo) {
        let Some(oldest_block) = self.blocks.front() else {
            // No blocks to prune.
            return;
        };
        let oldest_number = oldest_block.info.number;
        let safe_number = new_safe_head.block_info.number;

        if safe_number + 1 == oldest_number {
            // No blocks to prune.
            return;
        }

        if safe_number + 1 < oldest_number {
            // This could happen after an L1 reorg. Restart from the new safe
            // head and prune everything.
            warn!(
                target: "channel-manager",
                oldest_block = %oldest_block.id(),
                new_safe_block = %new_safe_head.block_info.id(),
                "safe head reversed, clearing channel manager state"
            );
            self.clear(new_safe_head.l1_origin);
            return;
        }

        let num_blocks_to_dequeue = (safe_number + 1 - oldest_number) as usize;

        if num_blocks_to_dequeue > self.blocks.len() {
            // This could happen after a restart, when the remote node derived
            // the safe chain from channels a previous instance sent.
            warn!(
                target: "channel-manager",
                unsafe_block = %self.blocks[self.blocks.len() - 1].id(),
                new_safe_block = %new_safe_head.block_info.id(),
                "safe head above unsafe head, clearing channel manager state"
            );
            self.clear(new_safe_head.l1_origin);
            return;
        }

        if self.blocks[num_blocks_to_dequeue - 1].info.hash != new_safe_head.block_info.hash {
            warn!(
                target: "channel-manager",
                existing_block = %self.blocks[num_blocks_to_dequeue - 1].id(),
                new_safe_block = %new_safe_head.block_info.id(),
                "safe chain reorg, clearing channel manager state"
            );
            self.clear(new_safe_head.l1_origin);
            return;
        }

        self.blocks.drain(..num_blocks_to_dequeue);
        self.block_cursor = match self.block_cursor.checked_sub(num_blocks_to_dequeue) {
            Some(cursor) => cursor,
            None => panic!("negative block cursor"),
        };
    }

    fn prune_channels(&mut self, new_safe_head: L2BlockInfo) {
        let keep_from = self
            .channel_queue
            .iter()
            .position(|ch| ch.latest_l2().number > new_safe_head.block_info.number)
            .unwrap_or(self.channel_queue.len());
        if keep_from == 0 {
            return;
        }

        let dropped: Vec<ChannelId> =
            self.channel_queue[..keep_from].iter().map(Channel::id).collect();
        self.channel_queue.drain(..keep_from);
        self.tx_channels.retain(|_, chid| !dropped.contains(chid));
        if self.current_channel.is_some_and(|id| dropped.contains(&id)) {
            self.current_channel = None;
        }
    }

    fn check_expected_progress(&self, sync_status: &SyncStatus) -> Result<(), BatcherError> {
        for ch in &self.channel_queue {
            // A fully submitted channel past its inclusion bound implies the
            // remote node has had every frame for long enough to derive the
            // channel's blocks.
            if ch.is_fully_submitted()
                && !ch.is_timed_out()
                && sync_status.current_l1.number > ch.max_inclusion_block()
                && sync_status.safe_l2.block_info.number < ch.latest_l2().number
            {
                return Err(BatcherError::MissedExpectedProgress);
            }
        }
        Ok(())
    }

    fn pending_da_bytes(&self) -> i64 {
        let value = self.metrics.pending_da_bytes();
        if value >= i64::MAX as f64 {
            return i64::MAX;
        }
        if value <= i64::MIN as f64 {
            return i64::MIN;
        }
        value as i64
    }

    fn close(&self) -> Result<(), BatcherError> {
        if self.pending_blocks() > 0
            || self.channel_queue.iter().any(|ch| !ch.is_fully_submitted())
        {
            return Err(BatcherError::PendingAfterClose);
        }
        Ok(())
    }
}

fn l2_block_info_from(block: &L2Block, l1_info: L1BlockInfo) -> L2BlockInfo {
    L2BlockInfo {
        block_info: block.info,
        l1_origin: l1_info.id(),
        seq_num: l1_info.sequence_number,
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        errors::FullReason,
        test_utils::{
            l1_hash, l2_hash, noisy_payload, test_block, test_block_chain, TestBatcherMetrics,
            TestChannelConfigProvider,
        },
        types::BlockInfo,
    };
    use std::sync::atomic::Ordering;

    /// Closes channels by size: a single block with a large payload crosses
    /// the input target, while the long duration keeps the inclusion bound
    /// at `300 - 100 = 200`.
    fn size_cfg() -> ChannelConfig {
        ChannelConfig {
            target_num_frames: 1,
            max_frame_size: 100,
            max_channel_duration: 300,
            sub_safety_margin: 100,
            ..Default::default()
        }
    }

    /// Closes channels by duration at `l1_head >= 10`; inclusion bound 8.
    fn timeout_cfg() -> ChannelConfig {
        ChannelConfig {
            target_num_frames: 4,
            max_frame_size: 50,
            max_channel_duration: 10,
            sub_safety_margin: 2,
            ..Default::default()
        }
    }

    fn manager_with(
        cfg: ChannelConfig,
    ) -> (ChannelManager, TestChannelConfigProvider, Arc<TestBatcherMetrics>) {
        let metrics = Arc::new(TestBatcherMetrics::default());
        let provider = TestChannelConfigProvider::new(cfg);
        let manager = ChannelManager::new(
            metrics.clone(),
            Box::new(provider.clone()),
            RollupConfig::default(),
        );
        (manager, provider, metrics)
    }

    fn l1_head(number: u64) -> BlockId {
        BlockId { hash: l1_hash(number), number }
    }

    /// A block whose batch encoding alone crosses the size config's input
    /// target, so each block closes a channel.
    fn big_block(number: u64, parent_hash: B256) -> L2Block {
        let mut block = test_block(number, parent_hash, 1);
        block.transactions = vec![vec![0xC5; 400].into()];
        block
    }

    /// A block with an incompressible payload, so timed-out channels
    /// reliably span several small frames.
    fn noisy_block(number: u64, parent_hash: B256) -> L2Block {
        let mut block = test_block(number, parent_hash, 1);
        block.transactions = vec![noisy_payload(number, 100).into()];
        block
    }

    fn append_big_chain(manager: &ChannelManager, start: u64, count: u64) {
        let mut parent = l2_hash(start - 1);
        for number in start..start + count {
            let block = big_block(number, parent);
            parent = block.info.hash;
            manager.add_l2_block(block).unwrap();
        }
    }

    fn drain(manager: &ChannelManager, l1: BlockId) -> Vec<TxData> {
        let mut txs = Vec::new();
        loop {
            match manager.tx_data(l1) {
                Ok(tx) => txs.push(tx),
                Err(BatcherError::Eof) => return txs,
                Err(err) => panic!("unexpected error: {err}"),
            }
        }
    }

    fn assert_invariants(manager: &ChannelManager) {
        let state = manager.state();
        assert!(state.block_cursor <= state.blocks.len());
        for chid in state.tx_channels.values() {
            assert!(state.channel_index(*chid).is_some());
        }
        for pair in state.channel_queue.windows(2) {
            assert!(pair[0].oldest_l2().number < pair[1].oldest_l2().number);
        }
    }

    #[test]
    fn test_blocks_to_da_and_drain() {
        let (manager, _provider, metrics) = manager_with(size_cfg());
        append_big_chain(&manager, 10, 3);

        let txs = drain(&manager, l1_head(100));
        assert!(!txs.is_empty());
        assert_invariants(&manager);

        // Each oversized block closes its own channel.
        assert_eq!(metrics.channels_opened.load(Ordering::Relaxed), 3);
        assert_eq!(metrics.channels_closed.load(Ordering::Relaxed), 3);
        assert_eq!(metrics.blocks_in_channel.load(Ordering::Relaxed), 3);

        for tx in &txs {
            manager.tx_confirmed(&tx.id, l1_head(101));
        }
        assert_eq!(
            metrics.batch_txs_submitted.load(Ordering::Relaxed),
            txs.len()
        );
        assert!(matches!(manager.tx_data(l1_head(102)), Err(BatcherError::Eof)));

        let safe_head = {
            let state = manager.state();
            state.blocks[2].l2_block_info()
        };
        manager.prune_channels(safe_head);
        manager.prune_safe_blocks(safe_head);
        {
            let state = manager.state();
            assert!(state.channel_queue.is_empty());
            assert!(state.blocks.is_empty());
            assert_eq!(state.block_cursor, 0);
        }
        manager.close().unwrap();
    }

    #[test]
    fn test_reorg_rejected_and_state_unchanged() {
        let (manager, _provider, _metrics) = manager_with(size_cfg());
        manager.add_l2_block(test_block(10, l2_hash(9), 1)).unwrap();

        // Parent of #12 is #11, which does not extend the tip at #10.
        let err = manager.add_l2_block(test_block(12, l2_hash(11), 1)).unwrap_err();
        assert_eq!(err, BatcherError::Reorg);
        let state = manager.state();
        assert_eq!(state.blocks.len(), 1);
        assert_eq!(state.tip, Some(l2_hash(10)));
    }

    #[test]
    fn test_failed_tx_reemitted_under_fresh_id() {
        let (manager, _provider, _metrics) = manager_with(size_cfg());
        append_big_chain(&manager, 10, 1);

        let tx1 = manager.tx_data(l1_head(100)).unwrap();
        manager.tx_failed(&tx1.id);
        let tx2 = manager.tx_data(l1_head(100)).unwrap();

        assert_eq!(tx2.frame, tx1.frame);
        assert_ne!(tx2.id, tx1.id);
        assert_invariants(&manager);
    }

    #[test]
    fn test_da_switch_invalidates_unsubmitted_channel() {
        let (manager, provider, metrics) = manager_with(size_cfg());
        append_big_chain(&manager, 10, 6);

        // The modality flips before any frame was handed out.
        provider.set(ChannelConfig { use_blobs: true, ..size_cfg() });
        let tx = manager.tx_data(l1_head(100)).unwrap();

        let state = manager.state();
        assert!(state.default_cfg.use_blobs);
        // The first channel was invalidated and rebuilt; its replacement is
        // the only live channel and owns the returned frame.
        assert_eq!(state.channel_queue.len(), 1);
        assert_eq!(state.channel_queue[0].id(), tx.id.channel);
        assert_eq!(state.channel_queue[0].oldest_l2().number, 10);
        assert_eq!(state.block_cursor, 1);
        assert_eq!(metrics.channels_opened.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn test_channel_timeout_requeues_blocks() {
        let (manager, _provider, _metrics) = manager_with(timeout_cfg());
        let mut parent = l2_hash(9);
        for number in 10..13 {
            let block = noisy_block(number, parent);
            parent = block.info.hash;
            manager.add_l2_block(block).unwrap();
        }

        // The duration timeout closes the channel at l1 head 10; the noisy
        // payloads span several 27-byte frames.
        let tx1 = manager.tx_data(l1_head(10)).unwrap();
        let tx2 = manager.tx_data(l1_head(10)).unwrap();
        assert_eq!(tx1.id.channel, tx2.id.channel);

        // Confirmation at block 9 exceeds the inclusion bound of 8: the
        // channel is timed out and its blocks requeued.
        manager.tx_confirmed(&tx1.id, l1_head(9));
        {
            let state = manager.state();
            assert!(state.channel_queue.is_empty());
            assert_eq!(state.block_cursor, 0);
            assert_eq!(state.blocks.len(), 3);
            assert!(state.tx_channels.is_empty());
        }

        // The second outcome arrives for a dropped channel and is ignored.
        manager.tx_confirmed(&tx2.id, l1_head(9));
        assert_invariants(&manager);

        // The requeued blocks are rebuilt into a fresh channel.
        let tx3 = manager.tx_data(l1_head(20)).unwrap();
        assert_ne!(tx3.id.channel, tx1.id.channel);
    }

    #[test]
    fn test_empty_channel_invalidation_skips_rewind() {
        let (manager, _provider, _metrics) = manager_with(timeout_cfg());
        let mut state = manager.state();

        // A channel opened without blocks times out into a single
        // header-only frame.
        state.ensure_channel_with_space(l1_head(0)).unwrap();
        state.register_l1_block(l1_head(10));
        state.output_frames().unwrap();
        assert_eq!(state.channel_queue[0].full_err(), Some(FullReason::DurationTimeout));
        assert!(state.channel_queue[0].has_tx_data());

        state.handle_channel_invalidated(0);
        assert!(state.channel_queue.is_empty());
        assert_eq!(state.block_cursor, 0);
    }

    #[test]
    fn test_tx_data_without_blocks_is_eof() {
        let (manager, _provider, _metrics) = manager_with(size_cfg());
        assert!(matches!(manager.tx_data(l1_head(1)), Err(BatcherError::Eof)));
    }

    #[test]
    fn test_prune_safe_blocks_dequeues_and_rewinds_cursor() {
        let (manager, _provider, _metrics) = manager_with(size_cfg());
        append_big_chain(&manager, 10, 3);
        let _tx = manager.tx_data(l1_head(100)).unwrap();
        assert_eq!(manager.state().block_cursor, 1);

        let safe_head = manager.state().blocks[0].l2_block_info();
        manager.prune_safe_blocks(safe_head);
        let state = manager.state();
        assert_eq!(state.blocks.len(), 2);
        assert_eq!(state.block_cursor, 0);
        assert_eq!(state.blocks[0].info.number, 11);
    }

    #[test]
    fn test_prune_safe_blocks_noop_when_behind() {
        let (manager, _provider, _metrics) = manager_with(size_cfg());
        append_big_chain(&manager, 10, 2);
        // Safe head #9: the oldest pending block is exactly its successor.
        let safe_head = test_block(9, l2_hash(8), 1).l2_block_info();
        manager.prune_safe_blocks(safe_head);
        assert_eq!(manager.state().blocks.len(), 2);
    }

    #[test]
    fn test_prune_safe_blocks_reversed_head_clears() {
        let (manager, _provider, _metrics) = manager_with(size_cfg());
        append_big_chain(&manager, 10, 2);
        let safe_head = test_block(5, l2_hash(4), 1).l2_block_info();
        manager.prune_safe_blocks(safe_head);
        let state = manager.state();
        assert!(state.blocks.is_empty());
        assert_eq!(state.l1_origin_last_submitted_channel, safe_head.l1_origin);
        assert_eq!(state.tip, None);
    }

    #[test]
    fn test_prune_safe_blocks_ahead_of_view_clears() {
        let (manager, _provider, _metrics) = manager_with(size_cfg());
        append_big_chain(&manager, 10, 2);
        let safe_head = test_block(20, l2_hash(19), 1).l2_block_info();
        manager.prune_safe_blocks(safe_head);
        assert!(manager.state().blocks.is_empty());
    }

    #[test]
    fn test_prune_safe_blocks_reorged_hash_clears() {
        let (manager, _provider, _metrics) = manager_with(size_cfg());
        append_big_chain(&manager, 10, 3);

        // Right number, wrong hash: the remote safe chain diverged.
        let mut safe_head = test_block(11, l2_hash(10), 1).l2_block_info();
        safe_head.block_info.hash = l1_hash(99);
        manager.prune_safe_blocks(safe_head);

        let state = manager.state();
        assert!(state.blocks.is_empty());
        assert_eq!(state.tip, None);
        drop(state);

        // After the clear, any parent hash is accepted again.
        manager.add_l2_block(test_block(42, l2_hash(7), 1)).unwrap();
    }

    #[test]
    fn test_check_expected_progress() {
        let (manager, _provider, _metrics) = manager_with(size_cfg());
        append_big_chain(&manager, 10, 1);

        let txs = drain(&manager, l1_head(100));
        for tx in &txs {
            manager.tx_confirmed(&tx.id, l1_head(150));
        }

        // Inclusion bound is 200; the node had until then to ingest.
        let safe_behind = SyncStatus {
            current_l1: BlockInfo { number: 201, ..Default::default() },
            safe_l2: test_block(9, l2_hash(8), 1).l2_block_info(),
        };
        assert_eq!(
            manager.check_expected_progress(safe_behind),
            Err(BatcherError::MissedExpectedProgress)
        );

        let safe_caught_up = SyncStatus {
            current_l1: BlockInfo { number: 201, ..Default::default() },
            safe_l2: test_block(10, l2_hash(9), 1).l2_block_info(),
        };
        manager.check_expected_progress(safe_caught_up).unwrap();

        let bound_not_passed = SyncStatus {
            current_l1: BlockInfo { number: 200, ..Default::default() },
            safe_l2: test_block(9, l2_hash(8), 1).l2_block_info(),
        };
        manager.check_expected_progress(bound_not_passed).unwrap();
    }

    #[test]
    fn test_pending_da_bytes_clamps() {
        let (manager, _provider, metrics) = manager_with(size_cfg());
        metrics.set_pending_da_bytes(123.0);
        assert_eq!(manager.pending_da_bytes(), 123);
        metrics.set_pending_da_bytes(f64::MAX);
        assert_eq!(manager.pending_da_bytes(), i64::MAX);
        metrics.set_pending_da_bytes(f64::MIN);
        assert_eq!(manager.pending_da_bytes(), i64::MIN);
    }

    #[test]
    fn test_unknown_terminal_events_ignored() {
        let (manager, _provider, _metrics) = manager_with(size_cfg());
        let bogus = TxId::new([0x77; 16], 0, 1);
        manager.tx_failed(&bogus);
        manager.tx_confirmed(&bogus, l1_head(1));
        assert!(manager.state().tx_channels.is_empty());
    }

    #[test]
    fn test_unknown_confirmation_logs_warning() {
        use crate::test_utils::{CollectingLayer, TraceStorage};
        use tracing_subscriber::layer::SubscriberExt;

        let trace_store: TraceStorage = Default::default();
        let layer = CollectingLayer::new(trace_store.clone());
        let subscriber = tracing_subscriber::Registry::default().with(layer);
        let _guard = tracing::subscriber::set_default(subscriber);

        let (manager, _provider, _metrics) = manager_with(size_cfg());
        manager.tx_confirmed(&TxId::new([0x55; 16], 0, 1), l1_head(1));

        let warning_logs = trace_store.get_by_level(tracing::Level::WARN);
        assert_eq!(warning_logs.len(), 1);
        assert!(warning_logs[0].contains("unknown channel"));
    }

    #[test]
    fn test_close_reports_pending_work() {
        let (manager, _provider, _metrics) = manager_with(size_cfg());
        manager.close().unwrap();

        append_big_chain(&manager, 10, 1);
        assert_eq!(manager.close(), Err(BatcherError::PendingAfterClose));

        let txs = drain(&manager, l1_head(100));
        assert_eq!(manager.close(), Err(BatcherError::PendingAfterClose));
        for tx in &txs {
            manager.tx_confirmed(&tx.id, l1_head(101));
        }
        manager.close().unwrap();
    }

    #[test]
    fn test_clear_resets_everything() {
        let (manager, _provider, _metrics) = manager_with(size_cfg());
        append_big_chain(&manager, 10, 2);
        let _tx = manager.tx_data(l1_head(100)).unwrap();

        let watermark = BlockId { hash: l1_hash(7), number: 7 };
        manager.clear(watermark);

        let state = manager.state();
        assert!(state.blocks.is_empty());
        assert_eq!(state.block_cursor, 0);
        assert!(state.channel_queue.is_empty());
        assert!(state.tx_channels.is_empty());
        assert_eq!(state.tip, None);
        assert_eq!(state.l1_origin_last_submitted_channel, watermark);
    }

    #[test]
    fn test_block_chain_helper_is_linked() {
        let blocks = test_block_chain(10, 3, 1);
        assert_eq!(blocks[1].info.parent_hash, blocks[0].info.hash);
        assert_eq!(blocks[2].info.parent_hash, blocks[1].info.hash);
    }
}
