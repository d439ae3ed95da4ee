//! The channel-out codec contract and its default compressor-backed
//! implementation.

use crate::{
    config::{ChannelConfig, RollupConfig},
    errors::{ChannelOutError, FullReason},
    params::{
        random_channel_id, ChannelId, CHANNEL_VERSION_BROTLI, FRAME_V0_OVERHEAD,
        MAX_RLP_BYTES_PER_CHANNEL,
    },
    types::{Frame, L1BlockInfo, L2Block, SingleBatch},
};
use brotli::enc::BrotliEncoderParams;
use core::fmt::Debug;
use std::collections::VecDeque;
use tracing::trace;

/// A channel-out codec: compresses a sequence of L2 blocks into a byte
/// stream and splits that stream into size-bounded [Frame]s.
///
/// The only error callers branch on is [ChannelOutError::ChannelFull],
/// signaling that the codec reached one of its budgets and no further blocks
/// may be added.
pub trait ChannelOut: Debug + Send {
    /// The id of the channel being built.
    fn id(&self) -> ChannelId;

    /// Adds a block to the channel, returning its derived [L1BlockInfo].
    fn add_block(&mut self, block: &L2Block) -> Result<L1BlockInfo, ChannelOutError>;

    /// Closes the codec: no further input is accepted and the compressed
    /// stream is finalized.
    fn close(&mut self) -> Result<(), ChannelOutError>;

    /// Materializes frames from the compressed stream.
    fn output_frames(&mut self) -> Result<(), ChannelOutError>;

    /// Pops the next materialized frame, oldest first.
    fn next_frame(&mut self) -> Option<Frame>;

    /// Whether any materialized frames are waiting to be popped.
    fn has_frames(&self) -> bool;

    /// The full reason latched by the codec, if any.
    fn full_err(&self) -> Option<FullReason>;

    /// The number of frames materialized so far.
    fn total_frames(&self) -> u16;

    /// The number of uncompressed input bytes accepted.
    fn input_bytes(&self) -> usize;

    /// The number of compressed bytes already packed into frames.
    fn output_bytes(&self) -> usize;

    /// The number of compressed bytes not yet packed into frames.
    fn ready_bytes(&self) -> usize;
}

/// Builds a fresh [ChannelOut] for a new channel. Replaceable for testing.
pub type ChannelOutFactory =
    Box<dyn Fn(&ChannelConfig, &RollupConfig) -> Result<Box<dyn ChannelOut>, ChannelOutError> + Send>;

/// The default [ChannelOutFactory], producing [CompressorChannelOut]s.
pub fn default_channel_out_factory() -> ChannelOutFactory {
    Box::new(|cfg, _rollup_cfg| {
        Ok(Box::new(CompressorChannelOut::new(random_channel_id(), cfg)?) as Box<dyn ChannelOut>)
    })
}

/// The assumed compression ratio used to derive the input-byte budget from
/// the compressed-output target.
const APPROX_COMPR_RATIO: f64 = 0.4;

/// A [ChannelOut] that RLP-encodes each block as a [SingleBatch], compresses
/// the accumulated input with Brotli on close, and splits the compressed
/// stream into frames.
///
/// Fullness is signaled from the input side: once the accumulated input
/// crosses the budget implied by `target_num_frames * max_frame_size` and the
/// assumed compression ratio, the next [add_block](ChannelOut::add_block)
/// fails with [ChannelOutError::ChannelFull].
#[derive(Debug)]
pub struct CompressorChannelOut {
    /// The channel id.
    id: ChannelId,
    /// Encoder quality, from the configured compression algorithm.
    quality: i32,
    /// Maximum data bytes per frame.
    max_frame_data: usize,
    /// Input bytes after which the channel reports full.
    input_target: usize,
    /// Accumulated RLP input.
    input: Vec<u8>,
    /// The finalized compressed stream, produced at close.
    ready: Vec<u8>,
    /// How many bytes of `ready` have been packed into frames.
    ready_offset: usize,
    /// Materialized frames awaiting `next_frame`.
    frames: VecDeque<Frame>,
    /// The number of the next frame to materialize.
    next_frame_number: u16,
    /// Frames materialized over the codec's lifetime.
    total_frames: u16,
    closed: bool,
    /// Whether the closing `is_last` frame has been materialized.
    emitted_last: bool,
    full: Option<FullReason>,
}

impl CompressorChannelOut {
    /// Creates a new [CompressorChannelOut] for the given channel id and
    /// configuration.
    pub fn new(id: ChannelId, cfg: &ChannelConfig) -> Result<Self, ChannelOutError> {
        if cfg.max_frame_size <= FRAME_V0_OVERHEAD {
            return Err(ChannelOutError::InvalidConfig(
                "max_frame_size must exceed the frame overhead",
            ));
        }
        if cfg.target_num_frames == 0 {
            return Err(ChannelOutError::InvalidConfig("target_num_frames must be non-zero"));
        }
        let target_output = cfg.target_num_frames * cfg.max_frame_size;
        Ok(Self {
            id,
            quality: cfg.compression_algo.quality(),
            max_frame_data: cfg.max_frame_size - FRAME_V0_OVERHEAD,
            input_target: (target_output as f64 / APPROX_COMPR_RATIO) as usize,
            input: Vec::new(),
            ready: Vec::new(),
            ready_offset: 0,
            frames: VecDeque::new(),
            next_frame_number: 0,
            total_frames: 0,
            closed: false,
            emitted_last: false,
            full: None,
        })
    }

    fn set_full(&mut self, reason: FullReason) -> ChannelOutError {
        self.full = Some(reason);
        ChannelOutError::ChannelFull(reason)
    }
}

impl ChannelOut for CompressorChannelOut {
    fn id(&self) -> ChannelId {
        self.id
    }

    fn add_block(&mut self, block: &L2Block) -> Result<L1BlockInfo, ChannelOutError> {
        if let Some(reason) = self.full {
            return Err(ChannelOutError::ChannelFull(reason));
        }
        if self.closed {
            return Err(ChannelOutError::Closed);
        }

        let encoded = alloy_rlp::encode(SingleBatch::from(block));
        if (self.input.len() + encoded.len()) as u64 > MAX_RLP_BYTES_PER_CHANNEL {
            return Err(self.set_full(FullReason::MaxRlpBytesReached));
        }
        // Reject input that could not be framed even uncompressed.
        if (self.input.len() + encoded.len()) / self.max_frame_data + 2 > u16::MAX as usize {
            return Err(self.set_full(FullReason::MaxFrames));
        }

        self.input.extend_from_slice(&encoded);
        if self.input.len() >= self.input_target {
            // The crossing block is kept; subsequent blocks are rejected.
            self.full = Some(FullReason::InputTargetReached);
        }
        Ok(block.l1_info)
    }

    fn close(&mut self) -> Result<(), ChannelOutError> {
        if self.closed {
            return Ok(());
        }

        let mut compressed = vec![CHANNEL_VERSION_BROTLI];
        if !self.input.is_empty() {
            let params = BrotliEncoderParams { quality: self.quality, ..Default::default() };
            let mut reader: &[u8] = &self.input;
            brotli::BrotliCompress(&mut reader, &mut compressed, &params)
                .map_err(|e| ChannelOutError::Compression(e.to_string()))?;
        }
        trace!(
            target: "channel-out",
            input_bytes = self.input.len(),
            compressed_bytes = compressed.len(),
            "finalized channel stream"
        );
        self.ready = compressed;
        // `closed` must only be latched once `ready` holds the finalized
        // stream; a failed compression leaves the codec open for retry.
        self.closed = true;
        Ok(())
    }

    fn output_frames(&mut self) -> Result<(), ChannelOutError> {
        // This codec compresses at close; there is nothing to frame before.
        if !self.closed {
            return Ok(());
        }
        while !self.emitted_last {
            let remaining = self.ready.len() - self.ready_offset;
            let take = remaining.min(self.max_frame_data);
            let is_last = remaining <= self.max_frame_data;
            let data = self.ready[self.ready_offset..self.ready_offset + take].to_vec();
            self.ready_offset += take;

            self.frames.push_back(Frame {
                id: self.id,
                number: self.next_frame_number,
                data,
                is_last,
            });
            self.total_frames += 1;
            if is_last {
                self.emitted_last = true;
            } else {
                self.next_frame_number = self
                    .next_frame_number
                    .checked_add(1)
                    .ok_or_else(|| self.set_full(FullReason::MaxFrames))?;
            }
        }
        Ok(())
    }

    fn next_frame(&mut self) -> Option<Frame> {
        self.frames.pop_front()
    }

    fn has_frames(&self) -> bool {
        !self.frames.is_empty()
    }

    fn full_err(&self) -> Option<FullReason> {
        self.full
    }

    fn total_frames(&self) -> u16 {
        self.total_frames
    }

    fn input_bytes(&self) -> usize {
        self.input.len()
    }

    fn output_bytes(&self) -> usize {
        self.ready_offset
    }

    fn ready_bytes(&self) -> usize {
        self.ready.len() - self.ready_offset
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::test_utils::test_block;

    fn test_cfg() -> ChannelConfig {
        ChannelConfig {
            target_num_frames: 1,
            max_frame_size: 100,
            ..Default::default()
        }
    }

    fn payload_block(number: u64, payload_len: usize) -> L2Block {
        let mut block = test_block(number, Default::default(), 1);
        block.transactions = vec![vec![0xC5; payload_len].into()];
        block
    }

    #[test]
    fn test_add_block_accounts_input() {
        let mut co = CompressorChannelOut::new([0x01; 16], &test_cfg()).unwrap();
        assert_eq!(co.input_bytes(), 0);
        co.add_block(&payload_block(1, 16)).unwrap();
        assert!(co.input_bytes() > 16);
        assert_eq!(co.full_err(), None);
    }

    #[test]
    fn test_input_target_latches_full() {
        let mut co = CompressorChannelOut::new([0x01; 16], &test_cfg()).unwrap();
        // One oversized block crosses the input target and is kept.
        co.add_block(&payload_block(1, 400)).unwrap();
        assert_eq!(co.full_err(), Some(FullReason::InputTargetReached));
        // The next block is rejected and nothing about it is recorded.
        let input_before = co.input_bytes();
        let err = co.add_block(&payload_block(2, 8)).unwrap_err();
        assert_eq!(err, ChannelOutError::ChannelFull(FullReason::InputTargetReached));
        assert_eq!(co.input_bytes(), input_before);
    }

    #[test]
    fn test_close_then_frames() {
        let mut co = CompressorChannelOut::new([0x02; 16], &test_cfg()).unwrap();
        co.add_block(&payload_block(1, 400)).unwrap();
        co.close().unwrap();
        co.output_frames().unwrap();

        assert!(co.has_frames());
        let mut frames = Vec::new();
        while let Some(frame) = co.next_frame() {
            frames.push(frame);
        }
        assert_eq!(frames.len() as u16, co.total_frames());
        for (i, frame) in frames.iter().enumerate() {
            assert_eq!(frame.number as usize, i);
            assert!(frame.data.len() <= co.max_frame_data);
            assert_eq!(frame.is_last, i == frames.len() - 1);
        }
        // The framed stream carries the channel version byte up front.
        assert_eq!(frames[0].data[0], CHANNEL_VERSION_BROTLI);
        assert_eq!(co.ready_bytes(), 0);
        assert_eq!(
            co.output_bytes(),
            frames.iter().map(|f| f.data.len()).sum::<usize>()
        );
    }

    #[test]
    fn test_empty_close_emits_single_last_frame() {
        let mut co = CompressorChannelOut::new([0x03; 16], &test_cfg()).unwrap();
        co.close().unwrap();
        co.output_frames().unwrap();
        let frame = co.next_frame().unwrap();
        assert!(frame.is_last);
        assert_eq!(frame.number, 0);
        assert_eq!(frame.data, vec![CHANNEL_VERSION_BROTLI]);
        assert!(co.next_frame().is_none());
    }

    #[test]
    fn test_add_after_close() {
        let mut co = CompressorChannelOut::new([0x04; 16], &test_cfg()).unwrap();
        co.close().unwrap();
        assert_eq!(co.add_block(&payload_block(1, 8)).unwrap_err(), ChannelOutError::Closed);
    }

    #[test]
    fn test_output_frames_idempotent() {
        let mut co = CompressorChannelOut::new([0x05; 16], &test_cfg()).unwrap();
        co.add_block(&payload_block(1, 64)).unwrap();
        co.close().unwrap();
        co.output_frames().unwrap();
        let total = co.total_frames();
        co.output_frames().unwrap();
        assert_eq!(co.total_frames(), total);
    }

    #[test]
    fn test_invalid_config() {
        let cfg = ChannelConfig { max_frame_size: 10, ..Default::default() };
        assert!(matches!(
            CompressorChannelOut::new([0u8; 16], &cfg),
            Err(ChannelOutError::InvalidConfig(_))
        ));
    }
}
