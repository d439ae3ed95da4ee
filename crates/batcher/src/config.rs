//! Channel and rollup configuration types.

use core::fmt::Debug;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// The compression algorithm applied to a channel's batch data.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompressionAlgo {
    /// Brotli, quality 9.
    Brotli9,
    /// Brotli, quality 10.
    #[default]
    Brotli10,
    /// Brotli, quality 11.
    Brotli11,
}

impl CompressionAlgo {
    /// The encoder quality for this algorithm.
    pub const fn quality(&self) -> i32 {
        match self {
            Self::Brotli9 => 9,
            Self::Brotli10 => 10,
            Self::Brotli11 => 11,
        }
    }
}

/// The configuration one channel is built against. Immutable per channel;
/// the manager re-queries its provider for fresh values between channels.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelConfig {
    /// Whether frames are carried as blobs rather than calldata. This is the
    /// field the manager compares when deciding to rebuild in-flight work.
    pub use_blobs: bool,
    /// The batch type, opaque to the core and forwarded to the codec.
    pub batch_type: u8,
    /// The compression algorithm the codec should apply.
    pub compression_algo: CompressionAlgo,
    /// The number of frames a channel aims to fill.
    pub target_num_frames: usize,
    /// The maximum encoded size of a single frame, overhead included.
    pub max_frame_size: usize,
    /// How many L1 blocks a channel may stay open after its opening block.
    /// Zero disables the duration timeout.
    pub max_channel_duration: u64,
    /// Safety buffer subtracted from the duration window when computing the
    /// L1 block by which all of a channel's frames must be included.
    pub sub_safety_margin: u64,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            use_blobs: false,
            batch_type: 0,
            compression_algo: CompressionAlgo::default(),
            target_num_frames: 1,
            max_frame_size: 120_000,
            max_channel_duration: 0,
            sub_safety_margin: 10,
        }
    }
}

/// The rollup configuration handed to the channel-out factory. Opaque to the
/// core itself.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RollupConfig {
    /// The chain id of the L2 chain.
    pub l2_chain_id: u64,
    /// The L2 block time in seconds.
    pub block_time: u64,
}

/// Yields the currently preferred [ChannelConfig].
///
/// Queried at channel creation and again at every dispatch that reaches the
/// reconfiguration decision point, so implementations may reassess the DA
/// modality between calls. Must be deterministic within one call.
pub trait ChannelConfigProvider: Debug + Send {
    /// Returns the preferred configuration for the next channel.
    fn channel_config(&self) -> ChannelConfig;
}

/// A fixed configuration is its own provider.
impl ChannelConfigProvider for ChannelConfig {
    fn channel_config(&self) -> ChannelConfig {
        *self
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_compression_quality() {
        assert_eq!(CompressionAlgo::Brotli9.quality(), 9);
        assert_eq!(CompressionAlgo::Brotli10.quality(), 10);
        assert_eq!(CompressionAlgo::Brotli11.quality(), 11);
    }

    #[test]
    fn test_static_provider() {
        let cfg = ChannelConfig { use_blobs: true, ..Default::default() };
        assert_eq!(cfg.channel_config(), cfg);
    }
}
