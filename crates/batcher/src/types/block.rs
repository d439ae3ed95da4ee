//! This module contains the various block types.

use alloy_primitives::{Bytes, B256};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Block header info.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, Eq, PartialEq, Default)]
pub struct BlockInfo {
    /// The block hash
    pub hash: B256,
    /// The block number
    pub number: u64,
    /// The parent block hash
    pub parent_hash: B256,
    /// The block timestamp
    pub timestamp: u64,
}

impl BlockInfo {
    /// Instantiates a new [BlockInfo].
    pub const fn new(hash: B256, number: u64, parent_hash: B256, timestamp: u64) -> Self {
        Self { hash, number, parent_hash, timestamp }
    }

    /// Returns the block ID.
    pub const fn id(&self) -> BlockId {
        BlockId { hash: self.hash, number: self.number }
    }
}

impl core::fmt::Display for BlockInfo {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "BlockInfo {{ hash: {}, number: {}, parent_hash: {}, timestamp: {} }}",
            self.hash, self.number, self.parent_hash, self.timestamp
        )
    }
}

/// A block ID identifies a block by its hash and number.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, Eq, PartialEq, Default)]
pub struct BlockId {
    /// The block hash
    pub hash: B256,
    /// The block number
    pub number: u64,
}

impl core::fmt::Display for BlockId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{{ hash: {}, number: {} }}", self.hash, self.number)
    }
}

/// The L1 origin info derivable from an L2 block.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, Eq, PartialEq, Default)]
pub struct L1BlockInfo {
    /// The hash of the L1 block this L2 block was derived against
    pub hash: B256,
    /// The number of the L1 origin block
    pub number: u64,
    /// The distance of the L2 block to the first block of its epoch
    pub sequence_number: u64,
}

impl L1BlockInfo {
    /// Returns the origin's block ID.
    pub const fn id(&self) -> BlockId {
        BlockId { hash: self.hash, number: self.number }
    }
}

/// L2 block header info, with its L1 origin attached.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, Eq, PartialEq, Default)]
pub struct L2BlockInfo {
    /// The base [BlockInfo]
    pub block_info: BlockInfo,
    /// The L1 origin [BlockId]
    pub l1_origin: BlockId,
    /// The sequence number of the L2 block within its epoch
    pub seq_num: u64,
}

impl L2BlockInfo {
    /// Instantiates a new [L2BlockInfo].
    pub const fn new(block_info: BlockInfo, l1_origin: BlockId, seq_num: u64) -> Self {
        Self { block_info, l1_origin, seq_num }
    }
}

/// An L2 block queued for batch submission.
///
/// The transaction payloads are opaque to the core; they only flow into the
/// channel codec.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Eq, PartialEq, Default)]
pub struct L2Block {
    /// The block header info
    pub info: BlockInfo,
    /// The L1 origin info derived from the block
    pub l1_info: L1BlockInfo,
    /// The opaque transaction payloads carried by the block
    pub transactions: Vec<Bytes>,
}

impl L2Block {
    /// Returns the block ID.
    pub const fn id(&self) -> BlockId {
        self.info.id()
    }

    /// Returns the [L2BlockInfo] for this block.
    pub const fn l2_block_info(&self) -> L2BlockInfo {
        L2BlockInfo {
            block_info: self.info,
            l1_origin: self.l1_info.id(),
            seq_num: self.l1_info.sequence_number,
        }
    }

    /// A rough estimate of the bytes this block will occupy on the DA layer,
    /// before compression.
    pub fn da_size(&self) -> u64 {
        self.transactions.iter().map(|tx| tx.len() as u64).sum()
    }
}

/// The sync status of the remote rollup node, trimmed to the fields the
/// batcher core consumes.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, Eq, PartialEq, Default)]
pub struct SyncStatus {
    /// The L1 block the remote node has derived up to.
    pub current_l1: BlockInfo,
    /// The safe L2 block ref.
    pub safe_l2: L2BlockInfo,
}
