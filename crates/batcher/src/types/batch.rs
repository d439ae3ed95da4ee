//! This module contains the [SingleBatch] type, the RLP unit one L2 block
//! contributes to a channel.

use crate::types::L2Block;
use alloy_primitives::{Bytes, B256};
use alloy_rlp::RlpEncodable;

/// A single batch derived from one L2 block.
///
/// The epoch fields reference the L1 origin the block was derived against.
#[derive(Debug, Clone, PartialEq, Eq, Default, RlpEncodable)]
pub struct SingleBatch {
    /// The parent hash of the L2 block.
    pub parent_hash: B256,
    /// The number of the L1 origin block.
    pub epoch_num: u64,
    /// The hash of the L1 origin block.
    pub epoch_hash: B256,
    /// The L2 block timestamp.
    pub timestamp: u64,
    /// The opaque transaction payloads.
    pub transactions: Vec<Bytes>,
}

impl From<&L2Block> for SingleBatch {
    fn from(block: &L2Block) -> Self {
        Self {
            parent_hash: block.info.parent_hash,
            epoch_num: block.l1_info.number,
            epoch_hash: block.l1_info.hash,
            timestamp: block.info.timestamp,
            transactions: block.transactions.clone(),
        }
    }
}
