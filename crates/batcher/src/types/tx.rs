//! This module contains the transaction-facing types: [TxId] and [TxData].

use crate::{
    params::{ChannelId, DERIVATION_VERSION_0},
    types::Frame,
};
use alloy_primitives::{hex, Bytes};

/// Identifies a single submission attempt of a single frame.
///
/// The attempt counter makes every dispatch unique: a frame that failed and
/// was requeued is re-sent under a fresh id, never a reused one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TxId {
    /// The channel the frame belongs to.
    pub channel: ChannelId,
    /// The frame number within the channel.
    pub frame_number: u16,
    /// The dispatch attempt that produced this id.
    pub attempt: u32,
}

impl TxId {
    /// Instantiates a new [TxId].
    pub const fn new(channel: ChannelId, frame_number: u16, attempt: u32) -> Self {
        Self { channel, frame_number, attempt }
    }
}

impl core::fmt::Display for TxId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}:{}:{}", hex::encode(self.channel), self.frame_number, self.attempt)
    }
}

/// The payload of one DA transaction: a frame plus the id under which it was
/// dispatched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxData {
    /// The id assigned to this submission attempt.
    pub id: TxId,
    /// The frame carried by the transaction.
    pub frame: Frame,
}

impl TxData {
    /// The bytes to post to the DA layer: the derivation version byte
    /// followed by the encoded frame.
    pub fn txn_bytes(&self) -> Bytes {
        let encoded = self.frame.encode();
        let mut out = Vec::with_capacity(1 + encoded.len());
        out.push(DERIVATION_VERSION_0);
        out.extend_from_slice(&encoded);
        out.into()
    }
}
