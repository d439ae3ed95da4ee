//! This module contains the parameters and identifying types for channels and frames.

/// [CHANNEL_ID_LENGTH] is the length of the channel ID.
pub const CHANNEL_ID_LENGTH: usize = 16;

/// [ChannelId] is an opaque identifier for a channel.
pub type ChannelId = [u8; CHANNEL_ID_LENGTH];

/// The version byte prepended to every frame-carrying DA transaction payload.
pub const DERIVATION_VERSION_0: u8 = 0;

/// The version byte prepended to a Brotli-compressed channel.
pub const CHANNEL_VERSION_BROTLI: u8 = 0x01;

/// The number of wire bytes a version-0 frame adds on top of its data:
/// `channel_id (16) ++ frame_number (2) ++ frame_data_length (4) ++ is_last (1)`.
pub const FRAME_V0_OVERHEAD: usize = 23;

/// [MAX_RLP_BYTES_PER_CHANNEL] is the maximum amount of input bytes a single
/// channel may accumulate before it must be closed.
pub const MAX_RLP_BYTES_PER_CHANNEL: u64 = 10_000_000;

/// Generates a fresh random [ChannelId].
pub fn random_channel_id() -> ChannelId {
    rand::random()
}

#[cfg(test)]
mod test {
    use super::random_channel_id;

    #[test]
    fn test_random_channel_ids_differ() {
        assert_ne!(random_channel_id(), random_channel_id());
    }
}
