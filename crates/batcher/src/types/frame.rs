//! This module contains the [Frame] type emitted by the channel codec.

use crate::params::{ChannelId, FRAME_V0_OVERHEAD};

/// A channel frame is a segment of a channel's compressed data.
///
/// *Encoding*
/// frame = `channel_id ++ frame_number ++ frame_data_length ++ frame_data ++ is_last`
/// * channel_id        = bytes16
/// * frame_number      = uint16
/// * frame_data_length = uint32
/// * frame_data        = bytes
/// * is_last           = bool
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Frame {
    /// The identifier of the channel this frame belongs to.
    pub id: ChannelId,
    /// The number of the frame within its channel.
    pub number: u16,
    /// The data within the frame.
    pub data: Vec<u8>,
    /// Whether or not the frame is the last in the channel.
    pub is_last: bool,
}

impl Frame {
    /// Encode the frame into a byte vector.
    pub fn encode(&self) -> Vec<u8> {
        let mut encoded = Vec::with_capacity(self.size());
        encoded.extend_from_slice(&self.id);
        encoded.extend_from_slice(&self.number.to_be_bytes());
        encoded.extend_from_slice(&(self.data.len() as u32).to_be_bytes());
        encoded.extend_from_slice(&self.data);
        encoded.push(self.is_last as u8);
        encoded
    }

    /// The encoded size of the frame, data plus wire overhead.
    pub fn size(&self) -> usize {
        self.data.len() + FRAME_V0_OVERHEAD
    }
}

#[cfg(test)]
mod test {
    use super::Frame;
    use crate::params::FRAME_V0_OVERHEAD;

    #[test]
    fn test_encode_frame_roundtrip_layout() {
        let frame = Frame {
            id: [0xFF; 16],
            number: 0xABCD,
            data: b"1234".to_vec(),
            is_last: true,
        };

        let encoded = frame.encode();
        assert_eq!(encoded.len(), frame.size());
        assert_eq!(&encoded[..16], &[0xFF; 16]);
        assert_eq!(&encoded[16..18], &[0xAB, 0xCD]);
        assert_eq!(&encoded[18..22], &4u32.to_be_bytes());
        assert_eq!(&encoded[22..26], b"1234");
        assert_eq!(encoded[26], 1);
    }

    #[test]
    fn test_empty_frame_size() {
        let frame = Frame { id: [0u8; 16], number: 0, data: Vec::new(), is_last: true };
        assert_eq!(frame.size(), FRAME_V0_OVERHEAD);
        assert_eq!(frame.encode().len(), FRAME_V0_OVERHEAD);
    }
}
