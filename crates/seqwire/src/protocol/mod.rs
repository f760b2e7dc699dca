// src/protocol/mod.rs
//! Wire format for reliable datagram frames.
//!
//! Every frame carries a 5-byte header: one byte packing the datagram type
//! (upper nibble) and protocol version (lower nibble), then the sequence
//! number in network byte order. ACK frames are header-only; USER frames
//! carry the application payload immediately after the header.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use log::warn;

/// Current protocol version, written into the header's lower nibble.
pub const PROTOCOL_VERSION: u8 = 0;

/// Encoded size of the frame header in bytes.
pub const HEADER_SIZE: usize = 5;

/// Datagram types carried in the header's upper nibble.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum DgramKind {
    /// Application payload; consumes a sequence number and expects an ack.
    User = 0,
    /// Acknowledgment of a USER frame; echoes the acknowledged sequence.
    Ack = 1,
}

impl DgramKind {
    fn from_nibble(value: u8) -> Option<Self> {
        match value {
            0 => Some(DgramKind::User),
            1 => Some(DgramKind::Ack),
            _ => None,
        }
    }
}

/// Decoded frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub kind: DgramKind,
    pub version: u8,
    pub sequence: u32,
}

impl FrameHeader {
    pub fn new(kind: DgramKind, sequence: u32) -> Self {
        Self {
            kind,
            version: PROTOCOL_VERSION,
            sequence,
        }
    }

    /// Encodes the header into `writer`.
    pub fn encode(&self, writer: &mut BytesMut) {
        writer.put_u8(((self.kind as u8 & 0x0F) << 4) | (self.version & 0x0F));
        writer.put_u32(self.sequence);
    }

    /// Decodes a header from `reader`.
    ///
    /// Frames too short for a header and frames with an unrecognized type
    /// nibble are dropped: a warning is logged and `None` returned. Version
    /// bits are preserved but not validated.
    pub fn decode(reader: &mut Bytes) -> Option<Self> {
        if reader.remaining() < HEADER_SIZE {
            warn!(
                "frame too short for header: got {} bytes, need {}",
                reader.remaining(),
                HEADER_SIZE
            );
            return None;
        }
        let packed = reader.get_u8();
        let version = packed & 0x0F;
        let Some(kind) = DgramKind::from_nibble(packed >> 4) else {
            warn!("dropping frame with unknown datagram type {}", packed >> 4);
            return None;
        };
        let sequence = reader.get_u32();
        Some(Self {
            kind,
            version,
            sequence,
        })
    }
}

/// In-memory descriptor carried between the façade and the engine for one
/// outbound or inbound frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DgramInfo {
    pub kind: DgramKind,
    pub sequence: u32,
    /// Set on frames replayed from the resend queue.
    pub resend: bool,
}

impl DgramInfo {
    pub fn new(kind: DgramKind, sequence: u32) -> Self {
        Self {
            kind,
            sequence,
            resend: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_user_header() {
        let mut writer = BytesMut::new();
        FrameHeader::new(DgramKind::User, 0x0102_0304).encode(&mut writer);

        // Type 0, version 0, then the sequence big-endian.
        let expected = Bytes::from_static(&[0x00, 0x01, 0x02, 0x03, 0x04]);
        assert_eq!(writer.freeze(), expected);
    }

    #[test]
    fn encode_ack_header() {
        let mut writer = BytesMut::new();
        FrameHeader::new(DgramKind::Ack, 7).encode(&mut writer);

        // Type nibble 1 in the upper half of byte 0.
        let expected = Bytes::from_static(&[0x10, 0x00, 0x00, 0x00, 0x07]);
        assert_eq!(writer.freeze(), expected);
    }

    #[test]
    fn decode_round_trips() {
        for (kind, sequence) in [
            (DgramKind::User, 0u32),
            (DgramKind::Ack, 1),
            (DgramKind::User, u32::MAX),
        ] {
            let mut writer = BytesMut::new();
            FrameHeader::new(kind, sequence).encode(&mut writer);

            let mut reader = writer.freeze();
            let header = FrameHeader::decode(&mut reader).unwrap();
            assert_eq!(header.kind, kind);
            assert_eq!(header.sequence, sequence);
            assert_eq!(header.version, PROTOCOL_VERSION);
            assert!(reader.is_empty());
        }
    }

    #[test]
    fn decode_leaves_payload_in_reader() {
        let mut writer = BytesMut::new();
        FrameHeader::new(DgramKind::User, 9).encode(&mut writer);
        writer.put_slice(b"1234");

        let mut reader = writer.freeze();
        let header = FrameHeader::decode(&mut reader).unwrap();
        assert_eq!(header.sequence, 9);
        assert_eq!(&reader[..], b"1234");
    }

    #[test]
    fn decode_rejects_short_frame() {
        let mut reader = Bytes::from_static(&[0x00, 0x00, 0x01]);
        assert_eq!(FrameHeader::decode(&mut reader), None);
    }

    #[test]
    fn decode_rejects_unknown_type() {
        // Type nibble 7 is not a known datagram type.
        let mut reader = Bytes::from_static(&[0x70, 0x00, 0x00, 0x00, 0x01]);
        assert_eq!(FrameHeader::decode(&mut reader), None);
    }

    #[test]
    fn decode_preserves_version_bits() {
        // Future version 3, known type: accepted, version carried through.
        let mut reader = Bytes::from_static(&[0x03, 0x00, 0x00, 0x00, 0x02]);
        let header = FrameHeader::decode(&mut reader).unwrap();
        assert_eq!(header.kind, DgramKind::User);
        assert_eq!(header.version, 3);
        assert_eq!(header.sequence, 2);
    }
}
