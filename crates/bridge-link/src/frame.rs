//! Frame builder and parser (spec §4.3). The wire layout is normative
//! (spec §6) and is therefore hand-packed here rather than derived from a
//! Rust-side serialization crate: `[version(1) | payload_length(2,BE) |
//! command_id(2,BE) | payload(N) | crc32(4,BE)]`.

use crate::consts::{
    COMMAND_ID_MASK, COMPRESSION_FLAG, CRC_TRAILER_SIZE, FRAME_HEADER_SIZE, MAX_PAYLOAD_SIZE,
    MAX_RAW_FRAME_SIZE, PROTOCOL_VERSION,
};
use crate::crc32::crc32_parts;
use crate::error::FrameError;

/// A decoded frame. `payload` is stored inline as a fixed-size buffer
/// with an explicit length, never a heap allocation.
#[derive(Clone, Copy)]
pub struct Frame {
    pub command_id: u16,
    pub compressed: bool,
    payload: [u8; MAX_PAYLOAD_SIZE],
    payload_len: u16,
    /// CRC as computed during parsing, handed to the dedup layer so it
    /// doesn't need to recompute it (spec §4.3: "the returned Frame
    /// carries the computed CRC for use by the dedup layer").
    pub crc: u32,
}

impl Frame {
    pub fn payload(&self) -> &[u8] {
        &self.payload[..self.payload_len as usize]
    }

    pub fn payload_len(&self) -> u16 {
        self.payload_len
    }

    /// The masked command id with the compression flag bit cleared —
    /// what the router and requires-ack table key on.
    pub fn effective_command_id(&self) -> u16 {
        self.command_id & COMMAND_ID_MASK
    }

    /// Builds a frame into `out`, returning the number of bytes written
    /// (`5 + payload.len() + 4`).
    pub fn build(
        out: &mut [u8],
        command_id: u16,
        payload: &[u8],
        compressed: bool,
    ) -> Result<usize, FrameError> {
        if payload.len() > MAX_PAYLOAD_SIZE {
            return Err(FrameError::PayloadTooLarge);
        }
        let total = FRAME_HEADER_SIZE + payload.len() + CRC_TRAILER_SIZE;
        if out.len() < total {
            return Err(FrameError::BufferTooSmall);
        }

        let wire_command_id = if compressed {
            (command_id & COMMAND_ID_MASK) | COMPRESSION_FLAG
        } else {
            command_id & COMMAND_ID_MASK
        };

        out[0] = PROTOCOL_VERSION;
        out[1..3].copy_from_slice(&(payload.len() as u16).to_be_bytes());
        out[3..5].copy_from_slice(&wire_command_id.to_be_bytes());
        out[5..5 + payload.len()].copy_from_slice(payload);

        let crc = crc32_parts(&out[0..5], payload);
        out[5 + payload.len()..total].copy_from_slice(&crc.to_be_bytes());

        Ok(total)
    }

    /// Parses a decoded (already de-stuffed) byte sequence into a `Frame`.
    pub fn parse(bytes: &[u8]) -> Result<Frame, FrameError> {
        if bytes.len() > MAX_RAW_FRAME_SIZE {
            return Err(FrameError::Overflow);
        }
        if bytes.len() < FRAME_HEADER_SIZE + CRC_TRAILER_SIZE {
            return Err(FrameError::Malformed);
        }

        let version = bytes[0];
        if version != PROTOCOL_VERSION {
            return Err(FrameError::Malformed);
        }

        let payload_length = u16::from_be_bytes([bytes[1], bytes[2]]);
        let wire_command_id = u16::from_be_bytes([bytes[3], bytes[4]]);

        let expected_total = FRAME_HEADER_SIZE + payload_length as usize + CRC_TRAILER_SIZE;
        if expected_total != bytes.len() || payload_length as usize > MAX_PAYLOAD_SIZE {
            return Err(FrameError::Malformed);
        }

        let payload_bytes = &bytes[FRAME_HEADER_SIZE..FRAME_HEADER_SIZE + payload_length as usize];
        let trailer = &bytes[FRAME_HEADER_SIZE + payload_length as usize..];
        let received_crc = u32::from_be_bytes([trailer[0], trailer[1], trailer[2], trailer[3]]);

        let computed_crc = crc32_parts(&bytes[0..FRAME_HEADER_SIZE], payload_bytes);
        if computed_crc != received_crc {
            return Err(FrameError::CrcMismatch);
        }

        let mut payload = [0u8; MAX_PAYLOAD_SIZE];
        payload[..payload_bytes.len()].copy_from_slice(payload_bytes);

        Ok(Frame {
            command_id: wire_command_id & COMMAND_ID_MASK,
            compressed: wire_command_id & COMPRESSION_FLAG != 0,
            payload,
            payload_len: payload_length,
            crc: computed_crc,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_then_parse_roundtrips() {
        let mut buf = [0u8; 64];
        let payload = b"hello";
        let len = Frame::build(&mut buf, 0x0300, payload, false).unwrap();
        let frame = Frame::parse(&buf[..len]).unwrap();
        assert_eq!(frame.command_id, 0x0300);
        assert_eq!(frame.payload(), payload);
        assert!(!frame.compressed);
    }

    #[test]
    fn compression_flag_survives_roundtrip() {
        let mut buf = [0u8; 64];
        let len = Frame::build(&mut buf, 0x0300, b"x", true).unwrap();
        let frame = Frame::parse(&buf[..len]).unwrap();
        assert!(frame.compressed);
        assert_eq!(frame.effective_command_id(), 0x0300);
    }

    #[test]
    fn payload_too_large_is_rejected() {
        let mut buf = [0u8; 2048];
        let payload = [0u8; MAX_PAYLOAD_SIZE + 1];
        assert_eq!(
            Frame::build(&mut buf, 1, &payload, false),
            Err(FrameError::PayloadTooLarge)
        );
    }

    #[test]
    fn buffer_too_small_is_rejected() {
        let mut buf = [0u8; 4];
        assert_eq!(
            Frame::build(&mut buf, 1, b"hi", false),
            Err(FrameError::BufferTooSmall)
        );
    }

    #[test]
    fn single_bit_mutation_in_command_id_or_payload_causes_crc_mismatch() {
        // Bytes 0..3 (version + declared payload_length) are covered by
        // the structural Malformed checks, which run before the CRC
        // comparison (see DESIGN.md); command_id and payload bytes are
        // not, so mutating them must always surface as CRC_MISMATCH.
        let mut buf = [0u8; 64];
        let len = Frame::build(&mut buf, 0x0300, b"payload", false).unwrap();
        for i in 3..len - 4 {
            let mut mutated = buf;
            mutated[i] ^= 0x01;
            assert_eq!(
                Frame::parse(&mutated[..len]),
                Err(FrameError::CrcMismatch),
                "byte {i} flip did not trigger CRC mismatch"
            );
        }
    }

    #[test]
    fn single_bit_mutation_in_version_or_length_field_is_malformed() {
        let mut buf = [0u8; 64];
        let len = Frame::build(&mut buf, 0x0300, b"payload", false).unwrap();
        for i in 0..3 {
            let mut mutated = buf;
            mutated[i] ^= 0x01;
            assert_eq!(
                Frame::parse(&mutated[..len]),
                Err(FrameError::Malformed),
                "byte {i} flip did not surface as Malformed"
            );
        }
    }

    #[test]
    fn length_mismatch_is_malformed() {
        let mut buf = [0u8; 64];
        let len = Frame::build(&mut buf, 0x0300, b"abc", false).unwrap();
        // Claim a longer payload than actually present.
        buf[1..3].copy_from_slice(&10u16.to_be_bytes());
        assert_eq!(Frame::parse(&buf[..len]), Err(FrameError::Malformed));
    }

    #[test]
    fn wrong_version_is_malformed() {
        let mut buf = [0u8; 64];
        let len = Frame::build(&mut buf, 0x0300, b"abc", false).unwrap();
        buf[0] = 0x01;
        assert_eq!(Frame::parse(&buf[..len]), Err(FrameError::Malformed));
    }

    #[test]
    fn too_short_is_malformed() {
        assert_eq!(Frame::parse(&[0x02, 0x00]), Err(FrameError::Malformed));
    }
}
