//! The versioned binary batch frame
//!
//! ```text
//! offset size field
//! 0      4    magic "JQMB"
//! 4      1    version
//! 5      1    flags
//! 6      2    header_len      bytes of header after this preamble (24)
//! 8      4    seq_first
//! 12     2    block_count
//! 14     2    block_size
//! 16     4    ts_ms
//! 20     2    sample_rate_hz
//! 22     1    channel_count
//! 23     1    word_bits
//! 24     1    slot_bits
//! 25     1    reserved
//! 26     4    dev_id
//! 30     ..   block_count * block_size bytes of decimated blocks
//! ```
//! All integers are little-endian.

use crate::{
    errors::FrameError, BLOCK_SIZE, CHANNEL_COUNT, DECIMATED_SAMPLE_RATE_HZ, SLOT_BITS, WORD_BITS,
};

pub const MAGIC: [u8; 4] = *b"JQMB";
pub const VERSION: u8 = 2;
pub const FLAG_LITTLE_ENDIAN: u8 = 1 << 0;
pub const FLAG_STANDARD_FRAMING: u8 = 1 << 1;
// magic + version + flags
const PREAMBLE_LEN: usize = 6;
/// Value of the `header_len` field
pub const HEADER_LEN_FIELD: u16 = 24;
/// Bytes in front of the body
pub const HEADER_SIZE: usize = PREAMBLE_LEN + HEADER_LEN_FIELD as usize;

/// Size of a whole frame carrying `block_count` blocks
pub const fn frame_size(block_count: usize) -> usize {
    HEADER_SIZE + block_count * BLOCK_SIZE
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub flags: u8,
    pub seq_first: u32,
    pub block_count: u16,
    pub block_size: u16,
    pub ts_ms: u32,
    pub sample_rate_hz: u16,
    pub channel_count: u8,
    pub word_bits: u8,
    pub slot_bits: u8,
    pub dev_id: u32,
}

impl FrameHeader {
    /// A header with the fixed audio metadata of this device
    pub fn new(seq_first: u32, block_count: u16, ts_ms: u32, dev_id: u32) -> Self {
        Self {
            flags: FLAG_LITTLE_ENDIAN | FLAG_STANDARD_FRAMING,
            seq_first,
            block_count,
            block_size: BLOCK_SIZE as u16,
            ts_ms,
            sample_rate_hz: DECIMATED_SAMPLE_RATE_HZ as u16,
            channel_count: CHANNEL_COUNT as u8,
            word_bits: WORD_BITS,
            slot_bits: SLOT_BITS,
            dev_id,
        }
    }

    pub fn body_len(&self) -> usize {
        self.block_count as usize * self.block_size as usize
    }

    /// Serialize into the first [`HEADER_SIZE`] bytes of `out`
    pub fn encode(&self, out: &mut [u8; HEADER_SIZE]) {
        out[0..4].copy_from_slice(&MAGIC);
        out[4] = VERSION;
        out[5] = self.flags;
        out[6..8].copy_from_slice(&HEADER_LEN_FIELD.to_le_bytes());
        out[8..12].copy_from_slice(&self.seq_first.to_le_bytes());
        out[12..14].copy_from_slice(&self.block_count.to_le_bytes());
        out[14..16].copy_from_slice(&self.block_size.to_le_bytes());
        out[16..20].copy_from_slice(&self.ts_ms.to_le_bytes());
        out[20..22].copy_from_slice(&self.sample_rate_hz.to_le_bytes());
        out[22] = self.channel_count;
        out[23] = self.word_bits;
        out[24] = self.slot_bits;
        out[25] = 0;
        out[26..30].copy_from_slice(&self.dev_id.to_le_bytes());
    }

    /// Parse a header, returning it with the offset where the body starts
    pub fn decode(bytes: &[u8]) -> Result<(Self, usize), FrameError> {
        if bytes.len() < HEADER_SIZE {
            return Err(FrameError::Truncated {
                needed: HEADER_SIZE,
                got: bytes.len(),
            });
        }
        let u16_at = |i: usize| u16::from_le_bytes([bytes[i], bytes[i + 1]]);
        let u32_at =
            |i: usize| u32::from_le_bytes([bytes[i], bytes[i + 1], bytes[i + 2], bytes[i + 3]]);

        let magic = [bytes[0], bytes[1], bytes[2], bytes[3]];
        if magic != MAGIC {
            return Err(FrameError::BadMagic(magic));
        }
        if bytes[4] != VERSION {
            return Err(FrameError::UnsupportedVersion(bytes[4]));
        }
        let header_len = u16_at(6);
        if header_len < HEADER_LEN_FIELD {
            return Err(FrameError::HeaderTooShort(header_len));
        }
        let header = Self {
            flags: bytes[5],
            seq_first: u32_at(8),
            block_count: u16_at(12),
            block_size: u16_at(14),
            ts_ms: u32_at(16),
            sample_rate_hz: u16_at(20),
            channel_count: bytes[22],
            word_bits: bytes[23],
            slot_bits: bytes[24],
            dev_id: u32_at(26),
        };
        if header.block_size as usize != BLOCK_SIZE {
            return Err(FrameError::BlockSize(header.block_size));
        }
        // Later versions may append fields, the body always follows the declared header
        Ok((header, PREAMBLE_LEN + header_len as usize))
    }
}

/// A finished frame, header and body in one contiguous buffer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchFrame {
    header: FrameHeader,
    body_offset: usize,
    bytes: Vec<u8>,
}

impl BatchFrame {
    /// Assemble a frame from a header and a body whose length matches it
    pub(crate) fn from_parts(header: FrameHeader, body: &[u8]) -> Self {
        debug_assert_eq!(body.len(), header.body_len());
        let mut head = [0u8; HEADER_SIZE];
        header.encode(&mut head);
        let mut bytes = Vec::with_capacity(HEADER_SIZE + body.len());
        bytes.extend_from_slice(&head);
        bytes.extend_from_slice(body);
        Self {
            header,
            body_offset: HEADER_SIZE,
            bytes,
        }
    }

    /// Parse and validate a frame received off the wire
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self, FrameError> {
        let (header, body_offset) = FrameHeader::decode(&bytes)?;
        let expected = body_offset + header.body_len();
        if bytes.len() != expected {
            return Err(FrameError::LengthMismatch {
                expected,
                got: bytes.len(),
            });
        }
        Ok(Self {
            header,
            body_offset,
            bytes,
        })
    }

    pub fn header(&self) -> &FrameHeader {
        &self.header
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    pub fn body(&self) -> &[u8] {
        &self.bytes[self.body_offset..]
    }

    /// The decimated blocks carried in the body, in order
    pub fn blocks(&self) -> impl Iterator<Item = &[u8; BLOCK_SIZE]> + '_ {
        self.body()
            .chunks_exact(BLOCK_SIZE)
            .filter_map(|chunk| chunk.try_into().ok())
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sample::constant_block;

    fn sample_frame() -> BatchFrame {
        let header = FrameHeader::new(0x0102_0304, 2, 0xAABB_CCDD, 0xDEAD_BEEF);
        let mut body = Vec::new();
        body.extend_from_slice(&constant_block(1));
        body.extend_from_slice(&constant_block(-1));
        BatchFrame::from_parts(header, &body)
    }

    #[test]
    fn test_header_layout() {
        let frame = sample_frame();
        let b = frame.as_bytes();
        assert_eq!(b.len(), frame_size(2));
        assert_eq!(&b[0..4], b"JQMB");
        assert_eq!(b[4], 2);
        assert_eq!(b[5], 0b11);
        assert_eq!(&b[6..8], &[24, 0]);
        assert_eq!(&b[8..12], &[0x04, 0x03, 0x02, 0x01]);
        assert_eq!(&b[12..14], &[2, 0]);
        assert_eq!(&b[14..16], &[0x00, 0x02]);
        assert_eq!(&b[16..20], &[0xDD, 0xCC, 0xBB, 0xAA]);
        assert_eq!(&b[20..22], &1000u16.to_le_bytes());
        assert_eq!(&b[22..26], &[2, 24, 32, 0]);
        assert_eq!(&b[26..30], &[0xEF, 0xBE, 0xAD, 0xDE]);
        assert_eq!(&b[30..30 + BLOCK_SIZE], &constant_block(1));
    }

    #[test]
    fn test_reference_frame_size() {
        assert_eq!(frame_size(4), 2078);
    }

    #[test]
    fn test_parse_back() {
        let frame = sample_frame();
        let parsed = BatchFrame::from_bytes(frame.as_bytes().to_vec()).unwrap();
        assert_eq!(parsed, frame);
        let blocks: Vec<_> = parsed.blocks().collect();
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[1], &constant_block(-1));
    }

    #[test]
    fn test_rejects_bad_frames() {
        let good = sample_frame().into_bytes();

        assert_eq!(
            BatchFrame::from_bytes(good[..10].to_vec()),
            Err(FrameError::Truncated {
                needed: HEADER_SIZE,
                got: 10
            })
        );

        let mut bad = good.clone();
        bad[0] = b'X';
        assert_eq!(
            BatchFrame::from_bytes(bad),
            Err(FrameError::BadMagic(*b"XQMB"))
        );

        let mut bad = good.clone();
        bad[4] = 1;
        assert_eq!(
            BatchFrame::from_bytes(bad),
            Err(FrameError::UnsupportedVersion(1))
        );

        let mut bad = good.clone();
        bad[6] = 20;
        assert_eq!(
            BatchFrame::from_bytes(bad),
            Err(FrameError::HeaderTooShort(20))
        );

        let mut bad = good.clone();
        bad[14] = 0;
        bad[15] = 1;
        assert_eq!(
            BatchFrame::from_bytes(bad),
            Err(FrameError::BlockSize(256))
        );

        let mut bad = good;
        bad.pop();
        assert_eq!(
            BatchFrame::from_bytes(bad),
            Err(FrameError::LengthMismatch {
                expected: frame_size(2),
                got: frame_size(2) - 1
            })
        );
    }

    #[test]
    fn test_longer_header_is_skipped() {
        // A future header with 4 extra bytes before the body
        let frame = sample_frame();
        let mut bytes = frame.as_bytes()[..HEADER_SIZE].to_vec();
        bytes[6] = 28;
        bytes.extend_from_slice(&[9, 9, 9, 9]);
        bytes.extend_from_slice(frame.body());
        let parsed = BatchFrame::from_bytes(bytes).unwrap();
        assert_eq!(parsed.body(), frame.body());
        assert_eq!(parsed.header(), frame.header());
    }
}
