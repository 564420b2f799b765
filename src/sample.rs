//! 24-bit samples in 32-bit little-endian slots
//!
//! The converter shifts out signed 24-bit words right-justified in 32-bit slots, two slots per
//! stereo frame:
//! ```text
//! [L0 R0 L1 R1 ... L63 R63]   each slot = [b0 b1 b2 0x00]
//! ```

use crate::{BLOCK_SIZE, CHANNEL_COUNT, FRAMES_PER_BLOCK, SLOT_BYTES};

pub const SAMPLE_MIN: i32 = -(1 << 23);
pub const SAMPLE_MAX: i32 = (1 << 23) - 1;
const WORD_MASK: u32 = 0x00FF_FFFF;

/// Sign-extend the low 24 bits of a slot. The high byte is ignored.
#[inline(always)]
pub fn sign_extend(slot: u32) -> i32 {
    ((slot << 8) as i32) >> 8
}

/// Clamp to the 24-bit range and pack right-justified with the high byte zero
#[inline(always)]
pub fn pack(sample: i32) -> u32 {
    (sample.clamp(SAMPLE_MIN, SAMPLE_MAX) as u32) & WORD_MASK
}

#[inline(always)]
fn offset(frame: usize, channel: usize) -> usize {
    (frame * CHANNEL_COUNT + channel) * SLOT_BYTES
}

/// Read one sample out of a block
#[inline(always)]
pub fn read_sample(block: &[u8; BLOCK_SIZE], frame: usize, channel: usize) -> i32 {
    let i = offset(frame, channel);
    sign_extend(u32::from_le_bytes([
        block[i],
        block[i + 1],
        block[i + 2],
        block[i + 3],
    ]))
}

/// Write one (clamped) sample into a block
#[inline(always)]
pub fn write_sample(block: &mut [u8; BLOCK_SIZE], frame: usize, channel: usize, sample: i32) {
    let i = offset(frame, channel);
    block[i..i + SLOT_BYTES].copy_from_slice(&pack(sample).to_le_bytes());
}

/// A block where every sample of every channel is `sample`
pub fn constant_block(sample: i32) -> [u8; BLOCK_SIZE] {
    let mut block = [0u8; BLOCK_SIZE];
    for slot in block.chunks_exact_mut(SLOT_BYTES) {
        slot.copy_from_slice(&pack(sample).to_le_bytes());
    }
    block
}

/// Unpack a whole block into `[frame][channel]` samples, as a receiver would
pub fn unpack_block(block: &[u8; BLOCK_SIZE]) -> [[i32; CHANNEL_COUNT]; FRAMES_PER_BLOCK] {
    let mut out = [[0i32; CHANNEL_COUNT]; FRAMES_PER_BLOCK];
    for (frame, samples) in out.iter_mut().enumerate() {
        for (channel, s) in samples.iter_mut().enumerate() {
            *s = read_sample(block, frame, channel);
        }
    }
    out
}

/// Normalize to [-1, 1) of the converter's full scale
pub fn to_full_scale(sample: i32) -> f32 {
    sample as f32 / (1 << 23) as f32
}

/// Inverse of [`to_full_scale`], saturating outside [-1, 1)
pub fn from_full_scale(x: f32) -> i32 {
    let v = (x * (1 << 23) as f32).round();
    // `as` saturates for out of range floats
    (v as i32).clamp(SAMPLE_MIN, SAMPLE_MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::prelude::*;

    #[test]
    fn test_sign_round_trip() {
        // Every 24-bit pattern, with garbage in the high byte
        for pattern in 0u32..=0x00FF_FFFF {
            let slot = pattern | (0xA5 << 24);
            assert_eq!(pack(sign_extend(slot)), pattern);
        }
    }

    #[test]
    fn test_sign_extend_edges() {
        assert_eq!(sign_extend(0x007F_FFFF), SAMPLE_MAX);
        assert_eq!(sign_extend(0x0080_0000), SAMPLE_MIN);
        assert_eq!(sign_extend(0x00FF_FFFF), -1);
        assert_eq!(sign_extend(0xFF00_0000), 0);
    }

    #[test]
    fn test_pack_clamps() {
        assert_eq!(pack(i32::MAX), 0x007F_FFFF);
        assert_eq!(pack(i32::MIN), 0x0080_0000);
        assert_eq!(pack(-1), 0x00FF_FFFF);
    }

    #[test]
    fn test_read_write_sample() {
        let mut rng = StdRng::seed_from_u64(0x5EED);
        let mut block = [0u8; BLOCK_SIZE];
        let mut expected = [[0i32; CHANNEL_COUNT]; FRAMES_PER_BLOCK];
        for frame in 0..FRAMES_PER_BLOCK {
            for channel in 0..CHANNEL_COUNT {
                let v = rng.gen_range(SAMPLE_MIN..=SAMPLE_MAX);
                write_sample(&mut block, frame, channel, v);
                expected[frame][channel] = v;
            }
        }
        assert_eq!(unpack_block(&block), expected);
        // High bytes stay zero
        assert!(block.chunks_exact(SLOT_BYTES).all(|s| s[3] == 0));
    }

    #[test]
    fn test_full_scale() {
        assert_eq!(to_full_scale(SAMPLE_MIN), -1.0);
        assert_eq!(to_full_scale(0), 0.0);
        assert_eq!(from_full_scale(2.0), SAMPLE_MAX);
        assert_eq!(from_full_scale(-1.0), SAMPLE_MIN);
        assert_eq!(from_full_scale(0.5), 1 << 22);
    }
}
