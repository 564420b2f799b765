//! 8:1 block averaging
//!
//! Every sample of the output is the mean of the same (frame, channel) sample across eight
//! consecutive raw blocks. The mean truncates toward zero, matching integer division on the
//! receiving side, and is clamped back into the 24-bit range.

use crate::{
    sample::{pack, sign_extend, SAMPLE_MAX, SAMPLE_MIN},
    DecimatedBlock, RawBlock, BLOCK_SIZE, DECIMATION_FACTOR, SLOT_BYTES,
};

#[inline(always)]
fn slot_at(block: &RawBlock, i: usize) -> u32 {
    u32::from_le_bytes([block[i], block[i + 1], block[i + 2], block[i + 3]])
}

/// Average `DECIMATION_FACTOR` raw blocks into one decimated block
pub fn decimate(blocks: &[RawBlock; DECIMATION_FACTOR]) -> DecimatedBlock {
    let mut out = [0u8; BLOCK_SIZE];
    decimate_into(blocks, &mut out);
    out
}

/// Same as [`decimate`], writing into an existing block
pub fn decimate_into(blocks: &[RawBlock; DECIMATION_FACTOR], out: &mut DecimatedBlock) {
    for (slot, i) in out
        .chunks_exact_mut(SLOT_BYTES)
        .zip((0..BLOCK_SIZE).step_by(SLOT_BYTES))
    {
        // 8 * 2^23 fits comfortably in an i32
        let sum: i32 = blocks.iter().map(|b| sign_extend(slot_at(b, i))).sum();
        let mean = (sum / DECIMATION_FACTOR as i32).clamp(SAMPLE_MIN, SAMPLE_MAX);
        slot.copy_from_slice(&pack(mean).to_le_bytes());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sample::{constant_block, read_sample, unpack_block, write_sample};
    use crate::{CHANNEL_COUNT, FRAMES_PER_BLOCK};
    use rand::prelude::*;

    fn constant_window(v: i32) -> [RawBlock; DECIMATION_FACTOR] {
        [constant_block(v); DECIMATION_FACTOR]
    }

    #[test]
    fn test_identity() {
        for v in [0, 1, -1, 12345, -12345, SAMPLE_MAX, SAMPLE_MIN] {
            assert_eq!(decimate(&constant_window(v)), constant_block(v));
        }
    }

    #[test]
    fn test_clamp_at_max() {
        let out = decimate(&constant_window(SAMPLE_MAX));
        assert_eq!(read_sample(&out, 0, 0), SAMPLE_MAX);
        assert!(out.chunks_exact(SLOT_BYTES).all(|s| s[3] == 0));
    }

    #[test]
    fn test_alternating_extremes() {
        let mut window = constant_window(SAMPLE_MAX);
        for block in window.iter_mut().skip(1).step_by(2) {
            *block = constant_block(SAMPLE_MIN);
        }
        let out = decimate(&window);
        for frame in unpack_block(&out) {
            for s in frame {
                assert!(s.abs() <= 1, "{s}");
            }
        }
    }

    #[test]
    fn test_truncates_toward_zero() {
        // -1 * 7 + 0 = -7, -7 / 8 truncates to 0 (floor would give -1)
        let mut window = constant_window(-1);
        window[0] = constant_block(0);
        assert_eq!(read_sample(&decimate(&window), 5, 1), 0);
        // -9 / 8 truncates to -1 (floor would give -2)
        window = constant_window(-1);
        window[0] = constant_block(-2);
        assert_eq!(read_sample(&decimate(&window), 63, 0), -1);
    }

    #[test]
    fn test_random_against_reference() {
        let mut rng = StdRng::seed_from_u64(8);
        for _ in 0..32 {
            let mut window = [[0u8; BLOCK_SIZE]; DECIMATION_FACTOR];
            for block in window.iter_mut() {
                for frame in 0..FRAMES_PER_BLOCK {
                    for channel in 0..CHANNEL_COUNT {
                        let v = rng.gen_range(SAMPLE_MIN..=SAMPLE_MAX);
                        write_sample(block, frame, channel, v);
                    }
                }
            }
            let out = decimate(&window);
            for frame in 0..FRAMES_PER_BLOCK {
                for channel in 0..CHANNEL_COUNT {
                    let sum: i64 = window
                        .iter()
                        .map(|b| read_sample(b, frame, channel) as i64)
                        .sum();
                    assert_eq!(read_sample(&out, frame, channel) as i64, sum / 8);
                }
            }
        }
    }
}
