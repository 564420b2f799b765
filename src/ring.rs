//! Lossy single-producer/single-consumer ring between the capture routine and the transfer stage
//!
//! Unlike a regular SPSC queue, a push never fails: when the producer laps the consumer the
//! oldest unread block is overwritten. Both indices are monotonic and only reduced modulo the
//! capacity when addressing a slot.
//!
//! Each slot carries a stamp (`seq + 1` of the block it holds, `0` while being written). The
//! consumer checks the stamp before and after copying, so a slot recycled under its feet is
//! skipped as an overrun rather than returned torn.

use std::sync::{
    atomic::{fence, AtomicU32, AtomicU64, Ordering},
    Arc,
};

use crate::{errors::RingError, RawBlock, BLOCK_SIZE, SLOT_BYTES};

const WORDS: usize = BLOCK_SIZE / SLOT_BYTES;

struct Slot {
    stamp: AtomicU64,
    words: [AtomicU32; WORDS],
}

impl Slot {
    fn new() -> Self {
        Self {
            stamp: AtomicU64::new(0),
            words: std::array::from_fn(|_| AtomicU32::new(0)),
        }
    }
}

struct Shared {
    slots: Box<[Slot]>,
    write: AtomicU64,
    read: AtomicU64,
}

impl Shared {
    fn slot(&self, seq: u64) -> &Slot {
        &self.slots[(seq % self.slots.len() as u64) as usize]
    }
}

/// Create a capture ring holding `capacity` blocks, split into its two halves
pub fn capture_ring(capacity: usize) -> Result<(RingProducer, RingConsumer), RingError> {
    if capacity == 0 {
        return Err(RingError::ZeroCapacity);
    }
    let shared = Arc::new(Shared {
        slots: (0..capacity).map(|_| Slot::new()).collect(),
        write: AtomicU64::new(0),
        read: AtomicU64::new(0),
    });
    Ok((
        RingProducer {
            shared: shared.clone(),
            write: 0,
        },
        RingConsumer {
            shared,
            read: 0,
            overruns: 0,
        },
    ))
}

/// The writing half, owned by the capture routine
pub struct RingProducer {
    shared: Arc<Shared>,
    write: u64,
}

impl RingProducer {
    /// Store a block, overwriting the oldest unread one if the ring is full. Never blocks.
    pub fn push(&mut self, block: &RawBlock) {
        let seq = self.write;
        let slot = self.shared.slot(seq);
        // Invalidate first so a concurrent reader can tell the slot is being recycled
        slot.stamp.store(0, Ordering::Relaxed);
        fence(Ordering::Release);
        for (word, bytes) in slot.words.iter().zip(block.chunks_exact(SLOT_BYTES)) {
            word.store(
                u32::from_ne_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
                Ordering::Relaxed,
            );
        }
        slot.stamp.store(seq + 1, Ordering::Release);
        self.write = seq + 1;
        self.shared.write.store(self.write, Ordering::Release);
    }

    /// Total number of blocks ever pushed
    pub fn written(&self) -> u64 {
        self.write
    }

    pub fn capacity(&self) -> usize {
        self.shared.slots.len()
    }
}

/// The reading half, owned by the transfer stage
pub struct RingConsumer {
    shared: Arc<Shared>,
    read: u64,
    overruns: u64,
}

impl RingConsumer {
    /// Copy the oldest retained block into `out`.
    /// Returns false, leaving `out` untouched, when nothing is unread.
    pub fn try_pop(&mut self, out: &mut RawBlock) -> bool {
        loop {
            let write = self.shared.write.load(Ordering::Acquire);
            if self.read == write {
                return false;
            }
            let cap = self.capacity() as u64;
            if write - self.read > cap {
                // Lapped, everything older than the newest `cap` blocks is gone
                self.overruns += write - self.read - cap;
                self.read = write - cap;
            }
            let seq = self.read;
            let slot = self.shared.slot(seq);
            if slot.stamp.load(Ordering::Acquire) != seq + 1 {
                // Being recycled right now
                self.skip_overwritten();
                continue;
            }
            for (word, bytes) in slot.words.iter().zip(out.chunks_exact_mut(SLOT_BYTES)) {
                bytes.copy_from_slice(&word.load(Ordering::Relaxed).to_ne_bytes());
            }
            fence(Ordering::Acquire);
            if slot.stamp.load(Ordering::Relaxed) != seq + 1 {
                self.skip_overwritten();
                continue;
            }
            self.read = seq + 1;
            self.shared.read.store(self.read, Ordering::Release);
            return true;
        }
    }

    fn skip_overwritten(&mut self) {
        self.overruns += 1;
        self.read += 1;
        self.shared.read.store(self.read, Ordering::Release);
    }

    /// Unread blocks still retained, at most the capacity
    pub fn len(&self) -> usize {
        let write = self.shared.write.load(Ordering::Acquire);
        (write - self.read).min(self.capacity() as u64) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Blocks lost because the producer overwrote them before they were read
    pub fn overruns(&self) -> u64 {
        self.overruns
    }

    pub fn capacity(&self) -> usize {
        self.shared.slots.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sample::constant_block;
    use std::thread;

    fn tagged(tag: u8) -> RawBlock {
        let mut block = [0u8; BLOCK_SIZE];
        block[0] = tag;
        block[BLOCK_SIZE - 1] = tag;
        block
    }

    #[test]
    fn test_zero_capacity() {
        assert!(capture_ring(0).is_err());
    }

    #[test]
    fn test_empty_pop_leaves_output() {
        let (_, mut rx) = capture_ring(8).unwrap();
        let mut out = [7u8; BLOCK_SIZE];
        assert!(!rx.try_pop(&mut out));
        assert_eq!(out, [7u8; BLOCK_SIZE]);
        assert!(rx.is_empty());
    }

    #[test]
    fn test_fifo() {
        let (mut tx, mut rx) = capture_ring(8).unwrap();
        let mut out = [0u8; BLOCK_SIZE];
        for i in 0..20u8 {
            tx.push(&tagged(i));
            assert!(rx.try_pop(&mut out));
            assert_eq!(out, tagged(i));
        }
        assert_eq!(rx.overruns(), 0);
    }

    #[test]
    fn test_wrap_overwrites_oldest() {
        const N: usize = 8;
        let (mut tx, mut rx) = capture_ring(N).unwrap();
        for i in 0..=N as u8 {
            tx.push(&tagged(i));
        }
        assert_eq!(rx.len(), N);
        let mut out = [0u8; BLOCK_SIZE];
        for i in 1..=N as u8 {
            assert!(rx.try_pop(&mut out));
            assert_eq!(out, tagged(i));
        }
        assert!(!rx.try_pop(&mut out));
        assert_eq!(rx.overruns(), 1);
        assert_eq!(tx.written(), N as u64 + 1);
    }

    #[test]
    fn test_concurrent_blocks_never_torn() {
        let (mut tx, mut rx) = capture_ring(4).unwrap();
        const TOTAL: i32 = 20_000;
        let producer = thread::spawn(move || {
            for i in 0..TOTAL {
                tx.push(&constant_block(i));
            }
        });
        let mut out = [0u8; BLOCK_SIZE];
        let mut last = -1;
        let mut popped = 0u64;
        let mut check = |out: &RawBlock| {
            let v = crate::sample::read_sample(out, 0, 0);
            // Every slot in the block agrees and order is preserved
            assert_eq!(*out, constant_block(v));
            assert!(v > last);
            last = v;
            popped += 1;
        };
        while !producer.is_finished() {
            if rx.try_pop(&mut out) {
                check(&out);
            }
        }
        producer.join().unwrap();
        while rx.try_pop(&mut out) {
            check(&out);
        }
        assert_eq!(last, TOTAL - 1);
        assert_eq!(popped + rx.overruns(), TOTAL as u64);
    }
}
