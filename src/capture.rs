//! This module contains all the capture logic

// The capture thread will do one thing, as fast as possible:
// Read blocks from the converter, and that's it. Those bytes go into the capture ring
// and the transfer stage picks them up on its own schedule.

use std::{
    collections::VecDeque,
    f32::consts::TAU,
    sync::atomic::{AtomicBool, Ordering},
    thread,
    time::{Duration, Instant},
};

use tracing::{debug, info};

use crate::{
    monitoring::PipelineStats,
    ring::RingProducer,
    sample::{from_full_scale, write_sample},
    RawBlock, BLOCK_SIZE, FRAMES_PER_BLOCK, RAW_SAMPLE_RATE_HZ,
};

/// How long one raw block takes to arrive from the converter (8 ms)
pub const BLOCK_PERIOD: Duration =
    Duration::from_micros(FRAMES_PER_BLOCK as u64 * 1_000_000 / RAW_SAMPLE_RATE_HZ as u64);

// Back off when the source has nothing for us
const IDLE_BACKOFF: Duration = Duration::from_millis(1);

/// Anything that produces raw blocks at the converter's cadence
pub trait CaptureSource {
    /// Get the next block, or `None` if there isn't one yet.
    /// Implementations may block for up to one block period.
    fn try_read_raw_block(&mut self) -> Option<RawBlock>;
}

/// Push blocks from `source` into the capture ring until `running` is cleared
pub fn capture_blocks<S: CaptureSource>(
    mut source: S,
    mut producer: RingProducer,
    running: &AtomicBool,
    stats: &PipelineStats,
) {
    info!(capacity = producer.capacity(), "Capture started");
    while running.load(Ordering::Acquire) {
        match source.try_read_raw_block() {
            Some(block) => {
                producer.push(&block);
                stats.inc_captured();
            }
            None => thread::sleep(IDLE_BACKOFF),
        }
    }
    info!(blocks = producer.written(), "Capture stopped");
}

/// Sleeps until the next block is due
struct Pacer {
    period: Duration,
    next: Option<Instant>,
}

impl Pacer {
    fn new(period: Duration) -> Self {
        Self { period, next: None }
    }

    fn wait(&mut self) {
        let now = Instant::now();
        let next = *self.next.get_or_insert(now);
        if next > now {
            thread::sleep(next - now);
        }
        self.next = Some(next.max(now) + self.period);
    }
}

/// Synthetic converter: a sine on channel 1 and its inverse on channel 2
pub struct ToneSource {
    amplitude: f32,
    phase: f32,
    step: f32,
    pacer: Option<Pacer>,
}

impl ToneSource {
    /// A tone at `freq_hz` with peak `amplitude` in full-scale units, paced like the real converter
    pub fn new(freq_hz: f32, amplitude: f32) -> Self {
        debug!(freq_hz, amplitude, "Synthetic tone source");
        Self {
            amplitude,
            phase: 0.0,
            step: TAU * freq_hz / RAW_SAMPLE_RATE_HZ as f32,
            pacer: Some(Pacer::new(BLOCK_PERIOD)),
        }
    }

    /// Produce blocks as fast as they are asked for
    pub fn unpaced(mut self) -> Self {
        self.pacer = None;
        self
    }
}

impl CaptureSource for ToneSource {
    fn try_read_raw_block(&mut self) -> Option<RawBlock> {
        if let Some(pacer) = self.pacer.as_mut() {
            pacer.wait();
        }
        let mut block = [0u8; BLOCK_SIZE];
        for frame in 0..FRAMES_PER_BLOCK {
            let v = from_full_scale(self.amplitude * self.phase.sin());
            write_sample(&mut block, frame, 0, v);
            write_sample(&mut block, frame, 1, -v);
            self.phase = (self.phase + self.step) % TAU;
        }
        Some(block)
    }
}

/// Plays back a fixed list of blocks, then runs dry
pub struct ReplaySource {
    blocks: VecDeque<RawBlock>,
    pacer: Option<Pacer>,
}

impl ReplaySource {
    pub fn new(blocks: impl IntoIterator<Item = RawBlock>) -> Self {
        Self {
            blocks: blocks.into_iter().collect(),
            pacer: None,
        }
    }

    /// Release one block per `period`
    pub fn paced(mut self, period: Duration) -> Self {
        self.pacer = Some(Pacer::new(period));
        self
    }

    pub fn remaining(&self) -> usize {
        self.blocks.len()
    }
}

impl CaptureSource for ReplaySource {
    fn try_read_raw_block(&mut self) -> Option<RawBlock> {
        if self.blocks.is_empty() {
            return None;
        }
        if let Some(pacer) = self.pacer.as_mut() {
            pacer.wait();
        }
        self.blocks.pop_front()
    }
}
