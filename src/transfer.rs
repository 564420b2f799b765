//! The transfer stage moves blocks from the capture ring into the batch queue on a fixed period.
//!
//! This has to keep up with the converter, so a tick never blocks, parses or allocates: pop one
//! block, try to enqueue it, count it as dropped if the queue is full, move on.

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread,
    time::{Duration, Instant},
};

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use tracing::{debug, info, warn};

use crate::{monitoring::PipelineStats, ring::RingConsumer, RawBlock, BLOCK_SIZE};

/// Every this many successful pops, log the drop counters
pub const REPORT_EVERY: u64 = 64;

/// The bounded queue between the transfer and batch/decimate stages
pub fn batch_queue(depth: usize) -> (Sender<RawBlock>, Receiver<RawBlock>) {
    bounded(depth)
}

/// What one tick did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    /// The ring was empty
    Idle,
    Forwarded,
    /// The queue was full, the block is gone
    Dropped,
    /// Nobody is reading the queue anymore
    Closed,
}

pub struct TransferStage {
    ring: RingConsumer,
    queue: Sender<RawBlock>,
    scratch: RawBlock,
    total: u64,
    drops: u64,
    report_every: u64,
    report_overruns: bool,
    reported_drops: u64,
    reported_overruns: u64,
    reports: u64,
    overrun_warnings: u64,
    stats: Arc<PipelineStats>,
}

impl TransferStage {
    pub fn new(ring: RingConsumer, queue: Sender<RawBlock>, stats: Arc<PipelineStats>) -> Self {
        Self {
            ring,
            queue,
            scratch: [0u8; BLOCK_SIZE],
            total: 0,
            drops: 0,
            report_every: REPORT_EVERY,
            report_overruns: false,
            reported_drops: 0,
            reported_overruns: 0,
            reports: 0,
            overrun_warnings: 0,
            stats,
        }
    }

    pub fn report_every(mut self, pops: u64) -> Self {
        self.report_every = pops.max(1);
        self
    }

    /// Also surface capture ring overruns in the periodic report
    pub fn report_overruns(mut self, enabled: bool) -> Self {
        self.report_overruns = enabled;
        self
    }

    pub fn tick(&mut self) -> Tick {
        if !self.ring.try_pop(&mut self.scratch) {
            return Tick::Idle;
        }
        self.total += 1;
        self.stats.set_transferred(self.total);
        self.stats.set_overruns(self.ring.overruns());

        let outcome = match self.queue.try_send(self.scratch) {
            Ok(()) => Tick::Forwarded,
            Err(TrySendError::Full(_)) => Tick::Dropped,
            Err(TrySendError::Disconnected(_)) => Tick::Closed,
        };
        if outcome != Tick::Forwarded {
            self.drops += 1;
            self.stats.set_drops(self.drops);
        }
        if self.total % self.report_every == 0 {
            self.report();
        }
        outcome
    }

    fn report(&mut self) {
        self.reports += 1;
        debug!(drops = self.drops, total = self.total, "transfer");
        if self.drops > self.reported_drops {
            warn!(
                dropped = self.drops - self.reported_drops,
                total = self.total,
                "Batch queue full, dropping blocks"
            );
            self.reported_drops = self.drops;
        }
        if self.report_overruns {
            let overruns = self.ring.overruns();
            if overruns > self.reported_overruns {
                warn!(
                    overrun = overruns - self.reported_overruns,
                    total = overruns,
                    "Capture ring overrun"
                );
                self.reported_overruns = overruns;
                self.overrun_warnings += 1;
            }
        }
    }

    /// Forward everything still sitting in the ring. Returns how many blocks were popped.
    pub fn drain(&mut self) -> u64 {
        let before = self.total;
        loop {
            match self.tick() {
                Tick::Idle | Tick::Closed => break,
                Tick::Forwarded | Tick::Dropped => {}
            }
        }
        self.total - before
    }

    /// Tick every `period` until `running` is cleared, then optionally drain the ring
    pub fn run(mut self, period: Duration, running: &AtomicBool, drain: &AtomicBool) -> Self {
        info!(?period, capacity = self.ring.capacity(), "Transfer stage started");
        let mut next = Instant::now();
        while running.load(Ordering::Acquire) {
            if self.tick() == Tick::Closed {
                warn!("Batch queue disconnected, stopping transfer stage");
                return self;
            }
            next += period;
            let now = Instant::now();
            if next > now {
                thread::sleep(next - now);
            } else {
                // Running late, don't try to catch up with a burst of ticks
                next = now;
            }
        }
        if drain.load(Ordering::Acquire) {
            let n = self.drain();
            debug!(blocks = n, "Drained capture ring");
        }
        info!(
            drops = self.drops,
            total = self.total,
            overruns = self.ring.overruns(),
            "Transfer stage stopped"
        );
        self
    }

    pub fn drops(&self) -> u64 {
        self.drops
    }

    /// Blocks popped from the ring so far
    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn overruns(&self) -> u64 {
        self.ring.overruns()
    }

    /// Periodic `(drops, total)` reports emitted so far
    pub fn reports(&self) -> u64 {
        self.reports
    }

    /// Reports that carried a new capture ring overrun
    pub fn overrun_warnings(&self) -> u64 {
        self.overrun_warnings
    }
}
