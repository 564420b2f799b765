//! This module is responsible for exfilling decimated data to the publish sink
//!
//! The batch/decimate stage pulls raw blocks off the batch queue eight at a time, averages them,
//! packs the results into frames and hands each finished frame to the sink exactly once.

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};

use chrono::Utc;
use crossbeam_channel::{Receiver, RecvTimeoutError};
use tracing::{debug, info, trace, warn};

use crate::{
    assembler::BatchAssembler, decimate::decimate_into, errors::PublishError,
    monitoring::PipelineStats, sink::PublishSink, DecimatedBlock, RawBlock, BLOCK_SIZE,
    DECIMATION_FACTOR,
};

/// How long a single pop from the batch queue may wait
pub const POP_TIMEOUT: Duration = Duration::from_millis(16);
pub const DEFAULT_TOPIC: &str = "jaqc/sig/batch";

/// Source of the `ts_ms` header field
#[derive(Debug, Clone, Copy)]
pub enum FrameClock {
    /// Unix epoch milliseconds, truncated to 32 bits
    Unix,
    /// Milliseconds since the given instant
    Uptime(Instant),
    /// Always the same value
    Fixed(u32),
}

impl FrameClock {
    pub fn uptime() -> Self {
        Self::Uptime(Instant::now())
    }

    pub fn now_ms(&self) -> u32 {
        match self {
            // Wraps every ~49.7 days, receivers compare with wrapping arithmetic
            Self::Unix => Utc::now().timestamp_millis() as u32,
            Self::Uptime(start) => start.elapsed().as_millis() as u32,
            Self::Fixed(ms) => *ms,
        }
    }
}

/// What happened to a finished frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handoff {
    Published,
    /// Sink wasn't ready, frame discarded
    NotReady,
    /// Sink failed, frame discarded
    Failed,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BatchCounters {
    pub decimated: u64,
    pub frames: u64,
    pub published: u64,
    pub not_ready: u64,
    pub publish_errors: u64,
    pub pop_timeouts: u64,
}

pub struct BatchStage<S> {
    window: [RawBlock; DECIMATION_FACTOR],
    filled: usize,
    decimated: DecimatedBlock,
    assembler: BatchAssembler,
    sink: S,
    topic: String,
    clock: FrameClock,
    counters: BatchCounters,
    stats: Arc<PipelineStats>,
}

impl<S: PublishSink> BatchStage<S> {
    pub fn new(assembler: BatchAssembler, sink: S, stats: Arc<PipelineStats>) -> Self {
        Self {
            window: [[0u8; BLOCK_SIZE]; DECIMATION_FACTOR],
            filled: 0,
            decimated: [0u8; BLOCK_SIZE],
            assembler,
            sink,
            topic: DEFAULT_TOPIC.to_owned(),
            clock: FrameClock::Unix,
            counters: BatchCounters::default(),
            stats,
        }
    }

    pub fn topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = topic.into();
        self
    }

    pub fn clock(mut self, clock: FrameClock) -> Self {
        self.clock = clock;
        self
    }

    /// Take one raw block. Returns what happened to the frame if this block completed one.
    pub fn accept(&mut self, block: &RawBlock) -> Option<Handoff> {
        self.window[self.filled] = *block;
        self.filled += 1;
        if self.filled < DECIMATION_FACTOR {
            return None;
        }
        self.filled = 0;

        decimate_into(&self.window, &mut self.decimated);
        self.counters.decimated += 1;
        self.stats.set_decimated(self.counters.decimated);

        let frame = self.assembler.push(&self.decimated, self.clock.now_ms())?;
        self.counters.frames += 1;
        self.stats.set_frames(self.counters.frames);

        let handoff = match self.sink.publish(&self.topic, frame.as_bytes()) {
            Ok(()) => {
                self.counters.published += 1;
                self.stats.set_published(self.counters.published);
                trace!(seq_first = frame.header().seq_first, "Published frame");
                Handoff::Published
            }
            Err(PublishError::NotReady) => {
                self.counters.not_ready += 1;
                self.stats.set_not_ready(self.counters.not_ready);
                debug!(seq_first = frame.header().seq_first, "Sink not ready, frame dropped");
                Handoff::NotReady
            }
            Err(e) => {
                self.counters.publish_errors += 1;
                self.stats.set_publish_errors(self.counters.publish_errors);
                warn!(
                    error = %e,
                    seq_first = frame.header().seq_first,
                    "Publish failed, frame dropped"
                );
                Handoff::Failed
            }
        };
        Some(handoff)
    }

    /// Pull blocks until the queue disconnects or `running` is cleared.
    /// Whatever doesn't make a whole frame at that point is discarded. Returns the sink.
    pub fn run(
        mut self,
        queue: Receiver<RawBlock>,
        pop_timeout: Duration,
        running: &AtomicBool,
    ) -> S {
        info!(?pop_timeout, topic = %self.topic, "Batch stage started");
        while running.load(Ordering::Acquire) {
            match queue.recv_timeout(pop_timeout) {
                Ok(block) => {
                    self.accept(&block);
                }
                Err(RecvTimeoutError::Timeout) => {
                    // A slow producer only delays the batch
                    self.counters.pop_timeouts += 1;
                    self.stats.set_pop_timeouts(self.counters.pop_timeouts);
                }
                Err(RecvTimeoutError::Disconnected) => {
                    debug!("Batch queue closed");
                    break;
                }
            }
        }
        let raw = std::mem::take(&mut self.filled);
        let decimated = self.assembler.discard_partial();
        if raw + decimated > 0 {
            debug!(raw, decimated, "Discarded partial batch");
        }
        if let Err(e) = self.sink.flush() {
            // Whatever the sink still buffered is lost
            self.counters.publish_errors += 1;
            self.stats.set_publish_errors(self.counters.publish_errors);
            warn!(error = %e, "Final sink flush failed");
        }
        info!(
            decimated = self.counters.decimated,
            frames = self.counters.frames,
            published = self.counters.published,
            not_ready = self.counters.not_ready,
            errors = self.counters.publish_errors,
            "Batch stage stopped"
        );
        self.sink
    }

    pub fn counters(&self) -> BatchCounters {
        self.counters
    }

    /// Sequence number the next decimated block gets
    pub fn next_seq(&self) -> u32 {
        self.assembler.next_seq()
    }
}
