//! Wiring: capture thread → capture ring → transfer thread → batch queue → batch thread → sink

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread::{self, JoinHandle},
    time::Duration,
};

use tracing::{debug, error, info};

use crate::{
    assembler::BatchAssembler,
    capture::{capture_blocks, CaptureSource},
    errors::PipelineError,
    exfil::{BatchStage, FrameClock, DEFAULT_TOPIC, POP_TIMEOUT},
    monitoring::{PipelineStats, StatsSnapshot},
    ring::capture_ring,
    sink::PublishSink,
    transfer::{batch_queue, TransferStage, REPORT_EVERY},
};

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Slots in the capture ring
    pub ring_capacity: usize,
    /// Depth of the queue between the transfer and batch stages
    pub queue_depth: usize,
    /// Decimated blocks per frame (K)
    pub blocks_per_batch: usize,
    pub transfer_period: Duration,
    pub pop_timeout: Duration,
    /// Successful pops between transfer stage reports
    pub report_every: u64,
    /// Warn about capture ring overruns
    pub report_overruns: bool,
    pub dev_id: u32,
    pub start_seq: u32,
    pub topic: String,
    pub clock: FrameClock,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            ring_capacity: 8,
            queue_depth: 256,
            blocks_per_batch: 4,
            transfer_period: Duration::from_millis(8),
            pop_timeout: POP_TIMEOUT,
            report_every: REPORT_EVERY,
            report_overruns: false,
            dev_id: 0,
            start_seq: 0,
            topic: DEFAULT_TOPIC.to_owned(),
            clock: FrameClock::Unix,
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.ring_capacity == 0 {
            return Err(PipelineError::Config("ring capacity must be positive"));
        }
        if self.queue_depth == 0 {
            return Err(PipelineError::Config("queue depth must be positive"));
        }
        if self.blocks_per_batch == 0 || self.blocks_per_batch > u16::MAX as usize {
            return Err(PipelineError::Config("blocks per batch must be in 1..=65535"));
        }
        if self.transfer_period.is_zero() || self.pop_timeout.is_zero() {
            return Err(PipelineError::Config("periods must be non-zero"));
        }
        Ok(())
    }
}

/// What to do with blocks still in flight when shutting down
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownMode {
    /// Forward whatever is in the ring and queue, publishing every frame that completes
    Drain,
    /// Stop as soon as possible, dropping buffered blocks
    Discard,
}

struct Worker {
    name: &'static str,
    running: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

impl Worker {
    fn spawn<F>(name: &'static str, f: F) -> Result<Self, PipelineError>
    where
        F: FnOnce(&AtomicBool) + Send + 'static,
    {
        let running = Arc::new(AtomicBool::new(true));
        let flag = running.clone();
        let handle = thread::Builder::new()
            .name(name.to_owned())
            .spawn(move || f(&flag))
            .map_err(|source| PipelineError::Spawn {
                stage: name,
                source,
            })?;
        Ok(Self {
            name,
            running,
            handle,
        })
    }

    fn stop(&self) {
        self.running.store(false, Ordering::Release);
    }

    fn join(self) -> Result<(), PipelineError> {
        debug!(stage = self.name, "Joining");
        self.handle
            .join()
            .map_err(|_| PipelineError::Panicked(self.name))
    }
}

pub struct Pipeline {
    capture: Worker,
    transfer: Worker,
    batch: Worker,
    drain: Arc<AtomicBool>,
    stats: Arc<PipelineStats>,
}

impl Pipeline {
    /// Start the capture, transfer and batch threads
    pub fn spawn<C, S>(config: PipelineConfig, source: C, sink: S) -> Result<Self, PipelineError>
    where
        C: CaptureSource + Send + 'static,
        S: PublishSink + Send + 'static,
    {
        config.validate()?;
        let stats = Arc::new(PipelineStats::default());
        let (producer, consumer) = capture_ring(config.ring_capacity)?;
        let (queue_tx, queue_rx) = batch_queue(config.queue_depth);
        let drain = Arc::new(AtomicBool::new(true));

        // Downstream first so nothing is produced without a consumer
        let batch_stage = BatchStage::new(
            BatchAssembler::new(config.blocks_per_batch, config.dev_id)?
                .with_start_seq(config.start_seq),
            sink,
            stats.clone(),
        )
        .topic(config.topic.clone())
        .clock(config.clock);
        let pop_timeout = config.pop_timeout;
        let batch = Worker::spawn("jqmb-batch", move |running| {
            batch_stage.run(queue_rx, pop_timeout, running);
        })?;

        let transfer_stage = TransferStage::new(consumer, queue_tx, stats.clone())
            .report_every(config.report_every)
            .report_overruns(config.report_overruns);
        let period = config.transfer_period;
        let transfer = {
            let drain = drain.clone();
            Worker::spawn("jqmb-transfer", move |running| {
                transfer_stage.run(period, running, &drain);
            })?
        };

        let capture = {
            let stats = stats.clone();
            Worker::spawn("jqmb-capture", move |running| {
                capture_blocks(source, producer, running, &stats)
            })?
        };

        info!(
            ring = config.ring_capacity,
            queue = config.queue_depth,
            k = config.blocks_per_batch,
            dev_id = config.dev_id,
            "Pipeline running"
        );
        Ok(Self {
            capture,
            transfer,
            batch,
            drain,
            stats,
        })
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Stop capture, then transfer, then the batch stage, and return the final counters.
    ///
    /// The transfer stage owns the only sender of the batch queue, so once it has stopped the
    /// batch stage can't block forever on a pop. Every stage is stopped and joined even if an
    /// earlier one panicked; the first failure is returned after all threads are gone.
    pub fn shutdown(self, mode: ShutdownMode) -> Result<StatsSnapshot, PipelineError> {
        info!(?mode, "Shutting down pipeline");
        self.drain
            .store(mode == ShutdownMode::Drain, Ordering::Release);

        self.capture.stop();
        let capture = self.capture.join();

        self.transfer.stop();
        let transfer = self.transfer.join();

        if mode == ShutdownMode::Discard {
            self.batch.stop();
        }
        let batch = self.batch.join();

        let snapshot = self.stats.snapshot();
        capture.and(transfer).and(batch).map_err(|e| {
            error!(error = %e, %snapshot, "Pipeline stopped with a failed stage");
            e
        })?;
        info!(%snapshot, "Pipeline stopped");
        Ok(snapshot)
    }
}
