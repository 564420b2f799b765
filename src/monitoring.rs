//! In this module, we implement all the monitoring logic for the acquisition pipeline.
//! Each stage owns its counters and mirrors them here so they can be read from any thread
//! without touching the hot path's state.

use std::{
    fmt,
    sync::atomic::{AtomicU64, Ordering},
};

#[derive(Debug, Default)]
pub struct PipelineStats {
    captured: AtomicU64,
    overruns: AtomicU64,
    transferred: AtomicU64,
    drops: AtomicU64,
    decimated: AtomicU64,
    pop_timeouts: AtomicU64,
    frames: AtomicU64,
    published: AtomicU64,
    not_ready: AtomicU64,
    publish_errors: AtomicU64,
}

// Stages keep their own totals and mirror them here
macro_rules! mirror {
    ($($set:ident => $field:ident),* $(,)?) => {
        $(
            #[inline(always)]
            pub fn $set(&self, value: u64) {
                self.$field.store(value, Ordering::Relaxed);
            }
        )*
    };
}

impl PipelineStats {
    mirror! {
        set_overruns => overruns,
        set_transferred => transferred,
        set_drops => drops,
        set_decimated => decimated,
        set_pop_timeouts => pop_timeouts,
        set_frames => frames,
        set_published => published,
        set_not_ready => not_ready,
        set_publish_errors => publish_errors,
    }

    /// Called by the capture loop once per block pushed into the ring
    #[inline(always)]
    pub fn inc_captured(&self) {
        self.captured.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            captured: self.captured.load(Ordering::Relaxed),
            overruns: self.overruns.load(Ordering::Relaxed),
            transferred: self.transferred.load(Ordering::Relaxed),
            drops: self.drops.load(Ordering::Relaxed),
            decimated: self.decimated.load(Ordering::Relaxed),
            pop_timeouts: self.pop_timeouts.load(Ordering::Relaxed),
            frames: self.frames.load(Ordering::Relaxed),
            published: self.published.load(Ordering::Relaxed),
            not_ready: self.not_ready.load(Ordering::Relaxed),
            publish_errors: self.publish_errors.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of every pipeline counter
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Blocks pushed into the capture ring
    pub captured: u64,
    /// Blocks overwritten in the capture ring before being read
    pub overruns: u64,
    /// Blocks popped from the capture ring by the transfer stage
    pub transferred: u64,
    /// Blocks the batch queue had no room for
    pub drops: u64,
    /// Decimated blocks produced
    pub decimated: u64,
    pub pop_timeouts: u64,
    /// Frames assembled
    pub frames: u64,
    pub published: u64,
    /// Frames discarded because the sink was not ready
    pub not_ready: u64,
    pub publish_errors: u64,
}

impl StatsSnapshot {
    /// Raw blocks lost anywhere between capture and decimation
    pub fn blocks_lost(&self) -> u64 {
        self.overruns + self.drops
    }
}

impl fmt::Display for StatsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "captured={} overruns={} transferred={} drops={} decimated={} pop_timeouts={} \
             frames={} published={} not_ready={} errors={}",
            self.captured,
            self.overruns,
            self.transferred,
            self.drops,
            self.decimated,
            self.pop_timeouts,
            self.frames,
            self.published,
            self.not_ready,
            self.publish_errors
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot() {
        let stats = PipelineStats::default();
        stats.inc_captured();
        stats.inc_captured();
        stats.set_overruns(3);
        stats.set_drops(1);
        stats.set_pop_timeouts(7);
        let snap = stats.snapshot();
        assert_eq!(snap.captured, 2);
        assert_eq!(snap.blocks_lost(), 4);
        let line = snap.to_string();
        assert!(line.starts_with("captured=2 overruns=3"));
        assert!(line.contains("pop_timeouts=7 frames=0"));
    }
}
