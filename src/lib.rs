//! Acquisition core for the JQMB sensor appliance.
//!
//! Raw stereo blocks flow from a capture source through a lossy capture ring, a periodic transfer
//! stage and a bounded batch queue into the batch/decimate stage, which averages them 8:1 and
//! packs them into versioned binary frames for a publish sink.

pub mod args;
pub mod assembler;
pub mod capture;
pub mod decimate;
pub mod errors;
pub mod exfil;
pub mod frame;
pub mod monitoring;
pub mod pipeline;
pub mod ring;
pub mod sample;
pub mod sink;
pub mod transfer;

// Set by the converter's serial audio interface
pub const BLOCK_SIZE: usize = 512;
pub const SLOT_BYTES: usize = 4;
pub const CHANNEL_COUNT: usize = 2;
pub const FRAMES_PER_BLOCK: usize = BLOCK_SIZE / (SLOT_BYTES * CHANNEL_COUNT);
pub const WORD_BITS: u8 = 24;
pub const SLOT_BITS: u8 = 32;
/// Native converter rate
pub const RAW_SAMPLE_RATE_HZ: u32 = 8000;
// How many raw blocks are averaged into one decimated block
pub const DECIMATION_FACTOR: usize = 8;
pub const DECIMATED_SAMPLE_RATE_HZ: u32 = RAW_SAMPLE_RATE_HZ / DECIMATION_FACTOR as u32;

/// One block exactly as it comes off the converter
pub type RawBlock = [u8; BLOCK_SIZE];
/// Same shape as [`RawBlock`], 8:1 averaged
pub type DecimatedBlock = [u8; BLOCK_SIZE];

pub use assembler::BatchAssembler;
pub use decimate::decimate;
pub use frame::{BatchFrame, FrameHeader};
pub use pipeline::{Pipeline, PipelineConfig, ShutdownMode};
pub use ring::{capture_ring, RingConsumer, RingProducer};
pub use sink::PublishSink;
