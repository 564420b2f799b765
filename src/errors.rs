//! Error types for every fallible edge of the acquisition core

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RingError {
    #[error("capture ring capacity must be at least one block")]
    ZeroCapacity,
}

/// Problems found while parsing a frame off the wire
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    #[error("frame truncated: need at least {needed} bytes, got {got}")]
    Truncated { needed: usize, got: usize },
    #[error("bad magic {0:02x?}")]
    BadMagic([u8; 4]),
    #[error("unsupported frame version {0}")]
    UnsupportedVersion(u8),
    #[error("header_len {0} is shorter than the fixed header")]
    HeaderTooShort(u16),
    #[error("unsupported block size {0}")]
    BlockSize(u16),
    #[error("frame length mismatch: header describes {expected} bytes, got {got}")]
    LengthMismatch { expected: usize, got: usize },
}

/// The three outcomes of a hand-off besides success
#[derive(Debug, Error)]
pub enum PublishError {
    /// The sink cannot take a frame right now; the frame is dropped
    #[error("publish sink not ready")]
    NotReady,
    #[error("publish sink closed")]
    Closed,
    #[error("publish failed: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("invalid pipeline configuration: {0}")]
    Config(&'static str),
    #[error(transparent)]
    Ring(#[from] RingError),
    #[error("failed to spawn {stage} thread")]
    Spawn {
        stage: &'static str,
        #[source]
        source: std::io::Error,
    },
    #[error("{0} thread panicked")]
    Panicked(&'static str),
}
