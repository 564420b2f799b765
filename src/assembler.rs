//! Accumulates decimated blocks into batch frames

use crate::{
    errors::PipelineError,
    frame::{BatchFrame, FrameHeader},
    DecimatedBlock, BLOCK_SIZE,
};

pub struct BatchAssembler {
    blocks_per_batch: usize,
    dev_id: u32,
    // Sequence number the next decimated block gets
    seq: u32,
    seq_first: u32,
    ts0: u32,
    filled: usize,
    body: Vec<u8>,
}

impl BatchAssembler {
    /// Fails if `blocks_per_batch` is zero or does not fit the frame's 16-bit count
    pub fn new(blocks_per_batch: usize, dev_id: u32) -> Result<Self, PipelineError> {
        if blocks_per_batch == 0 || blocks_per_batch > u16::MAX as usize {
            return Err(PipelineError::Config("blocks per batch must be in 1..=65535"));
        }
        Ok(Self {
            blocks_per_batch,
            dev_id,
            seq: 0,
            seq_first: 0,
            ts0: 0,
            filled: 0,
            body: vec![0u8; blocks_per_batch * BLOCK_SIZE],
        })
    }

    /// Start numbering decimated blocks at `seq` instead of zero
    pub fn with_start_seq(mut self, seq: u32) -> Self {
        self.seq = seq;
        self
    }

    /// Append one decimated block captured at `now_ms`.
    /// Returns the finished frame when this block completes a batch.
    pub fn push(&mut self, block: &DecimatedBlock, now_ms: u32) -> Option<BatchFrame> {
        if self.filled == 0 {
            self.seq_first = self.seq;
            self.ts0 = now_ms;
        }
        let start = self.filled * BLOCK_SIZE;
        self.body[start..start + BLOCK_SIZE].copy_from_slice(block);
        self.filled += 1;
        self.seq = self.seq.wrapping_add(1);

        if self.filled < self.blocks_per_batch {
            return None;
        }
        self.filled = 0;
        let header = FrameHeader::new(
            self.seq_first,
            self.blocks_per_batch as u16,
            self.ts0,
            self.dev_id,
        );
        Some(BatchFrame::from_parts(header, &self.body))
    }

    /// Throw away a partially filled batch. The sequence counter keeps its value.
    pub fn discard_partial(&mut self) -> usize {
        std::mem::take(&mut self.filled)
    }

    /// Blocks waiting for the current batch to complete
    pub fn pending(&self) -> usize {
        self.filled
    }

    /// Sequence number the next block will get
    pub fn next_seq(&self) -> u32 {
        self.seq
    }
}
