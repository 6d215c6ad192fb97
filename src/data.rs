//! Tokenized batches.
//!
//! A [`CorpusBatch`] holds one [`SubBatch`] per input stream. Token ids and
//! masks are stored flat and time-major: the token of sequence `b` at step
//! `t` lives at `t * batch_size + b`.

use crate::{Error, Result};

/// Tokenized, padded sequences of one input stream.
#[derive(Debug, Clone, PartialEq)]
pub struct SubBatch {
    batch_size: usize,
    batch_width: usize,
    data: Vec<u32>,
    mask: Vec<f32>,
}

impl SubBatch {
    /// Build a sub-batch from flat time-major token ids and mask.
    pub fn new(batch_size: usize, batch_width: usize, data: Vec<u32>, mask: Vec<f32>) -> Result<Self> {
        let expected = batch_size * batch_width;
        if data.len() != expected || mask.len() != expected {
            return Err(Error::Batch(format!(
                "sub-batch {batch_width}x{batch_size} needs {expected} entries, got {} ids and {} mask values",
                data.len(),
                mask.len()
            )));
        }
        Ok(Self {
            batch_size,
            batch_width,
            data,
            mask,
        })
    }

    /// Pad `sequences` to the longest one with `pad_id` and lay them out time-major.
    pub fn from_sequences(sequences: &[Vec<u32>], pad_id: u32) -> Self {
        let batch_size = sequences.len();
        let batch_width = sequences.iter().map(Vec::len).max().unwrap_or(0);

        let mut data = vec![pad_id; batch_size * batch_width];
        let mut mask = vec![0.0f32; batch_size * batch_width];
        for (b, seq) in sequences.iter().enumerate() {
            for (t, &id) in seq.iter().enumerate() {
                data[t * batch_size + b] = id;
                mask[t * batch_size + b] = 1.0;
            }
        }

        Self {
            batch_size,
            batch_width,
            data,
            mask,
        }
    }

    /// Number of sequences.
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Padded sequence length.
    pub fn batch_width(&self) -> usize {
        self.batch_width
    }

    pub fn data(&self) -> &[u32] {
        &self.data
    }

    pub fn mask(&self) -> &[f32] {
        &self.mask
    }

    /// Number of non-padding tokens.
    pub fn words(&self) -> usize {
        self.mask.iter().filter(|&&m| m != 0.0).count()
    }
}

/// Multi-stream batch, one sub-batch per input stream.
#[derive(Debug, Clone, PartialEq)]
pub struct CorpusBatch {
    sub_batches: Vec<SubBatch>,
}

impl CorpusBatch {
    pub fn new(sub_batches: Vec<SubBatch>) -> Self {
        Self { sub_batches }
    }

    /// Number of streams.
    pub fn sets(&self) -> usize {
        self.sub_batches.len()
    }

    /// Sub-batch of stream `index`.
    pub fn get(&self, index: usize) -> Result<&SubBatch> {
        self.sub_batches.get(index).ok_or_else(|| {
            Error::Batch(format!(
                "stream index {index} out of range for batch with {} streams",
                self.sub_batches.len()
            ))
        })
    }

    /// Number of sequences, taken from the first stream.
    pub fn size(&self) -> usize {
        self.sub_batches.first().map_or(0, SubBatch::batch_size)
    }

    pub fn sub_batches(&self) -> &[SubBatch] {
        &self.sub_batches
    }
}
