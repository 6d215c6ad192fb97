//! Encoder output state.

use candle_core::Tensor;

/// Output of [`Encoder::build`](super::encoder::Encoder::build).
///
/// - `context`: `[W, B, D]` encoded sequence, time-major
/// - `mask`: `[W, B, 1]` (1=valid, 0=padding)
#[derive(Debug, Clone)]
pub struct EncoderState {
    context: Tensor,
    mask: Tensor,
    batch_index: usize,
}

impl EncoderState {
    pub fn new(context: Tensor, mask: Tensor, batch_index: usize) -> Self {
        Self {
            context,
            mask,
            batch_index,
        }
    }

    pub fn context(&self) -> &Tensor {
        &self.context
    }

    pub fn mask(&self) -> &Tensor {
        &self.mask
    }

    /// Stream of the batch this state was built from.
    pub fn batch_index(&self) -> usize {
        self.batch_index
    }
}
