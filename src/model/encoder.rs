//! Encoder contract and shared encoder state.
//!
//! - [`Encoder`] — the interface every concrete encoder implements
//! - [`EncoderBase`] — options and helpers shared by all encoders, including
//!   the batch embedding [`lookup`](EncoderBase::lookup)
//! - [`vmap`] — optional vocabulary remapping applied during lookup

pub mod vmap;

use candle_core::{Device, Tensor, D};
use candle_nn as nn;
use serde::de::DeserializeOwned;

use self::vmap::VocabRemapper;
use super::states::EncoderState;
use crate::config::{Options, DEFAULT_PREFIX};
use crate::data::CorpusBatch;
use crate::Result;

/// A sequence encoder.
///
/// Implementations turn one stream of a batch into an [`EncoderState`],
/// usually starting from [`EncoderBase::lookup`].
pub trait Encoder {
    /// Encode the configured stream of `batch` on `device`.
    fn build(&mut self, device: &Device, batch: &CorpusBatch) -> Result<EncoderState>;

    /// Drop cached buffers so the encoder can be reused for another batch.
    fn clear(&mut self);
}

/// Options and helpers shared by all encoder implementations.
///
/// Cloning yields an independent value with its own, unloaded vocabulary
/// map cache, suitable for another worker thread.
#[derive(Debug, Clone)]
pub struct EncoderBase {
    options: Options,
    prefix: String,
    inference: bool,
    batch_index: usize,
    remapper: VocabRemapper,
}

impl EncoderBase {
    /// Read `prefix`, `inference`, `index` and `vmap` from `options`.
    pub fn new(options: Options) -> Result<Self> {
        let prefix = options.get_or("prefix", DEFAULT_PREFIX.to_string())?;
        let inference = options.get_or("inference", false)?;
        let batch_index = options.get_or("index", 0usize)?;
        let remapper = VocabRemapper::from_options(&options)?;
        Ok(Self {
            options,
            prefix,
            inference,
            batch_index,
            remapper,
        })
    }

    /// Parameter name prefix, e.g. `"encoder"`.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn inference(&self) -> bool {
        self.inference
    }

    /// Stream of the batch this encoder consumes.
    pub fn batch_index(&self) -> usize {
        self.batch_index
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    pub fn remapper(&self) -> &VocabRemapper {
        &self.remapper
    }

    /// Typed access to any option.
    pub fn opt<T: DeserializeOwned>(&self, key: &str) -> Result<T> {
        self.options.get(key)
    }

    /// Embed the configured stream of `batch`.
    ///
    /// - `src_embeddings`: `[V, D]` embedding table
    ///
    /// Returns `(embeddings [W, B, D], mask [W, B, 1])`, time-major. The mask
    /// has the dtype of the embedding table.
    pub fn lookup(
        &self,
        device: &Device,
        src_embeddings: &Tensor,
        batch: &CorpusBatch,
    ) -> Result<(Tensor, Tensor)> {
        let sub_batch = batch.get(self.batch_index)?;

        let dim_batch = sub_batch.batch_size();
        let dim_words = sub_batch.batch_width();
        let dim_emb = src_embeddings.dim(D::Minus1)?;

        let ids = Tensor::from_vec(
            sub_batch.data().to_vec(),
            sub_batch.data().len(),
            src_embeddings.device(),
        )?;
        let chosen = src_embeddings.index_select(&ids, 0)?;
        let chosen = self
            .remapper
            .apply(&chosen, src_embeddings, sub_batch.data())?;

        let batch_embeddings = chosen
            .reshape((dim_words, dim_batch, dim_emb))?
            .to_device(device)?;
        let batch_mask = Tensor::from_vec(sub_batch.mask().to_vec(), (dim_words, dim_batch, 1), device)?
            .to_dtype(src_embeddings.dtype())?;

        tracing::trace!(
            "{}: lookup stream {} -> [{dim_words}, {dim_batch}, {dim_emb}]",
            self.prefix,
            self.batch_index
        );
        Ok((batch_embeddings, batch_mask))
    }

    /// [`lookup`](Self::lookup) over the weights of an embedding layer.
    pub fn lookup_embedding(
        &self,
        device: &Device,
        embedding: &nn::Embedding,
        batch: &CorpusBatch,
    ) -> Result<(Tensor, Tensor)> {
        self.lookup(device, embedding.embeddings(), batch)
    }
}
