//! Encoder input preparation for sequence-to-sequence models.
//!
//! Turns a tokenized multi-stream batch into the time-major embedding and
//! mask tensors consumed by an encoder, on top of candle.
//!
//! ## Data flow
//!
//! ```text
//! Options ──┬─→ EncoderBase (prefix, inference, index)
//!           └─→ VocabRemapper (vmap file, read lazily)
//!
//! CorpusBatch[index] ─→ rows(E, ids) ─→ vmap blend ─→ reshape [W, B, D]
//!                   └─→ mask ─────────────────────→ constant [W, B, 1]
//!                                                        ↓
//!                                          Encoder::build → EncoderState
//! ```
//!
//! ## Modules
//!
//! - [`config`] — typed option bag
//! - [`data`] — sub-batches and multi-stream batches
//! - [`model`] — encoder contract, embedding lookup, vocabulary remapping

pub mod config;
pub mod data;
pub mod model;

mod error;

pub use config::Options;
pub use data::{CorpusBatch, SubBatch};
pub use error::{Error, Result};
pub use model::encoder::vmap::{VocabMap, VocabRemapper};
pub use model::encoder::{Encoder, EncoderBase};
pub use model::states::EncoderState;
