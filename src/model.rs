//! Encoder-side model components.
//!
//! ## Components
//!
//! - [`encoder`] — the [`Encoder`](encoder::Encoder) contract, shared encoder
//!   state and the batch embedding lookup
//! - [`states`] — the encoder output handed to decoders

pub mod encoder;
pub mod states;
