//! Error types for seq-encoder-input.

use std::path::PathBuf;

/// Result type alias using [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Candle tensor error (gather, reshape, out-of-range token ids).
    #[error("candle: {0}")]
    Candle(#[from] candle_core::Error),

    /// Missing option or option of the wrong type.
    #[error("config: {0}")]
    Config(String),

    /// Malformed batch or stream index out of range.
    #[error("batch: {0}")]
    Batch(String),

    /// Vocabulary map file could not be read.
    #[error("vmap {}: {source}", path.display())]
    VocabMap {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// I/O error.
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error.
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
}
