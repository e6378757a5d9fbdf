//! Errors raised by the model layer.

use thiserror::Error;

pub type ModelResult<T> = std::result::Result<T, ModelError>;

/// Everything that can go wrong between a step feed and a model update.
///
/// Feeds are validated before any tensor is built, so a malformed
/// batch surfaces here instead of as a backend panic.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ModelError {
    /// A step was requested with zero rows.
    #[error("empty batch")]
    EmptyBatch,

    /// Two fields of the same feed disagree on the batch size.
    #[error("{field}: expected {expected} rows, found {found}")]
    BatchSizeMismatch {
        field:    &'static str,
        expected: usize,
        found:    usize,
    },

    /// Rows of a padded matrix have different widths.
    #[error("{field}: row {row} has width {found}, expected {expected}")]
    RaggedRow {
        field:    &'static str,
        row:      usize,
        expected: usize,
        found:    usize,
    },

    /// A sequence length does not fit the padded width.
    #[error("{field}: row {row} has length {length}, allowed range is {min}..={max}")]
    LengthOutOfRange {
        field:  &'static str,
        row:    usize,
        length: usize,
        min:    usize,
        max:    usize,
    },

    /// A token id is not part of the vocabulary.
    #[error("{field}: token id {token} is outside a vocabulary of {vocab_size}")]
    TokenOutOfVocab {
        field:      &'static str,
        token:      u32,
        vocab_size: usize,
    },

    /// Target weights do not match `[batch, max_decode_len]`.
    #[error("target_weights: expected shape [{rows}, {cols}], found row {row} with width {found}")]
    TargetWeightsShape {
        rows:  usize,
        cols:  usize,
        row:   usize,
        found: usize,
    },

    /// Hyper-parameters that cannot produce a working model.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The loss came back NaN or infinite.
    #[error("non-finite loss {0} at step {1}")]
    NonFiniteLoss(f64, usize),
}
