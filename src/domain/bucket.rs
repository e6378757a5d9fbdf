// ============================================================
// Layer 3 — Buckets
// ============================================================
// Pairs are grouped into a handful of fixed shapes so that a
// batch never has to be padded to the longest sequence of the
// whole corpus.
//
// A pair fits a bucket when
//   query.len()     <= encoder_size
//   reply.len() + 2 <= decoder_size   (room for _GO and _EOS)

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bucket {
    pub encoder_size: usize,
    pub decoder_size: usize,
}

impl Bucket {
    pub const fn new(encoder_size: usize, decoder_size: usize) -> Self {
        Self { encoder_size, decoder_size }
    }

    pub fn fits(&self, query_len: usize, reply_len: usize) -> bool {
        query_len <= self.encoder_size && reply_len + 2 <= self.decoder_size
    }

    /// Longest reply (without special tokens) this bucket can hold.
    pub fn max_reply_len(&self) -> usize {
        self.decoder_size.saturating_sub(2)
    }
}

/// Index of the first bucket that can hold the given lengths.
pub fn bucket_for(buckets: &[Bucket], query_len: usize, reply_len: usize) -> Option<usize> {
    buckets.iter().position(|b| b.fits(query_len, reply_len))
}

/// Buckets must be non-empty, strictly growing on both axes, and
/// leave room for at least one reply token.
pub fn validate_buckets(buckets: &[Bucket]) -> Result<(), String> {
    if buckets.is_empty() {
        return Err("at least one bucket is required".to_string());
    }
    for (i, b) in buckets.iter().enumerate() {
        if b.encoder_size == 0 || b.decoder_size < 3 {
            return Err(format!(
                "bucket {i} ({}, {}) is too small",
                b.encoder_size, b.decoder_size
            ));
        }
    }
    for pair in buckets.windows(2) {
        if pair[1].encoder_size < pair[0].encoder_size
            || pair[1].decoder_size < pair[0].decoder_size
        {
            return Err("buckets must be sorted by size".to_string());
        }
    }
    Ok(())
}
