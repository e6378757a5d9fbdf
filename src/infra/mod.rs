// ============================================================
// Layer 6 — Infrastructure Layer
// ============================================================
// Everything that touches the checkpoint directory:
//
//   checkpoint.rs   — model weights (Burn CompactRecorder),
//                     training counters and config as JSON
//
//   vocab_store.rs  — word-level vocabulary, built once from
//                     the corpus and shared by train and chat
//
//   metrics.rs      — per-checkpoint CSV log

/// Model checkpoint saving and loading
pub mod checkpoint;

/// Vocabulary building, saving, and loading
pub mod vocab_store;

/// Training metrics CSV logger
pub mod metrics;
