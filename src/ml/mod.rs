// ============================================================
// Layer 5 — ML / Model Layer (Burn)
// ============================================================
// All tensor code lives here. The other layers hand in plain
// `StepInput` feeds and get ids, losses and summaries back.
//
//   cell.rs       — LSTM / GRU cells, stacked with length masking
//   attention.rs  — Luong (multiplicative) attention
//   model.rs      — embeddings + encoder + attentive decoder,
//                   teacher-forced and greedy decoding
//   loss.rs       — masked sequence cross-entropy
//   clip.rs       — global-norm gradient clipping
//   session.rs    — the `step` entry point: Adam updates or
//                   forward-only prediction
//   trainer.rs    — bucketed step loop with checkpoints
//   inferencer.rs — checkpoint → reply ids
//
// Reference: Luong et al. (2015) Effective Approaches to
//            Attention-based Neural Machine Translation
//            Burn Book §3 (Building Blocks), §5 (Training)

/// Typed errors for feeds and configuration
pub mod error;

/// Recurrent cells and stacks
pub mod cell;

/// Luong attention
pub mod attention;

/// Sequence-to-sequence model with attention
pub mod model;

/// Masked sequence loss and perplexity
pub mod loss;

/// Gradient clipping by global norm
pub mod clip;

/// Training / prediction session
pub mod session;

/// Step-based training loop with checkpointing
pub mod trainer;

/// Inference engine — loads checkpoint and generates replies
pub mod inferencer;
