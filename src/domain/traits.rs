// ============================================================
// Layer 3 — Core Traits (Abstractions)
// ============================================================
// The application layer talks to these traits, not to the
// concrete loaders or the model.
//
//   - DialogueLoader implements CorpusSource
//   - ChatUseCase    implements Responder

use anyhow::Result;
use crate::domain::dialogue::DialoguePair;

// ─── CorpusSource ─────────────────────────────────────────────────────────────
/// Anything that can produce dialogue pairs for training.
pub trait CorpusSource {
    fn load_pairs(&self) -> Result<Vec<DialoguePair>>;
}

// ─── Responder ────────────────────────────────────────────────────────────────
/// Anything that can reply to a user utterance.
pub trait Responder {
    fn respond(&self, message: &str) -> Result<String>;
}
