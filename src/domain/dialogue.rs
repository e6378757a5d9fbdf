// ============================================================
// Layer 3 — Dialogue Domain Types
// ============================================================
// A conversation corpus is reduced to (query, reply) pairs:
// the encoder reads the query, the decoder learns to produce
// the reply.

use serde::{Deserialize, Serialize};

/// One conversational exchange before tokenisation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DialoguePair {
    /// The utterance the model responds to
    pub query: String,

    /// The utterance the model should learn to produce
    pub reply: String,
}

impl DialoguePair {
    pub fn new(query: impl Into<String>, reply: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            reply: reply.into(),
        }
    }

    /// Both sides must carry at least one visible character.
    pub fn is_usable(&self) -> bool {
        !self.query.trim().is_empty() && !self.reply.trim().is_empty()
    }
}

/// A dialogue pair after tokenisation.
///
/// Neither side contains special tokens: `_GO` and `_EOS` are added
/// by the batcher when the decoder sequence is laid out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
    pub query: Vec<u32>,
    pub reply: Vec<u32>,
}

impl TokenPair {
    pub fn new(query: Vec<u32>, reply: Vec<u32>) -> Self {
        Self { query, reply }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_side_is_unusable() {
        assert!(DialoguePair::new("hi", "hello").is_usable());
        assert!(!DialoguePair::new("hi", "   ").is_usable());
        assert!(!DialoguePair::new("", "hello").is_usable());
    }
}
