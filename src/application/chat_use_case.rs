// ============================================================
// Layer 2 — Chat Use Case
// ============================================================
// Message in, reply out:
//   1. Clean the message the way training utterances were cleaned
//   2. Encode with the saved vocabulary
//   3. Generate reply ids with the trained model
//   4. Decode back to text

use anyhow::Result;
use burn::prelude::Backend;

use crate::data::preprocessor::Preprocessor;
use crate::domain::traits::Responder;
use crate::infra::{
    checkpoint::CheckpointManager,
    vocab_store::{VocabStore, Vocabulary},
};
use crate::ml::inferencer::{InferBackend, Inferencer};

pub struct ChatUseCase<B: Backend = InferBackend> {
    preprocessor: Preprocessor,
    vocab:        Vocabulary,
    inferencer:   Inferencer<B>,
}

impl ChatUseCase<InferBackend> {
    /// Load vocabulary, config and weights from `checkpoint_dir`.
    pub fn new(checkpoint_dir: &str) -> Result<Self> {
        let vocab      = VocabStore::new(checkpoint_dir).load()?;
        let ckpt       = CheckpointManager::new(checkpoint_dir)?;
        let inferencer = Inferencer::from_checkpoint(&ckpt, Default::default())?;
        Ok(Self::from_parts(vocab, inferencer))
    }
}

impl<B: Backend> ChatUseCase<B> {
    pub fn from_parts(vocab: Vocabulary, inferencer: Inferencer<B>) -> Self {
        Self { preprocessor: Preprocessor::new(), vocab, inferencer }
    }
}

impl<B: Backend> Responder for ChatUseCase<B> {
    /// A blank message gets an empty reply without running the model.
    fn respond(&self, message: &str) -> Result<String> {
        let message = self.preprocessor.clean(message);
        if message.is_empty() {
            return Ok(String::new());
        }

        let query = self.vocab.encode(&message)?;
        let reply = self.inferencer.reply_ids(&query)?;
        tracing::debug!("query ids {:?} → reply ids {:?}", query, reply);
        self.vocab.decode(&reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::bucket::Bucket;
    use crate::ml::model::Seq2SeqConfig;
    use burn::backend::NdArray;

    fn use_case(dir: &std::path::Path) -> ChatUseCase<NdArray> {
        let texts = vec!["hello there".to_string(), "how are you".to_string()];
        let vocab = VocabStore::new(dir).load_or_build(&texts, 32).unwrap();

        let device = Default::default();
        let model  = Seq2SeqConfig::new(32, 32, 6, 1, 6, 1).init(&device);
        let inferencer = Inferencer::new(model, vec![Bucket::new(5, 10)], device);
        ChatUseCase::from_parts(vocab, inferencer)
    }

    #[test]
    fn test_blank_message_gets_empty_reply() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(use_case(dir.path()).respond("   \t ").unwrap(), "");
    }

    #[test]
    fn test_reply_is_plain_text() {
        let dir   = tempfile::tempdir().unwrap();
        let reply = use_case(dir.path()).respond("Hello THERE, stranger").unwrap();
        assert!(!reply.contains("_EOS"));
        assert!(!reply.contains("_PAD"));
        assert!(!reply.contains("_GO"));
    }
}
