// ============================================================
// Layer 6 — Vocabulary Store
// ============================================================
// Builds a word-level vocabulary from the training corpus and
// persists it as a HuggingFace tokenizer file (vocab.json), so
// `chat` tokenises exactly the way `train` did.
//
// The four special tokens always take ids 0..3 (see
// domain::vocab); corpus words follow by descending frequency,
// ties broken alphabetically so rebuilding is deterministic.

use anyhow::{Context, Result};
use std::{collections::HashMap, path::PathBuf};
use tokenizers::{
    normalizers::Lowercase,
    pre_tokenizers::whitespace::Whitespace,
    Normalizer, OffsetReferential, OffsetType, PreTokenizedString, PreTokenizer, Tokenizer,
};

use crate::domain::vocab::{SPECIAL_TOKENS, UNK};

/// A loaded tokenizer plus the helpers the pipeline needs.
pub struct Vocabulary {
    tokenizer: Tokenizer,
}

impl Vocabulary {
    pub fn encode(&self, text: &str) -> Result<Vec<u32>> {
        let encoding = self
            .tokenizer
            .encode(text, false)
            .map_err(|e| anyhow::anyhow!("Tokenisation error: {e}"))?;
        Ok(encoding.get_ids().to_vec())
    }

    /// Special tokens are skipped.
    pub fn decode(&self, ids: &[u32]) -> Result<String> {
        self.tokenizer
            .decode(ids, true)
            .map_err(|e| anyhow::anyhow!("Decode error: {e}"))
    }

    pub fn size(&self) -> usize {
        self.tokenizer.get_vocab_size(true)
    }
}

pub struct VocabStore {
    dir: PathBuf,
}

impl VocabStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path(&self) -> PathBuf {
        self.dir.join("vocab.json")
    }

    /// Load the saved vocabulary, or build one from `texts`.
    pub fn load_or_build(&self, texts: &[String], vocab_size: usize) -> Result<Vocabulary> {
        if self.path().exists() {
            tracing::info!("Loading existing vocabulary from disk");
            self.load()
        } else {
            tracing::info!("Building new vocabulary (vocab_size={})", vocab_size);
            self.build_and_save(texts, vocab_size)
        }
    }

    pub fn load(&self) -> Result<Vocabulary> {
        let path = self.path();
        let tokenizer = Tokenizer::from_file(&path)
            .map_err(|e| anyhow::anyhow!("Cannot load vocabulary from '{}': {}", path.display(), e))?;
        Ok(Vocabulary { tokenizer })
    }

    fn build_and_save(&self, texts: &[String], vocab_size: usize) -> Result<Vocabulary> {
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("Cannot create '{}'", self.dir.display()))?;

        // ── Step 1: Count words the way the pre-tokenizer splits them ────────
        let mut freq: HashMap<String, usize> = HashMap::new();
        for text in texts {
            for word in split_words(text)? {
                *freq.entry(word).or_insert(0) += 1;
            }
        }

        let mut words: Vec<(String, usize)> = freq
            .into_iter()
            .filter(|(w, _)| !SPECIAL_TOKENS.contains(&w.as_str()))
            .collect();
        words.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        words.truncate(vocab_size.saturating_sub(SPECIAL_TOKENS.len()));

        // ── Step 2: Special tokens first, then words ──────────────────────────
        let mut vocab = serde_json::Map::new();
        for (id, token) in SPECIAL_TOKENS.iter().enumerate() {
            vocab.insert(token.to_string(), serde_json::json!(id));
        }
        for (offset, (word, _)) in words.iter().enumerate() {
            vocab.insert(word.clone(), serde_json::json!(SPECIAL_TOKENS.len() + offset));
        }

        let added_tokens: Vec<serde_json::Value> = SPECIAL_TOKENS
            .iter()
            .enumerate()
            .map(|(id, token)| serde_json::json!({
                "id": id, "content": token, "single_word": false, "lstrip": false,
                "rstrip": false, "normalized": false, "special": true
            }))
            .collect();

        // ── Step 3: HuggingFace tokenizer JSON ────────────────────────────────
        let tokenizer_json = serde_json::json!({
            "version": "1.0",
            "truncation": null,
            "padding": null,
            "added_tokens": added_tokens,
            "normalizer": { "type": "Lowercase" },
            "pre_tokenizer": { "type": "Whitespace" },
            "post_processor": null,
            "decoder": null,
            "model": {
                "type": "WordLevel",
                "vocab": vocab,
                "unk_token": UNK
            }
        });

        let path = self.path();
        std::fs::write(&path, serde_json::to_string_pretty(&tokenizer_json)?)
            .with_context(|| format!("Cannot write '{}'", path.display()))?;

        tracing::info!(
            "Vocabulary built with {} entries, saved to '{}'",
            words.len() + SPECIAL_TOKENS.len(),
            path.display()
        );

        self.load()
    }
}

/// Words as the saved tokenizer will see them: `Lowercase`
/// normalizer, then the `Whitespace` pre-tokenizer.
pub fn split_words(text: &str) -> Result<Vec<String>> {
    let mut pretokenized = PreTokenizedString::from(text);
    pretokenized
        .normalize(|n| Lowercase.normalize(n))
        .map_err(|e| anyhow::anyhow!("Normalisation error: {e}"))?;
    Whitespace::default()
        .pre_tokenize(&mut pretokenized)
        .map_err(|e| anyhow::anyhow!("Pre-tokenisation error: {e}"))?;

    Ok(pretokenized
        .get_splits(OffsetReferential::Original, OffsetType::Byte)
        .into_iter()
        .map(|(word, _, _)| word.to_string())
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::vocab::{EOS_ID, UNK_ID};

    #[test]
    fn test_split_words_separates_punctuation() {
        assert_eq!(
            split_words("Hi, how're you?!").unwrap(),
            vec!["hi", ",", "how", "'", "re", "you", "?!"]
        );
        assert!(split_words("   ").unwrap().is_empty());
    }

    #[test]
    fn test_words_with_combining_marks_stay_whole() {
        let dir   = tempfile::tempdir().unwrap();
        let store = VocabStore::new(dir.path());
        let texts = vec!["cafe\u{301} cafe\u{301} ok".to_string()];

        assert_eq!(split_words(&texts[0]).unwrap(), vec!["cafe\u{301}", "cafe\u{301}", "ok"]);

        let vocab = store.load_or_build(&texts, 50).unwrap();
        // most frequent word → first id after the specials
        assert_eq!(vocab.encode("cafe\u{301}").unwrap(), vec![4]);
        assert_eq!(vocab.encode("ok").unwrap(), vec![5]);
    }

    #[test]
    fn test_build_assigns_special_ids_first() {
        let dir   = tempfile::tempdir().unwrap();
        let store = VocabStore::new(dir.path());
        let texts = vec!["hello world".to_string(), "hello there".to_string()];

        let vocab = store.load_or_build(&texts, 100).unwrap();
        assert_eq!(vocab.size(), 4 + 3);

        // "hello" is the most frequent word → first id after specials
        assert_eq!(vocab.encode("hello").unwrap(), vec![4]);
        assert_eq!(vocab.encode("HELLO unknownword").unwrap(), vec![4, UNK_ID]);
    }

    #[test]
    fn test_vocab_size_is_capped() {
        let dir   = tempfile::tempdir().unwrap();
        let store = VocabStore::new(dir.path());
        let texts = vec!["a a a b b c d e".to_string()];

        let vocab = store.load_or_build(&texts, 6).unwrap();
        assert_eq!(vocab.size(), 6);
        assert_eq!(vocab.encode("c").unwrap(), vec![UNK_ID]);
    }

    #[test]
    fn test_decode_skips_special_tokens() {
        let dir   = tempfile::tempdir().unwrap();
        let store = VocabStore::new(dir.path());
        let vocab = store.load_or_build(&["good morning".to_string()], 50).unwrap();

        let mut ids = vocab.encode("good morning").unwrap();
        ids.push(EOS_ID);
        assert_eq!(vocab.decode(&ids).unwrap(), "good morning");
    }

    #[test]
    fn test_saved_vocabulary_is_reused() {
        let dir   = tempfile::tempdir().unwrap();
        let store = VocabStore::new(dir.path());
        let first = store.load_or_build(&["alpha beta".to_string()], 50).unwrap();
        // a different corpus does not rebuild an existing vocabulary
        let again = store.load_or_build(&["gamma".to_string()], 50).unwrap();
        assert_eq!(first.encode("beta").unwrap(), again.encode("beta").unwrap());
        assert_eq!(again.encode("gamma").unwrap(), vec![UNK_ID]);
    }
}
