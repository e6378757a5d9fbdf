// ============================================================
// Layer 4 — Corpus Loader
// ============================================================
// Reads a conversation corpus from a single file or from every
// .txt / .tsv file in a directory.
//
// Two line formats are understood, and may be mixed:
//
//   1. Tab-separated pairs, one per line:
//        how are you?<TAB>fine, thanks.
//
//   2. Dialogues, one utterance per line, separated by blank lines.
//      Every utterance is paired with the one that follows it:
//        hi                 → (hi, hello there)
//        hello there        → (hello there, how are you?)
//        how are you?
//
//        <blank line starts a new dialogue>

use anyhow::{Context, Result};
use std::{fs, path::{Path, PathBuf}};

use crate::domain::dialogue::DialoguePair;
use crate::domain::traits::CorpusSource;

pub struct DialogueLoader {
    path: PathBuf,
}

impl DialogueLoader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn corpus_files(&self) -> Result<Vec<PathBuf>> {
        if self.path.is_file() {
            return Ok(vec![self.path.clone()]);
        }

        if !self.path.exists() {
            anyhow::bail!("Corpus path '{}' does not exist", self.path.display());
        }

        let mut files = Vec::new();
        for entry in fs::read_dir(&self.path)
            .with_context(|| format!("Cannot read directory '{}'", self.path.display()))?
        {
            let path = entry?.path();
            let ext  = path.extension().and_then(|e| e.to_str());
            if matches!(ext, Some("txt") | Some("tsv")) {
                files.push(path);
            }
        }
        // read_dir order is platform dependent
        files.sort();
        Ok(files)
    }
}

impl CorpusSource for DialogueLoader {
    fn load_pairs(&self) -> Result<Vec<DialoguePair>> {
        let mut pairs = Vec::new();

        for file in self.corpus_files()? {
            match load_single_file(&file) {
                Ok(mut found) => {
                    tracing::debug!("Loaded {} pairs from '{}'", found.len(), file.display());
                    pairs.append(&mut found);
                }
                // One unreadable file should not sink the whole corpus
                Err(e) => tracing::warn!("Skipping '{}': {:#}", file.display(), e),
            }
        }

        tracing::info!("Loaded {} dialogue pairs", pairs.len());
        Ok(pairs)
    }
}

fn load_single_file(path: &Path) -> Result<Vec<DialoguePair>> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Cannot read '{}'", path.display()))?;
    Ok(parse_corpus(&text))
}

/// Parse corpus text in either supported format.
pub fn parse_corpus(text: &str) -> Vec<DialoguePair> {
    let mut pairs    = Vec::new();
    let mut previous: Option<&str> = None;

    for line in text.lines() {
        let line = line.trim_end_matches('\r');

        if line.trim().is_empty() {
            previous = None;
            continue;
        }

        if let Some((query, reply)) = line.split_once('\t') {
            pairs.push(DialoguePair::new(query.trim(), reply.trim()));
            previous = None;
            continue;
        }

        let utterance = line.trim();
        if let Some(prev) = previous {
            pairs.push(DialoguePair::new(prev, utterance));
        }
        previous = Some(utterance);
    }

    pairs.retain(DialoguePair::is_usable);
    pairs
}
