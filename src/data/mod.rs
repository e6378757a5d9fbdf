// ============================================================
// Layer 4 — Data Pipeline
// ============================================================
// From a raw conversation corpus to padded step feeds:
//
//   corpus .txt / .tsv
//       │
//       ▼
//   DialogueLoader    → reads files, pairs up utterances
//       │
//       ▼
//   Preprocessor      → cleans each utterance
//       │
//       ▼
//   Tokenizer         → converts words to token ids (infra layer)
//       │
//       ▼
//   BucketedCorpus    → groups pairs by (query, reply) length class
//       │
//       ▼
//   BucketSampler     → picks a bucket, then a random batch
//       │
//       ▼
//   pad_batch         → StepInput (GO / EOS / PAD laid out)
//       │
//       ▼
//   Seq2SeqBatcher    → Burn tensors for the model

/// Reads dialogue pairs from corpus files
pub mod loader;

/// Cleans and normalises raw utterances
pub mod preprocessor;

/// Implements Burn's Dataset trait for one bucket of pairs
pub mod dataset;

/// Assigns pairs to buckets and samples training batches
pub mod bucketing;

/// Pads pairs into step feeds and builds tensor batches
pub mod batcher;

/// Shuffles and splits data into train/validation sets
pub mod splitter;
