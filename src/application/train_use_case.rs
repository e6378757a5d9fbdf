// ============================================================
// Layer 2 — TrainUseCase
// ============================================================
// Orchestrates the full training pipeline in order:
//
//   Step 1: Load dialogue pairs       (Layer 4 - data)
//   Step 2: Clean the utterances      (Layer 4 - data)
//   Step 3: Build / load vocabulary   (Layer 6 - infra)
//   Step 4: Tokenise every pair       (Layer 6 - infra)
//   Step 5: Split train/validation    (Layer 4 - data)
//   Step 6: Assign pairs to buckets   (Layer 4 - data)
//   Step 7: Save config               (Layer 6 - infra)
//   Step 8: Run training loop         (Layer 5 - ml)
//
// Steps 1-6 live in `prepare`, which needs no tensor backend.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::data::{
    bucketing::BucketedCorpus,
    loader::DialogueLoader,
    preprocessor::Preprocessor,
    splitter::split_train_val,
};
use crate::domain::{
    bucket::{validate_buckets, Bucket},
    dialogue::TokenPair,
    traits::CorpusSource,
};
use crate::infra::{
    checkpoint::CheckpointManager,
    metrics::MetricsLogger,
    vocab_store::VocabStore,
};
use crate::ml::{
    model::Seq2SeqConfig,
    session::SessionConfig,
    trainer::{run_training, TrainSummary},
};

// ─── Training Configuration ──────────────────────────────────────────────────
// All hyperparameters for a training run. Saved next to the
// checkpoints so `chat` can rebuild the same architecture.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainConfig {
    pub corpus:                     String,
    pub checkpoint_dir:             String,
    pub input_vocab_size:           usize,
    pub target_vocab_size:          usize,
    pub enc_hidden_size:            usize,
    pub enc_num_layers:             usize,
    pub dec_hidden_size:            usize,
    pub dec_num_layers:             usize,
    pub use_lstm:                   bool,
    pub batch_size:                 usize,
    pub learning_rate:              f64,
    pub learning_rate_decay_factor: f64,
    pub max_gradient_norm:          f64,
    pub buckets:                    Vec<Bucket>,
    pub steps_per_checkpoint:       usize,
    pub max_steps:                  usize,
    /// Share of pairs used for training; the rest is validation
    pub train_fraction:             f64,
    pub seed:                       u64,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            corpus:                     "data/dialogues.txt".to_string(),
            checkpoint_dir:             "checkpoints".to_string(),
            input_vocab_size:           20000,
            target_vocab_size:          20000,
            enc_hidden_size:            256,
            enc_num_layers:             2,
            dec_hidden_size:            256,
            dec_num_layers:             2,
            use_lstm:                   true,
            batch_size:                 64,
            learning_rate:              1e-3,
            learning_rate_decay_factor: 0.99,
            max_gradient_norm:          5.0,
            buckets: vec![
                Bucket::new(5, 10),
                Bucket::new(10, 15),
                Bucket::new(20, 25),
                Bucket::new(40, 50),
            ],
            steps_per_checkpoint:       200,
            max_steps:                  20000,
            train_fraction:             0.95,
            seed:                       42,
        }
    }
}

impl TrainConfig {
    /// Read a JSON config; missing fields keep their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Cannot read config '{}'", path.display()))?;
        serde_json::from_str(&json)
            .with_context(|| format!("Invalid config '{}'", path.display()))
    }

    pub fn model_config(&self) -> Seq2SeqConfig {
        Seq2SeqConfig::new(
            self.input_vocab_size,
            self.target_vocab_size,
            self.enc_hidden_size,
            self.enc_num_layers,
            self.dec_hidden_size,
            self.dec_num_layers,
        )
        .with_use_lstm(self.use_lstm)
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig::new(self.learning_rate)
            .with_learning_rate_decay_factor(self.learning_rate_decay_factor)
            .with_max_gradient_norm(self.max_gradient_norm)
    }

    pub fn validate(&self) -> Result<()> {
        self.model_config().validate()?;
        validate_buckets(&self.buckets).map_err(anyhow::Error::msg)?;

        if self.batch_size == 0 {
            bail!("batch_size must be positive");
        }
        if self.steps_per_checkpoint == 0 || self.max_steps == 0 {
            bail!("steps_per_checkpoint and max_steps must be positive");
        }
        if !(self.learning_rate > 0.0) || !(self.max_gradient_norm > 0.0) {
            bail!("learning_rate and max_gradient_norm must be positive");
        }
        if !(0.0..=1.0).contains(&self.learning_rate_decay_factor) {
            bail!("learning_rate_decay_factor must be in [0, 1]");
        }
        if !(self.train_fraction > 0.0 && self.train_fraction <= 1.0) {
            bail!("train_fraction must be in (0, 1]");
        }
        Ok(())
    }

    /// Whether weights trained under `other` fit a model built from `self`.
    pub fn same_architecture(&self, other: &TrainConfig) -> bool {
        self.input_vocab_size  == other.input_vocab_size
            && self.target_vocab_size == other.target_vocab_size
            && self.enc_hidden_size   == other.enc_hidden_size
            && self.enc_num_layers    == other.enc_num_layers
            && self.dec_hidden_size   == other.dec_hidden_size
            && self.dec_num_layers    == other.dec_num_layers
            && self.use_lstm          == other.use_lstm
    }

    /// Source and target share one vocabulary, so it can be no larger
    /// than the smaller of the two embedding tables.
    pub fn shared_vocab_size(&self) -> usize {
        self.input_vocab_size.min(self.target_vocab_size)
    }
}

// ─── TrainUseCase ─────────────────────────────────────────────────────────────
pub struct TrainUseCase {
    config: TrainConfig,
}

impl TrainUseCase {
    pub fn new(config: TrainConfig) -> Self {
        Self { config }
    }

    /// Execute the full training pipeline end to end
    pub fn execute(&self) -> Result<TrainSummary> {
        let (train, val)            = self.prepare()?;
        let (ckpt_manager, metrics) = self.open_checkpoints()?;

        // ── Step 8: Run training loop (Layer 5) ───────────────────────────────
        run_training(&self.config, &train, &val, &ckpt_manager, &metrics)
    }

    /// Steps 1-6: everything up to the bucketed train / validation data.
    /// Touches no tensor backend.
    pub fn prepare(&self) -> Result<(BucketedCorpus, BucketedCorpus)> {
        let cfg = &self.config;
        cfg.validate()?;
        self.check_saved_architecture()?;

        // ── Step 1: Load dialogue pairs ───────────────────────────────────────
        tracing::info!("Loading dialogues from '{}'", cfg.corpus);
        let raw_pairs = DialogueLoader::new(&cfg.corpus).load_pairs()?;
        tracing::info!("Loaded {} raw pairs", raw_pairs.len());

        // ── Step 2: Clean / normalise text ────────────────────────────────────
        let preprocessor = Preprocessor::new();
        let pairs: Vec<_> = raw_pairs
            .into_iter()
            .map(|p| preprocessor.clean_pair(p))
            .filter(|p| p.is_usable())
            .collect();
        if pairs.is_empty() {
            bail!("No usable dialogue pairs found in '{}'", cfg.corpus);
        }

        // ── Step 3: Build / load vocabulary ───────────────────────────────────
        let texts: Vec<String> = pairs
            .iter()
            .flat_map(|p| [p.query.clone(), p.reply.clone()])
            .collect();
        let vocab = VocabStore::new(&cfg.checkpoint_dir)
            .load_or_build(&texts, cfg.shared_vocab_size())?;
        if vocab.size() > cfg.shared_vocab_size() {
            bail!(
                "Saved vocabulary has {} entries but the model only has room for {}",
                vocab.size(), cfg.shared_vocab_size()
            );
        }
        tracing::info!("Vocabulary size: {}", vocab.size());

        // ── Step 4: Tokenise ──────────────────────────────────────────────────
        let mut token_pairs = Vec::with_capacity(pairs.len());
        for pair in &pairs {
            let query = vocab.encode(&pair.query)?;
            let reply = vocab.encode(&pair.reply)?;
            if !query.is_empty() {
                token_pairs.push(TokenPair::new(query, reply));
            }
        }

        // ── Step 5: Train / validation split ─────────────────────────────────
        let (train_pairs, val_pairs) = split_train_val(token_pairs, cfg.train_fraction, cfg.seed);
        tracing::info!("Split: {} train, {} validation", train_pairs.len(), val_pairs.len());

        // ── Step 6: Bucketing ─────────────────────────────────────────────────
        let train = BucketedCorpus::from_pairs(&cfg.buckets, train_pairs);
        let val   = BucketedCorpus::from_pairs(&cfg.buckets, val_pairs);
        tracing::info!(
            "Bucket sizes {:?} ({} pairs too long for any bucket)",
            train.bucket_sizes(), train.dropped()
        );
        if train.total_len() == 0 {
            bail!("No training pair fits the configured buckets");
        }

        Ok((train, val))
    }

    /// Step 7: save the config for inference and open the metrics log.
    pub fn open_checkpoints(&self) -> Result<(CheckpointManager, MetricsLogger)> {
        let cfg          = &self.config;
        let ckpt_manager = CheckpointManager::new(&cfg.checkpoint_dir)?;
        ckpt_manager.save_config(cfg)?;
        let metrics = MetricsLogger::new(&cfg.checkpoint_dir)?;
        Ok((ckpt_manager, metrics))
    }

    /// Weights saved under a different architecture cannot be resumed.
    fn check_saved_architecture(&self) -> Result<()> {
        let ckpt_manager = CheckpointManager::new(&self.config.checkpoint_dir)?;
        if !ckpt_manager.has_checkpoint() {
            return Ok(());
        }

        let saved = ckpt_manager.load_config()?;
        if !saved.same_architecture(&self.config) {
            bail!(
                "'{}' holds a checkpoint for a different model \
                 (vocab {}/{}, enc {}x{}, dec {}x{}, lstm={}). \
                 Use a new checkpoint dir or the saved settings.",
                ckpt_manager.dir().display(),
                saved.input_vocab_size, saved.target_vocab_size,
                saved.enc_num_layers, saved.enc_hidden_size,
                saved.dec_num_layers, saved.dec_hidden_size,
                saved.use_lstm,
            );
        }
        Ok(())
    }
}
