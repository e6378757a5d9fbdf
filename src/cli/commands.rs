// ============================================================
// Layer 1 — CLI Commands and Arguments
// ============================================================
// Defines the two subcommands: `train` and `chat`
// and all their configurable flags.
//
// Training flags are optional overrides: values come from
// `--config <json>` (or the defaults) unless given on the
// command line.

use anyhow::Result;
use clap::{Args, Subcommand};
use std::path::PathBuf;

use crate::application::train_use_case::TrainConfig;
use crate::domain::bucket::Bucket;

/// The two top-level subcommands available to the user
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Train the chatbot on a dialogue corpus
    Train(TrainArgs),

    /// Talk to a trained checkpoint
    Chat(ChatArgs),
}

/// All arguments for the `train` command.
#[derive(Args, Debug, Default)]
pub struct TrainArgs {
    /// Corpus file or directory of .txt / .tsv files
    #[arg(long)]
    pub corpus: Option<String>,

    /// Directory to save checkpoints, vocabulary and metrics
    #[arg(long)]
    pub checkpoint_dir: Option<String>,

    /// JSON file with a full or partial training config
    #[arg(long)]
    pub config: Option<PathBuf>,

    #[arg(long)]
    pub input_vocab_size: Option<usize>,

    #[arg(long)]
    pub target_vocab_size: Option<usize>,

    #[arg(long)]
    pub enc_hidden_size: Option<usize>,

    #[arg(long)]
    pub enc_num_layers: Option<usize>,

    #[arg(long)]
    pub dec_hidden_size: Option<usize>,

    #[arg(long)]
    pub dec_num_layers: Option<usize>,

    /// Use GRU cells instead of LSTM
    #[arg(long)]
    pub gru: bool,

    #[arg(long)]
    pub batch_size: Option<usize>,

    #[arg(long)]
    pub learning_rate: Option<f64>,

    /// Multiplier applied when the loss stops improving
    #[arg(long)]
    pub learning_rate_decay_factor: Option<f64>,

    /// Gradients are rescaled to this global norm
    #[arg(long)]
    pub max_gradient_norm: Option<f64>,

    /// Bucket shapes as `enc:dec` pairs, e.g. `5:10,10:15,20:25`
    #[arg(long, value_parser = parse_buckets)]
    pub buckets: Option<BucketList>,

    #[arg(long)]
    pub steps_per_checkpoint: Option<usize>,

    #[arg(long)]
    pub max_steps: Option<usize>,

    #[arg(long)]
    pub train_fraction: Option<f64>,

    #[arg(long)]
    pub seed: Option<u64>,
}

impl TrainArgs {
    /// Config file (or defaults) with command-line overrides applied.
    /// The application layer never sees clap types.
    pub fn into_config(self) -> Result<TrainConfig> {
        let mut cfg = match &self.config {
            Some(path) => TrainConfig::from_json_file(path)?,
            None       => TrainConfig::default(),
        };

        let TrainArgs {
            corpus, checkpoint_dir, config: _, input_vocab_size, target_vocab_size,
            enc_hidden_size, enc_num_layers, dec_hidden_size, dec_num_layers, gru,
            batch_size, learning_rate, learning_rate_decay_factor, max_gradient_norm,
            buckets, steps_per_checkpoint, max_steps, train_fraction, seed,
        } = self;

        fn set<T>(target: &mut T, value: Option<T>) {
            if let Some(v) = value {
                *target = v;
            }
        }
        set(&mut cfg.corpus,                     corpus);
        set(&mut cfg.checkpoint_dir,             checkpoint_dir);
        set(&mut cfg.input_vocab_size,           input_vocab_size);
        set(&mut cfg.target_vocab_size,          target_vocab_size);
        set(&mut cfg.enc_hidden_size,            enc_hidden_size);
        set(&mut cfg.enc_num_layers,             enc_num_layers);
        set(&mut cfg.dec_hidden_size,            dec_hidden_size);
        set(&mut cfg.dec_num_layers,             dec_num_layers);
        set(&mut cfg.batch_size,                 batch_size);
        set(&mut cfg.learning_rate,              learning_rate);
        set(&mut cfg.learning_rate_decay_factor, learning_rate_decay_factor);
        set(&mut cfg.max_gradient_norm,          max_gradient_norm);
        set(&mut cfg.buckets,                    buckets.map(|BucketList(b)| b));
        set(&mut cfg.steps_per_checkpoint,       steps_per_checkpoint);
        set(&mut cfg.max_steps,                  max_steps);
        set(&mut cfg.train_fraction,             train_fraction);
        set(&mut cfg.seed,                       seed);
        if gru {
            cfg.use_lstm = false;
        }
        Ok(cfg)
    }
}

/// A comma-separated `--buckets` value.
#[derive(Debug, Clone, PartialEq)]
pub struct BucketList(pub Vec<Bucket>);

/// Parse `5:10,10:15` into buckets.
fn parse_buckets(s: &str) -> Result<BucketList, String> {
    s.split(',')
        .map(|part| {
            let (enc, dec) = part
                .trim()
                .split_once(':')
                .ok_or_else(|| format!("expected enc:dec, got '{part}'"))?;
            let enc = enc.trim().parse().map_err(|e| format!("bad encoder size '{enc}': {e}"))?;
            let dec = dec.trim().parse().map_err(|e| format!("bad decoder size '{dec}': {e}"))?;
            Ok(Bucket::new(enc, dec))
        })
        .collect::<Result<_, String>>()
        .map(BucketList)
}

/// All arguments for the `chat` command
#[derive(Args, Debug)]
pub struct ChatArgs {
    /// Directory where checkpoints were saved during training
    #[arg(long, default_value = "checkpoints")]
    pub checkpoint_dir: String,

    /// Reply to a single message; otherwise read lines from stdin
    #[arg(long)]
    pub message: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::Cli;
    use clap::Parser;

    #[test]
    fn test_parse_buckets() {
        assert_eq!(
            parse_buckets("5:10, 10:15").unwrap(),
            BucketList(vec![Bucket::new(5, 10), Bucket::new(10, 15)])
        );
        assert!(parse_buckets("5-10").is_err());
        assert!(parse_buckets("5:x").is_err());
    }

    #[test]
    fn test_overrides_replace_defaults() {
        let cli = Cli::try_parse_from([
            "chat-seq2seq", "train",
            "--corpus", "talk.txt",
            "--batch-size", "16",
            "--buckets", "3:6",
            "--gru",
        ])
        .unwrap();

        let Commands::Train(args) = cli.command else { panic!("expected train") };
        let cfg = args.into_config().unwrap();
        assert_eq!(cfg.corpus, "talk.txt");
        assert_eq!(cfg.batch_size, 16);
        assert_eq!(cfg.buckets, vec![Bucket::new(3, 6)]);
        assert!(!cfg.use_lstm);
        assert_eq!(cfg.max_steps, TrainConfig::default().max_steps);
    }

    #[test]
    fn test_flags_override_config_file() {
        let dir  = tempfile::tempdir().unwrap();
        let path = dir.path().join("cfg.json");
        std::fs::write(&path, r#"{ "batch_size": 8, "seed": 7 }"#).unwrap();

        let args = TrainArgs { config: Some(path), seed: Some(9), ..TrainArgs::default() };
        let cfg  = args.into_config().unwrap();
        assert_eq!(cfg.batch_size, 8);
        assert_eq!(cfg.seed, 9);
    }

    #[test]
    fn test_chat_message_is_optional() {
        let cli = Cli::try_parse_from(["chat-seq2seq", "chat"]).unwrap();
        let Commands::Chat(args) = cli.command else { panic!("expected chat") };
        assert_eq!(args.checkpoint_dir, "checkpoints");
        assert!(args.message.is_none());
    }
}
