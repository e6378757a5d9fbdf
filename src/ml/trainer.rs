// ============================================================
// Layer 5 — Training Loop
// ============================================================
// Step-based training over bucketed data:
//
//   loop until max_steps:
//     pick a bucket (weighted by its share of the corpus)
//     sample a batch from it, pad to the bucket shape
//     session.train_step  → clipped Adam update
//
//   every steps_per_checkpoint steps:
//     log averaged loss / perplexity / step time
//     decay the learning rate if the loss stopped improving
//     evaluate each non-empty validation bucket
//     save weights, Adam state and counters, append a metrics row
//
// The CLI trains on Autodiff<Wgpu>; `train_loop` is generic so
// tests can run it on Autodiff<NdArray>.

use anyhow::{bail, Result};
use burn::{optim::Optimizer, tensor::backend::AutodiffBackend};
use std::time::Instant;

use crate::application::train_use_case::TrainConfig;
use crate::data::{batcher::pad_batch, bucketing::{BucketSampler, BucketedCorpus}};
use crate::infra::{
    checkpoint::{CheckpointManager, TrainState},
    metrics::{CheckpointMetrics, MetricsLogger},
};
use crate::ml::loss::perplexity;
use crate::ml::model::ChatSeq2SeqModel;
use crate::ml::session::{adam_session_from_model, Seq2SeqSession};

type MyBackend = burn::backend::Autodiff<burn::backend::Wgpu>;

/// Checkpoint losses the plateau check compares against.
const PLATEAU_WINDOW: usize = 3;

/// Where a run ended up.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainSummary {
    pub global_step:   usize,
    pub learning_rate: f64,
    /// Average training loss of the last checkpoint window
    pub last_loss:     Option<f64>,
    pub checkpoints:   usize,
}

pub fn run_training(
    cfg:          &TrainConfig,
    train:        &BucketedCorpus,
    val:          &BucketedCorpus,
    ckpt_manager: &CheckpointManager,
    metrics:      &MetricsLogger,
) -> Result<TrainSummary> {
    let device = burn::backend::wgpu::WgpuDevice::default();
    tracing::info!("Using WGPU device: {:?}", device);
    train_loop::<MyBackend>(cfg, train, val, ckpt_manager, metrics, &device)
}

/// Running sums between two checkpoints.
#[derive(Default)]
struct Window {
    steps:     usize,
    loss:      f64,
    grad_norm: f64,
    seconds:   f64,
}

impl Window {
    fn mean(&self, sum: f64) -> f64 {
        sum / self.steps.max(1) as f64
    }
}

pub fn train_loop<B: AutodiffBackend>(
    cfg:          &TrainConfig,
    train:        &BucketedCorpus,
    val:          &BucketedCorpus,
    ckpt_manager: &CheckpointManager,
    metrics:      &MetricsLogger,
    device:       &B::Device,
) -> Result<TrainSummary> {
    if train.total_len() == 0 {
        bail!("Training corpus is empty");
    }

    // ── Build or restore the model ───────────────────────────────────────────
    let model_cfg = cfg.model_config();
    model_cfg.validate()?;
    let mut model = model_cfg.init::<B>(device);

    let resumed = if ckpt_manager.has_checkpoint() {
        model = ckpt_manager.load_model(model, device)?;
        Some(ckpt_manager.load_state()?)
    } else {
        None
    };

    let mut session         = adam_session_from_model(model, &cfg.session_config(), device)?;
    let mut previous_losses = Vec::new();
    if let Some(state) = resumed {
        session.resume(state.global_step, state.learning_rate);
        if let Some(record) = ckpt_manager.load_optimizer::<B, _>(device)? {
            session = session.with_optimizer_record(record);
        }
        previous_losses = state.recent_losses;
        tracing::info!(
            "Resumed at step {} (lr={:.6})", state.global_step, state.learning_rate
        );
    }
    tracing::info!(
        "Model ready: enc {}x{}, dec {}x{}, {}",
        cfg.enc_num_layers, cfg.enc_hidden_size,
        cfg.dec_num_layers, cfg.dec_hidden_size,
        if cfg.use_lstm { "LSTM" } else { "GRU" },
    );

    // Different seed per resume point so a restarted run doesn't
    // replay the same batches.
    let mut sampler = BucketSampler::new(train, cfg.seed.wrapping_add(session.global_step() as u64));
    let mut window      = Window::default();
    let mut checkpoints = 0usize;
    let mut last_loss   = None;

    // ── Step loop ────────────────────────────────────────────────────────────
    while session.global_step() < cfg.max_steps {
        let Some((bucket_id, pairs)) = sampler.sample_batch(train, cfg.batch_size) else {
            bail!("Could not sample a training batch");
        };
        let input = pad_batch(&pairs, cfg.buckets[bucket_id]);

        let start  = Instant::now();
        let update = session.train_step(&input)?;

        window.steps     += 1;
        window.loss      += update.loss;
        window.grad_norm += update.gradient_norm;
        window.seconds   += start.elapsed().as_secs_f64();

        tracing::debug!(
            "step {} bucket {} loss={:.4} grad_norm={:.4}",
            session.global_step(), bucket_id, update.loss, update.gradient_norm
        );

        let step = session.global_step();
        if step % cfg.steps_per_checkpoint != 0 && step < cfg.max_steps {
            continue;
        }

        // ── Checkpoint ───────────────────────────────────────────────────────
        let loss = window.mean(window.loss);
        let row  = CheckpointMetrics {
            step,
            learning_rate: session.learning_rate(),
            loss,
            perplexity:    perplexity(loss),
            grad_norm:     window.mean(window.grad_norm),
            eval_loss:     None,
            step_time:     window.mean(window.seconds),
        };
        tracing::info!(
            "global step {} learning rate {:.6} step-time {:.2} perplexity {:.2}",
            step, row.learning_rate, row.step_time, row.perplexity
        );

        if row.is_plateau(&previous_losses) {
            session.decay_learning_rate();
        }
        previous_losses.push(loss);
        let excess = previous_losses.len().saturating_sub(PLATEAU_WINDOW);
        previous_losses.drain(..excess);

        let eval_loss = evaluate(&session, cfg, val)?;
        ckpt_manager.save_model(session.model(), step)?;
        ckpt_manager.save_optimizer::<B, _>(session.optimizer_record(), step)?;
        ckpt_manager.save_state(&TrainState {
            global_step:   step,
            learning_rate: session.learning_rate(),
            recent_losses: previous_losses.clone(),
        })?;
        metrics.log(&CheckpointMetrics { eval_loss, ..row })?;

        checkpoints += 1;
        last_loss    = Some(loss);
        window       = Window::default();
    }

    tracing::info!("Training complete at step {}", session.global_step());
    Ok(TrainSummary {
        global_step:   session.global_step(),
        learning_rate: session.learning_rate(),
        last_loss,
        checkpoints,
    })
}

/// Loss on the first batch of every non-empty validation bucket,
/// averaged over buckets. `None` when there is no validation data.
fn evaluate<B, O>(
    session: &Seq2SeqSession<B, O>,
    cfg:     &TrainConfig,
    val:     &BucketedCorpus,
) -> Result<Option<f64>>
where
    B: AutodiffBackend,
    O: Optimizer<ChatSeq2SeqModel<B>, B>,
{
    let mut losses = Vec::new();

    for (bucket_id, dataset) in val.datasets().iter().enumerate() {
        if dataset.pairs().is_empty() {
            tracing::info!("  eval: empty bucket {}", bucket_id);
            continue;
        }
        let n     = dataset.pairs().len().min(cfg.batch_size);
        let input = pad_batch(&dataset.pairs()[..n], cfg.buckets[bucket_id]);
        let loss  = session.eval_loss(&input)?;
        tracing::info!("  eval: bucket {} perplexity {:.2}", bucket_id, perplexity(loss));
        losses.push(loss);
    }

    if losses.is_empty() {
        Ok(None)
    } else {
        Ok(Some(losses.iter().sum::<f64>() / losses.len() as f64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{bucket::Bucket, dialogue::TokenPair};
    use burn::backend::{Autodiff, NdArray};

    type TestBackend = Autodiff<NdArray>;

    fn tiny_config(dir: &std::path::Path) -> TrainConfig {
        TrainConfig {
            checkpoint_dir:       dir.display().to_string(),
            input_vocab_size:     16,
            target_vocab_size:    16,
            enc_hidden_size:      8,
            enc_num_layers:       1,
            dec_hidden_size:      8,
            dec_num_layers:       2,
            batch_size:           2,
            learning_rate:        0.01,
            buckets:              vec![Bucket::new(3, 5), Bucket::new(6, 8)],
            steps_per_checkpoint: 2,
            max_steps:            4,
            ..TrainConfig::default()
        }
    }

    fn corpus(buckets: &[Bucket]) -> BucketedCorpus {
        BucketedCorpus::from_pairs(
            buckets,
            vec![
                TokenPair::new(vec![4, 5], vec![6, 7]),
                TokenPair::new(vec![8, 9, 10, 11], vec![12, 13, 14]),
                TokenPair::new(vec![15], vec![4]),
            ],
        )
    }

    #[test]
    fn test_checkpoints_and_metrics_are_written() {
        let dir     = tempfile::tempdir().unwrap();
        let cfg     = tiny_config(dir.path());
        let ckpt    = CheckpointManager::new(dir.path()).unwrap();
        let metrics = MetricsLogger::new(dir.path()).unwrap();
        let train   = corpus(&cfg.buckets);
        let val     = corpus(&cfg.buckets);

        let summary = train_loop::<TestBackend>(&cfg, &train, &val, &ckpt, &metrics, &Default::default()).unwrap();

        assert_eq!(summary.global_step, 4);
        assert_eq!(summary.checkpoints, 2);
        assert!(summary.last_loss.unwrap().is_finite());
        assert_eq!(ckpt.load_state().unwrap().global_step, 4);

        let csv = std::fs::read_to_string(metrics.csv_path()).unwrap();
        let rows: Vec<&str> = csv.lines().skip(1).collect();
        assert_eq!(rows.len(), 2);
        assert!(rows[0].starts_with("2,"));
        assert!(!rows[0].contains(",,"), "eval loss should be present: {}", rows[0]);
    }

    #[test]
    fn test_training_resumes_from_saved_state() {
        let dir     = tempfile::tempdir().unwrap();
        let mut cfg = tiny_config(dir.path());
        let ckpt    = CheckpointManager::new(dir.path()).unwrap();
        let metrics = MetricsLogger::new(dir.path()).unwrap();
        let train   = corpus(&cfg.buckets);
        let val     = BucketedCorpus::from_pairs(&cfg.buckets, Vec::new());

        train_loop::<TestBackend>(&cfg, &train, &val, &ckpt, &metrics, &Default::default()).unwrap();

        cfg.max_steps = 6;
        let summary = train_loop::<TestBackend>(&cfg, &train, &val, &ckpt, &metrics, &Default::default()).unwrap();
        assert_eq!(summary.global_step, 6);
        assert_eq!(summary.checkpoints, 1);

        let csv = std::fs::read_to_string(metrics.csv_path()).unwrap();
        assert_eq!(csv.lines().count(), 4);
    }

    #[test]
    fn test_resume_restores_optimizer_and_recent_losses() {
        let dir     = tempfile::tempdir().unwrap();
        let mut cfg = tiny_config(dir.path());
        let ckpt    = CheckpointManager::new(dir.path()).unwrap();
        let metrics = MetricsLogger::new(dir.path()).unwrap();
        let train   = corpus(&cfg.buckets);
        let val     = BucketedCorpus::from_pairs(&cfg.buckets, Vec::new());

        train_loop::<TestBackend>(&cfg, &train, &val, &ckpt, &metrics, &Default::default()).unwrap();
        assert!(dir.path().join("optim_step_4.mpk.gz").exists());
        let state = ckpt.load_state().unwrap();
        assert_eq!(state.recent_losses.len(), 2);

        // any positive loss beats three zero losses, so the first
        // checkpoint after the restart must decay the rate
        ckpt.save_state(&TrainState { recent_losses: vec![0.0; 3], ..state.clone() }).unwrap();
        cfg.max_steps = 6;
        let summary = train_loop::<TestBackend>(&cfg, &train, &val, &ckpt, &metrics, &Default::default()).unwrap();

        let decayed = state.learning_rate * cfg.learning_rate_decay_factor;
        assert!((summary.learning_rate - decayed).abs() < 1e-12);
        assert!(dir.path().join("optim_step_6.mpk.gz").exists());
        assert_eq!(ckpt.load_state().unwrap().recent_losses.len(), PLATEAU_WINDOW);
    }

    #[test]
    fn test_finished_run_does_nothing() {
        let dir     = tempfile::tempdir().unwrap();
        let cfg     = tiny_config(dir.path());
        let ckpt    = CheckpointManager::new(dir.path()).unwrap();
        let metrics = MetricsLogger::new(dir.path()).unwrap();
        let train   = corpus(&cfg.buckets);
        let val     = BucketedCorpus::from_pairs(&cfg.buckets, Vec::new());

        train_loop::<TestBackend>(&cfg, &train, &val, &ckpt, &metrics, &Default::default()).unwrap();
        let again = train_loop::<TestBackend>(&cfg, &train, &val, &ckpt, &metrics, &Default::default()).unwrap();
        assert_eq!(again.global_step, 4);
        assert_eq!(again.checkpoints, 0);
        assert_eq!(again.last_loss, None);
    }

    #[test]
    fn test_empty_corpus_is_an_error() {
        let dir     = tempfile::tempdir().unwrap();
        let cfg     = tiny_config(dir.path());
        let ckpt    = CheckpointManager::new(dir.path()).unwrap();
        let metrics = MetricsLogger::new(dir.path()).unwrap();
        let empty   = BucketedCorpus::from_pairs(&cfg.buckets, Vec::new());

        assert!(train_loop::<TestBackend>(&cfg, &empty, &empty, &ckpt, &metrics, &Default::default()).is_err());
    }
}
