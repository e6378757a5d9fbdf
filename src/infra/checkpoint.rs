// ============================================================
// Layer 6 — Checkpoint Manager
// ============================================================
// Saves and restores model weights using Burn's CompactRecorder.
//
//   checkpoints/
//     model_step_200.mpk.gz   ← weights after global step 200
//     model_step_400.mpk.gz
//     optim_step_400.mpk.gz   ← Adam moments, full precision
//     latest_step.json        ← number of the newest weights file
//     train_state.json        ← global step, learning rate, recent losses
//     train_config.json       ← architecture and hyper-parameters
//     vocab.json              ← written by VocabStore
//
// The config is needed to rebuild the exact architecture before
// the weights can be loaded back into it.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{fs, path::PathBuf};
use burn::{
    prelude::*,
    record::{CompactRecorder, FullPrecisionSettings, NamedMpkGzFileRecorder, Record, Recorder},
};

use crate::application::train_use_case::TrainConfig;
use crate::ml::model::ChatSeq2SeqModel;

/// Optimiser moments are small enough that half precision rounds
/// the second moment to zero.
type OptimRecorder = NamedMpkGzFileRecorder<FullPrecisionSettings>;

/// Counters that must survive a restart for training to resume.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainState {
    pub global_step:   usize,
    pub learning_rate: f64,
    /// Window losses of the last few checkpoints, oldest first
    #[serde(default)]
    pub recent_losses: Vec<f64>,
}

pub struct CheckpointManager {
    dir: PathBuf,
}

impl CheckpointManager {
    /// Creates the directory if it doesn't already exist.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .with_context(|| format!("Cannot create checkpoint dir '{}'", dir.display()))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &PathBuf {
        &self.dir
    }

    /// Save weights for `step` and point `latest_step.json` at them.
    pub fn save_model<B: Backend>(&self, model: &ChatSeq2SeqModel<B>, step: usize) -> Result<()> {
        // the recorder adds the extension
        let path = self.dir.join(format!("model_step_{step}"));

        CompactRecorder::new()
            .record(model.clone().into_record(), path.clone())
            .with_context(|| format!("Failed to save checkpoint to '{}'", path.display()))?;

        fs::write(self.dir.join("latest_step.json"), serde_json::to_string(&step)?)
            .with_context(|| "Failed to write latest_step.json")?;

        tracing::debug!("Saved checkpoint: step {}", step);
        Ok(())
    }

    /// Load the newest weights into `model`, which must have the
    /// architecture the checkpoint was saved with.
    pub fn load_model<B: Backend>(
        &self,
        model:  ChatSeq2SeqModel<B>,
        device: &B::Device,
    ) -> Result<ChatSeq2SeqModel<B>> {
        let step = self.latest_step()?;
        let path = self.dir.join(format!("model_step_{step}"));

        tracing::info!("Loading checkpoint from step {}", step);

        let record = CompactRecorder::new()
            .load(path.clone(), device)
            .with_context(|| {
                format!("Cannot load checkpoint '{}'. Have you trained the model first?",
                    path.display())
            })?;

        Ok(model.load_record(record))
    }

    /// Save an optimiser record next to the weights of `step`.
    pub fn save_optimizer<B: Backend, R: Record<B>>(&self, record: R, step: usize) -> Result<()> {
        let path = self.dir.join(format!("optim_step_{step}"));
        <OptimRecorder as Recorder<B>>::record(&OptimRecorder::new(), record, path.clone())
            .with_context(|| format!("Failed to save optimiser state to '{}'", path.display()))?;
        Ok(())
    }

    /// Optimiser record saved with the newest weights, or `None` if that
    /// checkpoint has none.
    pub fn load_optimizer<B: Backend, R: Record<B>>(&self, device: &B::Device) -> Result<Option<R>> {
        let step = self.latest_step()?;
        let path = self.dir.join(format!("optim_step_{step}"));
        if !path.with_extension("mpk.gz").exists() {
            tracing::warn!("No optimiser state for step {}; Adam restarts from zero", step);
            return Ok(None);
        }

        let record = <OptimRecorder as Recorder<B>>::load(&OptimRecorder::new(), path.clone(), device)
            .with_context(|| format!("Cannot load optimiser state '{}'", path.display()))?;
        Ok(Some(record))
    }

    pub fn has_checkpoint(&self) -> bool {
        self.dir.join("latest_step.json").exists()
    }

    pub fn save_config(&self, cfg: &TrainConfig) -> Result<()> {
        let path = self.dir.join("train_config.json");
        fs::write(&path, serde_json::to_string_pretty(cfg)?)
            .with_context(|| format!("Cannot write config to '{}'", path.display()))?;
        tracing::debug!("Saved training config to '{}'", path.display());
        Ok(())
    }

    pub fn load_config(&self) -> Result<TrainConfig> {
        let path = self.dir.join("train_config.json");
        let json = fs::read_to_string(&path)
            .with_context(|| {
                format!(
                    "Cannot read config from '{}'. \
                     Make sure you have run 'train' before 'chat'.",
                    path.display()
                )
            })?;
        Ok(serde_json::from_str(&json)?)
    }

    pub fn save_state(&self, state: &TrainState) -> Result<()> {
        let path = self.dir.join("train_state.json");
        fs::write(&path, serde_json::to_string_pretty(state)?)
            .with_context(|| format!("Cannot write '{}'", path.display()))?;
        Ok(())
    }

    pub fn load_state(&self) -> Result<TrainState> {
        let path = self.dir.join("train_state.json");
        let json = fs::read_to_string(&path)
            .with_context(|| format!("Cannot read '{}'", path.display()))?;
        Ok(serde_json::from_str(&json)?)
    }

    fn latest_step(&self) -> Result<usize> {
        let s = fs::read_to_string(self.dir.join("latest_step.json"))
            .with_context(|| "Cannot find 'latest_step.json'. Have you run 'train' first?")?;
        Ok(serde_json::from_str::<usize>(&s)?)
    }
}
