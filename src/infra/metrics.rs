// ============================================================
// Layer 6 — Metrics Logger
// ============================================================
// Appends one CSV row per checkpoint so learning curves can be
// plotted after (or during) a run.
//
// Output file: checkpoints/metrics.csv
//
//   step,learning_rate,loss,perplexity,grad_norm,eval_loss,step_time
//   200,0.500000,5.118302,167.068,4.8211,5.3012,0.0412
//
// eval_loss is left empty when there is no validation data.

use anyhow::Result;
use std::{
    fs::{self, OpenOptions},
    io::Write,
    path::PathBuf,
};
use serde::{Deserialize, Serialize};

const HEADER: &str = "step,learning_rate,loss,perplexity,grad_norm,eval_loss,step_time";

/// Averages over the steps since the previous checkpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointMetrics {
    pub step:          usize,
    pub learning_rate: f64,
    pub loss:          f64,
    pub perplexity:    f64,
    pub grad_norm:     f64,
    pub eval_loss:     Option<f64>,
    /// Seconds per step
    pub step_time:     f64,
}

impl CheckpointMetrics {
    /// True when `loss` is worse than every one of the recent checkpoints.
    pub fn is_plateau(&self, previous_losses: &[f64]) -> bool {
        let recent = &previous_losses[previous_losses.len().saturating_sub(3)..];
        previous_losses.len() > 2
            && recent.iter().all(|&l| self.loss > l)
    }

    fn csv_row(&self) -> String {
        let eval = self.eval_loss.map(|l| format!("{l:.6}")).unwrap_or_default();
        format!(
            "{},{:.6},{:.6},{:.3},{:.4},{},{:.4}",
            self.step, self.learning_rate, self.loss, self.perplexity,
            self.grad_norm, eval, self.step_time,
        )
    }
}

pub struct MetricsLogger {
    csv_path: PathBuf,
}

impl MetricsLogger {
    /// Writes the CSV header if the file doesn't exist yet, so a
    /// resumed run keeps appending to the same log.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;

        let csv_path = dir.join("metrics.csv");
        if !csv_path.exists() {
            let mut f = fs::File::create(&csv_path)?;
            writeln!(f, "{HEADER}")?;
            tracing::debug!("Created metrics CSV: '{}'", csv_path.display());
        }

        Ok(Self { csv_path })
    }

    pub fn log(&self, m: &CheckpointMetrics) -> Result<()> {
        let mut f = OpenOptions::new().append(true).open(&self.csv_path)?;
        writeln!(f, "{}", m.csv_row())?;
        Ok(())
    }

    pub fn csv_path(&self) -> &PathBuf {
        &self.csv_path
    }
}
