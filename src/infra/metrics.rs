// ============================================================
// Layer 6 — Metrics Logs
// ============================================================
// Two append-only records of how a model is doing:
//
//   MetricsLogger   one CSV row per processed epoch / split pass
//                   epoch,mode,batches,mean_loss,accuracy
//                   0,train,12,3.412300,not tracked
//                   -,test,4,2.981100,0.412500
//
//   AccuracyLog     the hyperparameter-selection log; one plain
//                   line per evaluation run
//                   test set accuracy: 0.4125
//
// Both files are only ever appended to, so several runs with
// different hyperparameters can share one log.

use anyhow::{Context, Result};
use std::{
    fmt::Display,
    fs::{self, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
};
use serde::{Deserialize, Serialize};

/// One CSV row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpochMetrics {
    /// Epoch index, `None` for evaluation passes.
    pub epoch: Option<usize>,

    /// "train", "test" or "dev"
    pub mode: String,

    /// Batches folded into the accumulator
    pub batches: usize,

    /// Mean per-batch loss; `None` when no batch was processed
    pub mean_loss: Option<f64>,

    /// Mean accuracy, "not tracked" or "no data"
    pub accuracy: String,
}

impl EpochMetrics {
    pub fn new(
        epoch:     Option<usize>,
        mode:      impl Into<String>,
        batches:   usize,
        mean_loss: Option<f64>,
        accuracy:  impl Display,
    ) -> Self {
        Self {
            epoch,
            mode: mode.into(),
            batches,
            mean_loss,
            accuracy: accuracy.to_string(),
        }
    }
}

/// Appends epoch metrics to `<dir>/metrics.csv`.
#[derive(Debug)]
pub struct MetricsLogger {
    csv_path: PathBuf,
}

impl MetricsLogger {
    /// Writes the CSV header if the file doesn't exist yet.
    pub fn new(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)
            .with_context(|| format!("Cannot create metrics dir '{}'", dir.display()))?;

        let csv_path = dir.join("metrics.csv");
        if !csv_path.exists() {
            let mut f = fs::File::create(&csv_path)?;
            writeln!(f, "epoch,mode,batches,mean_loss,accuracy")?;
            tracing::debug!("Created metrics CSV: '{}'", csv_path.display());
        }
        Ok(Self { csv_path })
    }

    pub fn log(&self, m: &EpochMetrics) -> Result<()> {
        let mut f = OpenOptions::new()
            .append(true)
            .open(&self.csv_path)
            .with_context(|| format!("Cannot open '{}'", self.csv_path.display()))?;

        let epoch = m.epoch.map_or_else(|| "-".to_string(), |e| e.to_string());
        let loss  = m.mean_loss.map_or_else(|| "-".to_string(), |l| format!("{l:.6}"));
        writeln!(f, "{},{},{},{},{}", epoch, m.mode, m.batches, loss, m.accuracy)?;

        tracing::debug!("Logged {} metrics: batches={}, loss={}", m.mode, m.batches, loss);
        Ok(())
    }

    #[cfg(test)]
    pub fn csv_path(&self) -> &Path {
        &self.csv_path
    }
}

/// The hyperparameter-selection log.
#[derive(Debug, Clone)]
pub struct AccuracyLog {
    path: PathBuf,
}

impl AccuracyLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Append `"<split> set accuracy: <value>"`.
    pub fn append(&self, split: &str, value: impl Display) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let mut f = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("Cannot open accuracy log '{}'", self.path.display()))?;
        writeln!(f, "{split} set accuracy: {value}")?;
        tracing::info!("{} set accuracy: {}", split, value);
        Ok(())
    }

    #[cfg(test)]
    pub fn path(&self) -> &Path {
        &self.path
    }
}
