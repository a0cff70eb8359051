// ============================================================
// Layer 6 — Metrics Logger
// ============================================================
// Records training metrics to a CSV file after each epoch.
//
// Metrics recorded per epoch:
//   - epoch:      the epoch number (1, 2, 3, ...)
//   - train_loss: mean CTC loss over training batches
//   - val_loss:   mean CTC loss over validation batches
//   - val_acc:    fraction of validation CAPTCHAs decoded exactly
//   - lr:         learning rate used for the epoch
//
// Output file: checkpoints/metrics.csv
//
//   epoch,train_loss,val_loss,val_acc,lr
//   1,0.812345,0.700112,0.000000,0.001000
//   2,0.402310,0.351002,0.214667,0.001000
//
// A fresh training run truncates the file, so it always
// describes exactly one run.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    fs::{self, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
};

pub const METRICS_HEADER: &str = "epoch,train_loss,val_loss,val_acc,lr";

/// One row of metrics data for a single training epoch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochMetrics {
    /// Starts at 1
    pub epoch: usize,

    pub train_loss: f64,

    /// Drives early stopping and checkpointing
    pub val_loss: f64,

    /// Range [0.0, 1.0]; a sample counts only if every character matches
    pub val_acc: f64,

    pub lr: f64,
}

impl EpochMetrics {
    pub fn new(epoch: usize, train_loss: f64, val_loss: f64, val_acc: f64, lr: f64) -> Self {
        Self { epoch, train_loss, val_loss, val_acc, lr }
    }

    pub fn to_csv_row(&self) -> String {
        format!(
            "{},{:.6},{:.6},{:.6},{:.6}",
            self.epoch, self.train_loss, self.val_loss, self.val_acc, self.lr,
        )
    }
}

pub struct MetricsLogger {
    csv_path: PathBuf,
}

impl MetricsLogger {
    /// Create `metrics.csv` in `dir`, replacing any previous run's file.
    pub fn create(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir)?;
        let csv_path = dir.join("metrics.csv");

        let mut f = fs::File::create(&csv_path)
            .with_context(|| format!("Cannot create '{}'", csv_path.display()))?;
        writeln!(f, "{METRICS_HEADER}")?;

        tracing::debug!("Created metrics CSV: '{}'", csv_path.display());
        Ok(Self { csv_path })
    }

    /// Append one epoch's metrics as a new row in the CSV.
    pub fn log(&self, m: &EpochMetrics) -> Result<()> {
        let mut f = OpenOptions::new().append(true).open(&self.csv_path)?;
        writeln!(f, "{}", m.to_csv_row())?;

        tracing::debug!(
            "Logged epoch {} metrics: train_loss={:.4}, val_loss={:.4}",
            m.epoch, m.train_loss, m.val_loss,
        );
        Ok(())
    }

    pub fn csv_path(&self) -> &Path {
        &self.csv_path
    }
}
