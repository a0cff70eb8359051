// ============================================================
// Layer 6 — Checkpoint Manager
// ============================================================
// Saves and restores model weights using Burn's CompactRecorder.
//
// Checkpoint directory layout:
//   checkpoints/
//     best_model.mpk      ← weights of the lowest-val_loss epoch,
//                           overwritten on every improvement
//     train_config.json   ← alphabet, image size, architecture
//     metrics.csv         ← one row per epoch (see metrics.rs)
//
// The config is written before training starts; inference
// rebuilds the exact architecture and vocabulary from it, then
// loads the weights. CompactRecorder refuses records whose
// shapes don't match the rebuilt model.
//
// Reference: Burn Book §5 (Records and Checkpointing)

use anyhow::{bail, Context, Result};
use burn::{
    prelude::*,
    record::{CompactRecorder, Recorder},
};
use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::application::train_use_case::TrainConfig;
use crate::ml::model::CrnnModel;

const MODEL_STEM:  &str = "best_model";
const MODEL_FILE:  &str = "best_model.mpk";
const CONFIG_FILE: &str = "train_config.json";

/// Manages the best-model checkpoint and its config.
pub struct CheckpointManager {
    dir: PathBuf,
}

impl CheckpointManager {
    /// Point at a checkpoint directory; nothing is created yet.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Create the directory (like `mkdir -p`) before training writes to it.
    pub fn ensure_dir(&self) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("Cannot create checkpoint dir '{}'", self.dir.display()))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn model_path(&self) -> PathBuf {
        self.dir.join(MODEL_FILE)
    }

    pub fn has_model(&self) -> bool {
        self.model_path().is_file()
    }

    /// Overwrite the best-model weights.
    pub fn save_model<B: Backend>(&self, model: &CrnnModel<B>) -> Result<()> {
        // the recorder appends the extension itself
        let path = self.dir.join(MODEL_STEM);

        CompactRecorder::new()
            .record(model.clone().into_record(), path.clone())
            .with_context(|| format!("Failed to save checkpoint to '{}'", path.display()))?;

        tracing::debug!("Saved best model to '{}'", self.model_path().display());
        Ok(())
    }

    /// Load the best-model weights into `model`, which must have
    /// the architecture described by the saved config.
    pub fn load_model<B: Backend>(&self, model: CrnnModel<B>, device: &B::Device) -> Result<CrnnModel<B>> {
        if !self.has_model() {
            bail!(
                "No trained model at '{}'. Run 'train' first.",
                self.model_path().display()
            );
        }

        let record = CompactRecorder::new()
            .load(self.dir.join(MODEL_STEM), device)
            .with_context(|| format!("Cannot load checkpoint '{}'", self.model_path().display()))?;

        Ok(model.load_record(record))
    }

    pub fn save_config(&self, cfg: &TrainConfig) -> Result<()> {
        let path = self.dir.join(CONFIG_FILE);
        let json = serde_json::to_string_pretty(cfg)?;

        fs::write(&path, json)
            .with_context(|| format!("Cannot write config to '{}'", path.display()))?;

        tracing::debug!("Saved training config to '{}'", path.display());
        Ok(())
    }

    pub fn load_config(&self) -> Result<TrainConfig> {
        let path = self.dir.join(CONFIG_FILE);

        let json = fs::read_to_string(&path).with_context(|| {
            format!(
                "Cannot read config from '{}'. Make sure you have run 'train' before 'predict'.",
                path.display()
            )
        })?;

        serde_json::from_str(&json)
            .with_context(|| format!("Malformed config '{}'", path.display()))
    }
}
