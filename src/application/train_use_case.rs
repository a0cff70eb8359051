// ============================================================
// Layer 2 — TrainUseCase
// ============================================================
// Orchestrates the full training pipeline in order:
//
//   Step 1: Build the vocabulary            (Layer 3 - domain)
//   Step 2: Read the labels table, check    (Layer 4 - data)
//           every label fits the alphabet
//   Step 3: Check T = width/8 fits labels   (Layer 5 - ml)
//   Step 4: Split train/validation          (Layer 4 - data)
//   Step 5: Decode images into datasets     (Layer 4 - data)
//   Step 6: Save config                     (Layer 6 - infra)
//   Step 7: Run training loop               (Layer 5 - ml)

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::{path::PathBuf, sync::Arc};

use crate::data::{
    dataset::CaptchaDataset,
    labels::LabelsTable,
    preprocessor::{Augmentation, Preprocessor},
    splitter::split_train_val,
};
use crate::domain::{
    traits::SampleSource,
    vocabulary::{Vocabulary, LOWERCASE},
};
use crate::infra::checkpoint::CheckpointManager;
use crate::ml::{
    model::{time_steps, CrnnConfig},
    trainer::{run_training, TrainingSummary},
};

// ─── Training Configuration ──────────────────────────────────────────────────
// All settings for a training run. Saved as train_config.json so
// inference can rebuild the same vocabulary, image size and model.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainConfig {
    pub labels_path:    PathBuf,
    pub images_dir:     PathBuf,
    pub checkpoint_dir: PathBuf,
    pub alphabet:       String,
    pub image_width:    u32,
    pub image_height:   u32,
    pub batch_size:     usize,
    pub epochs:         usize,
    pub lr:             f64,
    pub lr_step:        usize,
    pub lr_gamma:       f64,
    pub weight_decay:   f64,
    pub patience:       usize,
    pub val_fraction:   f64,
    pub seed:           u64,
    pub num_workers:    usize,
    pub augment:        bool,
    pub d_feature:      usize,
    pub d_hidden:       usize,
    pub dropout:        f64,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            labels_path:    PathBuf::from("data/labels.csv"),
            images_dir:     PathBuf::from("data/images"),
            checkpoint_dir: PathBuf::from("checkpoints"),
            alphabet:       LOWERCASE.to_string(),
            image_width:    120,
            image_height:   100,
            batch_size:     64,
            epochs:         50,
            lr:             1e-3,
            lr_step:        10,
            lr_gamma:       0.5,
            weight_decay:   1e-4,
            patience:       5,
            val_fraction:   0.2,
            seed:           42,
            num_workers:    4,
            augment:        true,
            d_feature:      256,
            d_hidden:       128,
            dropout:        0.3,
        }
    }
}

impl TrainConfig {
    pub fn model_config(&self, num_classes: usize) -> CrnnConfig {
        CrnnConfig::new(num_classes, self.image_height as usize)
            .with_d_feature(self.d_feature)
            .with_d_hidden(self.d_hidden)
            .with_dropout(self.dropout)
    }
}

/// A label of length L needs at least 2L - 1 time steps when
/// every symbol repeats; L is enough otherwise. Only the first
/// bound is guaranteed for arbitrary labels.
pub fn check_time_axis(width: u32, max_label_len: usize) -> Result<()> {
    let steps = time_steps(width as usize);
    let need  = (2 * max_label_len).saturating_sub(1);
    if steps < need {
        bail!(
            "Image width {width} gives {steps} time steps, but labels of length \
             {max_label_len} need at least {need}"
        );
    }
    Ok(())
}

// ─── TrainUseCase ─────────────────────────────────────────────────────────────
pub struct TrainUseCase {
    config: TrainConfig,
}

impl TrainUseCase {
    pub fn new(config: TrainConfig) -> Self {
        Self { config }
    }

    pub fn execute(&self) -> Result<TrainingSummary> {
        let cfg = &self.config;

        // ── Step 1: Vocabulary ────────────────────────────────────────────────
        let vocab = Arc::new(Vocabulary::new(&cfg.alphabet)?);
        tracing::info!("Alphabet '{}' ({} classes with blank)", vocab.alphabet(), vocab.num_classes());

        // ── Step 2: Labels table ──────────────────────────────────────────────
        let samples = LabelsTable::new(&cfg.labels_path).load_all()?;
        if samples.is_empty() {
            bail!("Labels table '{}' has no rows", cfg.labels_path.display());
        }
        if let Some(bad) = samples.iter().find(|s| !s.is_closed_over(&vocab)) {
            bail!(
                "Label '{}' of '{}' uses characters outside the alphabet '{}'",
                bad.label,
                bad.filename,
                vocab.alphabet(),
            );
        }

        // ── Step 3: Time axis vs. label length ────────────────────────────────
        let max_len = samples.iter().map(|s| s.label_len()).max().unwrap_or(0);
        check_time_axis(cfg.image_width, max_len)?;

        // ── Step 4: Train / validation split ──────────────────────────────────
        let (train_samples, val_samples) = split_train_val(samples, cfg.val_fraction, cfg.seed);
        if train_samples.is_empty() || val_samples.is_empty() {
            bail!(
                "Split gave {} training and {} validation samples; both must be non-empty",
                train_samples.len(),
                val_samples.len(),
            );
        }
        tracing::info!("Split: {} train, {} validation", train_samples.len(), val_samples.len());

        // ── Step 5: Datasets ──────────────────────────────────────────────────
        // Separate datasets, so augmentation never leaks into validation
        let preprocessor = Preprocessor::new(cfg.image_width, cfg.image_height);
        let mut train_ds = CaptchaDataset::load(&train_samples, &cfg.images_dir, preprocessor, &vocab)?;
        let val_ds       = CaptchaDataset::load(&val_samples, &cfg.images_dir, preprocessor, &vocab)?;
        if cfg.augment {
            train_ds = train_ds.with_augmentation(Augmentation::default());
        }

        // ── Step 6: Save config for inference ─────────────────────────────────
        let ckpt_manager = CheckpointManager::new(&cfg.checkpoint_dir);
        ckpt_manager.ensure_dir()?;
        ckpt_manager.save_config(cfg)?;

        // ── Step 7: Training loop (Layer 5) ───────────────────────────────────
        let summary = run_training(cfg, vocab, train_ds, val_ds, &ckpt_manager)?;
        println!(
            "Best val_loss {:.4} at epoch {} ({} epochs run{})",
            summary.best_val_loss,
            summary.best_epoch,
            summary.epochs_run,
            if summary.stopped_early { ", stopped early" } else { "" },
        );
        Ok(summary)
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_reference_pipeline() {
        let cfg = TrainConfig::default();
        assert_eq!(cfg.batch_size, 64);
        assert_eq!(cfg.epochs, 50);
        assert_eq!(cfg.patience, 5);
        assert_eq!((cfg.image_width, cfg.image_height), (120, 100));
        assert_eq!(cfg.model_config(27).num_classes, 27);
    }

    #[test]
    fn test_time_axis_check() {
        // 120 / 8 = 15 steps
        assert!(check_time_axis(120, 4).is_ok());
        assert!(check_time_axis(120, 8).is_ok());
        assert!(check_time_axis(120, 9).is_err());
        assert!(check_time_axis(16, 2).is_err());
    }

    #[test]
    fn test_partial_config_json_uses_defaults() {
        let cfg: TrainConfig = serde_json::from_str(r#"{ "epochs": 7 }"#).unwrap();
        assert_eq!(cfg.epochs, 7);
        assert_eq!(cfg.alphabet, LOWERCASE);
    }

    #[test]
    fn test_missing_labels_table_fails() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = TrainConfig {
            labels_path:    dir.path().join("labels.csv"),
            checkpoint_dir: dir.path().join("ckpt"),
            ..TrainConfig::default()
        };
        assert!(TrainUseCase::new(cfg).execute().is_err());
    }

    #[test]
    fn test_label_outside_alphabet_is_rejected_before_decoding() {
        let dir    = tempfile::tempdir().unwrap();
        let labels = dir.path().join("labels.csv");
        // No images exist: the alphabet check must fail first
        std::fs::write(&labels, "filename,label
a.png,abcd
b.png,ab3d
").unwrap();

        let cfg = TrainConfig {
            labels_path:    labels,
            images_dir:     dir.path().join("images"),
            checkpoint_dir: dir.path().join("ckpt"),
            ..TrainConfig::default()
        };
        let err = TrainUseCase::new(cfg).execute().unwrap_err();
        assert!(format!("{err:#}").contains("'ab3d' of 'b.png'"));
        assert!(!dir.path().join("ckpt").exists());
    }
}
