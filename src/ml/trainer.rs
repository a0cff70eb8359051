// ============================================================
// Layer 5 — Training Loop
// ============================================================
// Train + validation loop using Burn's DataLoader and AdamW.
//
// Per epoch:
//   1. Training phase on the autodiff backend: forward, CTC
//      loss, backward, AdamW step at the scheduled rate
//   2. Validation phase on the inner backend (model.valid(),
//      dropout off, batch norm uses running stats): mean CTC
//      loss and exact-match sequence accuracy
//   3. One metrics row and one console line
//   4. Early stopping: if val_loss strictly improved, overwrite
//      the best-model checkpoint; otherwise count towards the
//      patience limit and stop once it is reached
//
// Learning-rate schedule (step decay):
//   lr(epoch) = base · gamma ^ ((epoch - 1) / step)
//   e.g. base 1e-3, step 10, gamma 0.5:
//     epochs 1-10 → 1e-3, 11-20 → 5e-4, 21-30 → 2.5e-4
//
// Reference: Burn Book §5, Loshchilov & Hutter (2019) AdamW

use anyhow::{bail, Result};
use burn::{
    data::dataloader::DataLoaderBuilder,
    module::AutodiffModule,
    optim::{AdamWConfig, GradientsParams, Optimizer},
    prelude::*,
    tensor::backend::AutodiffBackend,
};
use std::sync::Arc;

use crate::application::train_use_case::{check_time_axis, TrainConfig};
use crate::data::{
    batcher::{CaptchaBatch, CaptchaBatcher},
    dataset::{CaptchaDataset, CaptchaItem},
};
use crate::domain::vocabulary::{Vocabulary, BLANK};
use crate::infra::{
    checkpoint::CheckpointManager,
    metrics::{EpochMetrics, MetricsLogger},
};
use crate::ml::{
    ctc::CtcLossConfig,
    decoder::GreedyDecoder,
    model::CrnnModel,
};

type MyBackend = burn::backend::Autodiff<burn::backend::Wgpu>;

/// Outcome of feeding one epoch's validation loss to [`EarlyStopping`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// New best loss; save a checkpoint
    Improved,
    /// No improvement, patience not yet exhausted
    NotImproved,
    /// No improvement for `patience` consecutive epochs
    Stop,
}

/// Tracks the best validation loss and how long since it improved.
#[derive(Debug, Clone)]
pub struct EarlyStopping {
    patience:   usize,
    best:       f64,
    best_epoch: usize,
    counter:    usize,
}

impl EarlyStopping {
    pub fn new(patience: usize) -> Self {
        Self { patience, best: f64::INFINITY, best_epoch: 0, counter: 0 }
    }

    /// Only a strictly lower loss counts as an improvement.
    pub fn observe(&mut self, epoch: usize, val_loss: f64) -> Verdict {
        if val_loss < self.best {
            self.best       = val_loss;
            self.best_epoch = epoch;
            self.counter    = 0;
            return Verdict::Improved;
        }

        self.counter += 1;
        if self.counter >= self.patience {
            Verdict::Stop
        } else {
            Verdict::NotImproved
        }
    }

    pub fn best(&self) -> f64 {
        self.best
    }

    /// 0 until the first improvement
    pub fn best_epoch(&self) -> usize {
        self.best_epoch
    }
}

/// Multiply the rate by `gamma` every `step` epochs.
#[derive(Debug, Clone, Copy)]
pub struct StepDecay {
    base:  f64,
    step:  usize,
    gamma: f64,
}

impl StepDecay {
    pub fn new(base: f64, step: usize, gamma: f64) -> Self {
        Self { base, step: step.max(1), gamma }
    }

    /// Rate for a 1-based epoch number
    pub fn lr_at(&self, epoch: usize) -> f64 {
        let decays = epoch.saturating_sub(1) / self.step;
        self.base * self.gamma.powi(decays as i32)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrainingSummary {
    pub epochs_run:    usize,
    pub best_epoch:    usize,
    pub best_val_loss: f64,
    pub stopped_early: bool,
}

pub fn run_training(
    cfg:          &TrainConfig,
    vocab:        Arc<Vocabulary>,
    train_data:   CaptchaDataset,
    val_data:     CaptchaDataset,
    ckpt_manager: &CheckpointManager,
) -> Result<TrainingSummary> {
    let device = burn::backend::wgpu::WgpuDevice::default();
    tracing::info!("Using WGPU device: {:?}", device);
    train_loop::<MyBackend>(cfg, vocab, train_data, val_data, ckpt_manager, device)
}

/// Backend-generic loop; `run_training` instantiates it on WGPU.
pub fn train_loop<B: AutodiffBackend>(
    cfg:          &TrainConfig,
    vocab:        Arc<Vocabulary>,
    train_data:   CaptchaDataset,
    val_data:     CaptchaDataset,
    ckpt_manager: &CheckpointManager,
    device:       B::Device,
) -> Result<TrainingSummary> {
    if cfg.epochs == 0 {
        bail!("epochs must be at least 1");
    }
    let max_len = train_data.max_label_len().max(val_data.max_label_len());
    if let Err(e) = check_time_axis(cfg.image_width, max_len) {
        tracing::warn!("{e}; such samples contribute zero loss");
    }

    // ── Build model ───────────────────────────────────────────────────────────
    let model_cfg = cfg.model_config(vocab.num_classes());
    let mut model: CrnnModel<B> = model_cfg.init(&device);
    tracing::info!(
        "CRNN ready: {} classes, d_feature={}, d_hidden={}",
        model_cfg.num_classes, model_cfg.d_feature, model_cfg.d_hidden,
    );

    let ctc     = CtcLossConfig::new().with_blank(BLANK).init();
    let decoder = GreedyDecoder::new(vocab);

    // ── AdamW optimiser ───────────────────────────────────────────────────────
    let mut optim = AdamWConfig::new()
        .with_weight_decay(cfg.weight_decay as f32)
        .init();
    let schedule = StepDecay::new(cfg.lr, cfg.lr_step, cfg.lr_gamma);

    // ── Data loaders ──────────────────────────────────────────────────────────
    let batcher = CaptchaBatcher::new(cfg.image_width as usize, cfg.image_height as usize);

    let train_loader = DataLoaderBuilder::<B, CaptchaItem, CaptchaBatch<B>>::new(batcher.clone())
        .batch_size(cfg.batch_size)
        .shuffle(cfg.seed)
        .num_workers(cfg.num_workers)
        .set_device(device.clone())
        .build(train_data);

    // Validation runs on the inner backend, no autodiff overhead
    let val_loader = DataLoaderBuilder::<B::InnerBackend, CaptchaItem, CaptchaBatch<B::InnerBackend>>::new(batcher)
        .batch_size(cfg.batch_size)
        .num_workers(cfg.num_workers)
        .set_device(device.clone())
        .build(val_data);

    let metrics      = MetricsLogger::create(ckpt_manager.dir())?;
    let mut stopping = EarlyStopping::new(cfg.patience);
    let mut summary  = TrainingSummary {
        epochs_run:    0,
        best_epoch:    0,
        best_val_loss: f64::INFINITY,
        stopped_early: false,
    };

    // ── Epoch loop ────────────────────────────────────────────────────────────
    for epoch in 1..=cfg.epochs {
        let lr = schedule.lr_at(epoch);

        // ── Training phase ────────────────────────────────────────────────────
        let mut train_loss_sum = 0.0f64;
        let mut train_batches  = 0usize;

        for batch in train_loader.iter() {
            let (loss, _) = model.forward_loss(
                batch.images,
                batch.targets,
                &batch.target_lengths,
                &ctc,
            );

            train_loss_sum += loss.clone().into_scalar().elem::<f64>();
            train_batches  += 1;

            let grads = loss.backward();
            let grads = GradientsParams::from_grads(grads, &model);
            model = optim.step(lr, model, grads);
        }

        let avg_train_loss = if train_batches > 0 {
            train_loss_sum / train_batches as f64
        } else { f64::NAN };

        // ── Validation phase ──────────────────────────────────────────────────
        let model_valid = model.valid();

        let mut val_loss_sum  = 0.0f64;
        let mut val_batches   = 0usize;
        let mut correct       = 0usize;
        let mut total_samples = 0usize;

        for batch in val_loader.iter() {
            let (loss, scores) = model_valid.forward_loss(
                batch.images,
                batch.targets,
                &batch.target_lengths,
                &ctc,
            );
            val_loss_sum += loss.into_scalar().elem::<f64>();
            val_batches  += 1;

            // Compare against this batch's own texts
            let predicted = decoder.decode_batch(scores);
            correct += predicted
                .iter()
                .zip(&batch.labels)
                .filter(|(p, t)| p == t)
                .count();
            total_samples += batch.labels.len();
        }

        let avg_val_loss = if val_batches   > 0 { val_loss_sum / val_batches as f64 } else { f64::NAN };
        let val_acc      = if total_samples > 0 { correct as f64 / total_samples as f64 } else { 0.0 };

        println!(
            "Epoch {:>3}/{} | train_loss={:.4} | val_loss={:.4} | val_acc={:.1}% | lr={:.2e}",
            epoch, cfg.epochs, avg_train_loss, avg_val_loss, val_acc * 100.0, lr,
        );
        metrics.log(&EpochMetrics::new(epoch, avg_train_loss, avg_val_loss, val_acc, lr))?;
        summary.epochs_run = epoch;

        // ── Early stopping / checkpoint ───────────────────────────────────────
        match stopping.observe(epoch, avg_val_loss) {
            Verdict::Improved => {
                ckpt_manager.save_model(&model_valid)?;
                tracing::info!("val_loss improved to {:.4}, checkpoint saved", avg_val_loss);
            }
            Verdict::NotImproved => {}
            Verdict::Stop => {
                tracing::info!(
                    "No improvement for {} epochs, stopping at epoch {}",
                    cfg.patience, epoch,
                );
                summary.stopped_early = true;
                break;
            }
        }
    }

    summary.best_epoch    = stopping.best_epoch();
    summary.best_val_loss = stopping.best();
    tracing::info!(
        "Training complete: best val_loss={:.4} at epoch {}",
        summary.best_val_loss, summary.best_epoch,
    );
    Ok(summary)
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::preprocessor::Preprocessor;
    use burn::backend::{Autodiff, NdArray};
    use image::{GrayImage, Luma};

    type TestBackend = Autodiff<NdArray>;

    fn tiny_config(checkpoint_dir: &std::path::Path) -> TrainConfig {
        TrainConfig {
            checkpoint_dir: checkpoint_dir.to_path_buf(),
            alphabet:       "ab".to_string(),
            image_width:    32,
            image_height:   16,
            batch_size:     2,
            epochs:         3,
            patience:       5,
            num_workers:    1,
            augment:        false,
            d_feature:      8,
            d_hidden:       4,
            dropout:        0.0,
            ..TrainConfig::default()
        }
    }

    fn tiny_dataset(labels: &[&str], vocab: &Vocabulary) -> CaptchaDataset {
        let images = labels
            .iter()
            .enumerate()
            .map(|(i, l)| (GrayImage::from_pixel(32, 16, Luma([(40 * i) as u8])), l.to_string()))
            .collect();
        CaptchaDataset::from_images(images, Preprocessor::new(32, 16), vocab).unwrap()
    }

    fn metric_rows(ckpt: &CheckpointManager) -> usize {
        let text = std::fs::read_to_string(ckpt.dir().join("metrics.csv")).unwrap();
        text.lines().skip(1).filter(|l| !l.is_empty()).count()
    }

    #[test]
    fn test_train_loop_writes_checkpoint_and_metrics() {
        let dir   = tempfile::tempdir().unwrap();
        let cfg   = tiny_config(dir.path());
        let vocab = Arc::new(Vocabulary::new(&cfg.alphabet).unwrap());
        let ckpt  = CheckpointManager::new(dir.path());
        ckpt.ensure_dir().unwrap();

        let train = tiny_dataset(&["ab", "ba", "aa", "bb"], &vocab);
        let val   = tiny_dataset(&["ab", "ba"], &vocab);
        let summary =
            train_loop::<TestBackend>(&cfg, vocab, train, val, &ckpt, Default::default()).unwrap();

        assert_eq!(summary.epochs_run, 3);
        assert!(!summary.stopped_early);
        assert!((1..=3).contains(&summary.best_epoch));
        assert!(summary.best_val_loss.is_finite());
        assert!(ckpt.has_model());
        assert_eq!(metric_rows(&ckpt), summary.epochs_run);
    }

    #[test]
    fn test_train_loop_stops_on_flat_validation_loss() {
        // "aaa" needs 5 time steps but 32 px gives 4, so every
        // validation sample is zeroed and val_loss stays at 0.0
        let dir   = tempfile::tempdir().unwrap();
        let cfg   = TrainConfig { epochs: 6, patience: 1, ..tiny_config(dir.path()) };
        let vocab = Arc::new(Vocabulary::new(&cfg.alphabet).unwrap());
        let ckpt  = CheckpointManager::new(dir.path());
        ckpt.ensure_dir().unwrap();

        let train = tiny_dataset(&["ab", "ba"], &vocab);
        let val   = tiny_dataset(&["aaa", "aaa"], &vocab);
        let summary =
            train_loop::<TestBackend>(&cfg, vocab, train, val, &ckpt, Default::default()).unwrap();

        assert!(summary.stopped_early);
        assert_eq!(summary.best_epoch, 1);
        assert_eq!(summary.epochs_run, 2);
        assert_eq!(summary.best_val_loss, 0.0);
        assert!(ckpt.has_model());
        assert_eq!(metric_rows(&ckpt), 2);
    }

    #[test]
    fn test_train_loop_rejects_zero_epochs() {
        let dir   = tempfile::tempdir().unwrap();
        let cfg   = TrainConfig { epochs: 0, ..tiny_config(dir.path()) };
        let vocab = Arc::new(Vocabulary::new(&cfg.alphabet).unwrap());
        let ckpt  = CheckpointManager::new(dir.path());

        let train = tiny_dataset(&["ab"], &vocab);
        let val   = tiny_dataset(&["ba"], &vocab);
        let result = train_loop::<TestBackend>(&cfg, vocab, train, val, &ckpt, Default::default());
        assert!(result.is_err());
        assert!(!ckpt.has_model());
    }

    #[test]
    fn test_strict_improvement_only() {
        let mut es = EarlyStopping::new(3);
        assert_eq!(es.observe(1, 1.0), Verdict::Improved);
        // equal is not better
        assert_eq!(es.observe(2, 1.0), Verdict::NotImproved);
        assert_eq!(es.observe(3, 0.9), Verdict::Improved);
        assert_eq!(es.best_epoch(), 3);
        assert!((es.best() - 0.9).abs() < 1e-12);
    }

    #[test]
    fn test_stops_after_patience() {
        let mut es = EarlyStopping::new(5);
        assert_eq!(es.observe(1, 0.5), Verdict::Improved);
        for epoch in 2..=5 {
            assert_eq!(es.observe(epoch, 0.6), Verdict::NotImproved);
        }
        assert_eq!(es.observe(6, 0.7), Verdict::Stop);
    }

    #[test]
    fn test_improvement_resets_counter() {
        let mut es = EarlyStopping::new(2);
        es.observe(1, 1.0);
        assert_eq!(es.observe(2, 1.5), Verdict::NotImproved);
        assert_eq!(es.observe(3, 0.8), Verdict::Improved);
        assert_eq!(es.observe(4, 0.9), Verdict::NotImproved);
        assert_eq!(es.observe(5, 0.9), Verdict::Stop);
    }

    #[test]
    fn test_nan_loss_never_improves() {
        let mut es = EarlyStopping::new(1);
        assert_eq!(es.observe(1, f64::NAN), Verdict::Stop);
        assert_eq!(es.best_epoch(), 0);
    }

    #[test]
    fn test_checkpoint_epochs_strictly_decrease() {
        // Simulated val losses; checkpoints happen exactly on new minima
        let losses = [0.9, 0.7, 0.7, 0.8, 0.6, 0.65, 0.6, 0.61, 0.62, 0.63];
        let mut es    = EarlyStopping::new(5);
        let mut saved = Vec::new();
        let mut last  = 0;
        for (i, &l) in losses.iter().enumerate() {
            last = i + 1;
            match es.observe(last, l) {
                Verdict::Improved    => saved.push(l),
                Verdict::NotImproved => {}
                Verdict::Stop        => break,
            }
        }
        assert_eq!(saved, vec![0.9, 0.7, 0.6]);
        assert!(saved.windows(2).all(|w| w[1] < w[0]));
        // stopped five epochs after the last improvement (epoch 5)
        assert_eq!(last, 10);
    }

    #[test]
    fn test_step_decay() {
        let s = StepDecay::new(1e-3, 10, 0.5);
        assert!((s.lr_at(1)  - 1e-3).abs()   < 1e-12);
        assert!((s.lr_at(10) - 1e-3).abs()   < 1e-12);
        assert!((s.lr_at(11) - 5e-4).abs()   < 1e-12);
        assert!((s.lr_at(21) - 2.5e-4).abs() < 1e-12);
        assert!((s.lr_at(50) - 6.25e-5).abs() < 1e-12);
    }
}
