// ============================================================
// Layer 5 — Inferencer
// ============================================================
// Rebuilds the trained CRNN from a checkpoint directory and
// reads the text of new CAPTCHA images:
//
//   image → grayscale → resize to training size → [0,1] pixels
//         → CRNN (eval mode) → greedy CTC decode → text
//
// Missing weights or config fail at construction, never at
// prediction time.

use anyhow::{bail, Result};
use burn::{prelude::*, tensor::TensorData};
use image::DynamicImage;
use std::sync::Arc;

use crate::data::preprocessor::Preprocessor;
use crate::domain::{traits::TextRecognizer, vocabulary::Vocabulary};
use crate::infra::checkpoint::CheckpointManager;
use crate::ml::{decoder::GreedyDecoder, model::CrnnModel};

type InferBackend = burn::backend::Wgpu;

pub struct Inferencer<B: Backend = InferBackend> {
    model:        CrnnModel<B>,
    preprocessor: Preprocessor,
    decoder:      GreedyDecoder,
    device:       B::Device,
}

impl Inferencer<InferBackend> {
    pub fn from_checkpoint(ckpt_manager: &CheckpointManager) -> Result<Self> {
        let device = burn::backend::wgpu::WgpuDevice::default();
        Self::load(ckpt_manager, device)
    }
}

impl<B: Backend> Inferencer<B> {
    /// Load config and weights from `ckpt_manager` onto `device`.
    pub fn load(ckpt_manager: &CheckpointManager, device: B::Device) -> Result<Self> {
        if !ckpt_manager.has_model() {
            bail!(
                "No trained model at '{}'. Run 'train' first.",
                ckpt_manager.model_path().display()
            );
        }
        let cfg   = ckpt_manager.load_config()?;
        let vocab = Arc::new(Vocabulary::new(&cfg.alphabet)?);

        // dropout is inert outside autodiff, so the rate doesn't matter here
        let model: CrnnModel<B> = cfg.model_config(vocab.num_classes()).init(&device);
        let model = ckpt_manager.load_model(model, &device)?;
        tracing::info!("Model loaded from '{}'", ckpt_manager.model_path().display());

        let preprocessor = Preprocessor::new(cfg.image_width, cfg.image_height);
        Ok(Self::new(model, preprocessor, vocab, device))
    }

    pub fn new(
        model:        CrnnModel<B>,
        preprocessor: Preprocessor,
        vocab:        Arc<Vocabulary>,
        device:       B::Device,
    ) -> Self {
        Self { model, preprocessor, decoder: GreedyDecoder::new(vocab), device }
    }

    pub fn predict(&self, image: &DynamicImage) -> String {
        self.predict_batch(std::slice::from_ref(image))
            .pop()
            .unwrap_or_default()
    }

    /// One forward pass over all images, results in input order
    pub fn predict_batch(&self, images: &[DynamicImage]) -> Vec<String> {
        if images.is_empty() {
            return Vec::new();
        }
        let (w, h) = (self.preprocessor.width() as usize, self.preprocessor.height() as usize);

        let pixels: Vec<f32> = images
            .iter()
            .flat_map(|img| self.preprocessor.process(img))
            .collect();

        let input = Tensor::<B, 4>::from_data(
            TensorData::new(pixels, [images.len(), 1, h, w]),
            &self.device,
        );

        let texts = self.decoder.decode_batch(self.model.forward(input));
        tracing::debug!("Decoded {} image(s): {:?}", texts.len(), texts);
        texts
    }
}

impl<B: Backend> TextRecognizer for Inferencer<B> {
    fn recognize(&self, image: &DynamicImage) -> Result<String> {
        Ok(self.predict(image))
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::model::CrnnConfig;
    use burn::backend::NdArray;
    use image::{GrayImage, Luma};

    type TestBackend = NdArray;

    fn tiny_inferencer() -> Inferencer<TestBackend> {
        let device = Default::default();
        let vocab  = Arc::new(Vocabulary::new("abc").unwrap());
        let model  = CrnnConfig::new(vocab.num_classes(), 16)
            .with_d_feature(8)
            .with_d_hidden(4)
            .init::<TestBackend>(&device);
        Inferencer::new(model, Preprocessor::new(32, 16), vocab, device)
    }

    #[test]
    fn test_prediction_uses_alphabet_only() {
        let inf = tiny_inferencer();
        let img = DynamicImage::ImageLuma8(GrayImage::from_pixel(50, 40, Luma([200])));

        let text = inf.predict(&img);
        // 32 / 8 = 4 time steps at most
        assert!(text.chars().count() <= 4);
        assert!(text.chars().all(|c| "abc".contains(c)));
    }

    #[test]
    fn test_batch_matches_single() {
        let inf  = tiny_inferencer();
        let imgs = vec![
            DynamicImage::ImageLuma8(GrayImage::from_pixel(32, 16, Luma([0]))),
            DynamicImage::ImageLuma8(GrayImage::from_pixel(32, 16, Luma([255]))),
        ];

        let batch = inf.predict_batch(&imgs);
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[0], inf.predict(&imgs[0]));
        assert_eq!(batch[1], inf.predict(&imgs[1]));
        assert!(inf.predict_batch(&[]).is_empty());
    }

    #[test]
    fn test_missing_checkpoint_is_fatal() {
        let dir  = tempfile::tempdir().unwrap();
        let ckpt = CheckpointManager::new(dir.path());
        assert!(Inferencer::<TestBackend>::load(&ckpt, Default::default()).is_err());
    }
}
