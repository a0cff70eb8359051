// ============================================================
// Layer 4 — CAPTCHA Batcher
// ============================================================
// Implements Burn's Batcher trait to turn a Vec<CaptchaItem>
// into model-ready tensors.
//
// How batching works here:
//   Images:  N items of H*W pixels → one tensor [N, 1, H, W]
//   Targets: label index sequences are NOT padded. They are
//            concatenated into one flat Int tensor, and the
//            length of each sample's sequence is kept aside:
//
//     labels  "ab", "zzz"
//     targets [1, 2, 26, 26, 26]
//     lengths [2, 3]
//
//   This is the variable-length convention the CTC loss expects,
//   even when every label has the same length.
//
// Reference: Burn Book §4 (Batcher)

use burn::{
    data::dataloader::batcher::Batcher,
    prelude::*,
    tensor::TensorData,
};

use crate::data::dataset::CaptchaItem;

/// A batch of CAPTCHA samples ready for the forward pass.
#[derive(Debug, Clone)]
pub struct CaptchaBatch<B: Backend> {
    /// Grayscale images — shape: [batch_size, 1, height, width]
    pub images: Tensor<B, 4>,

    /// All label sequences concatenated — shape: [sum(target_lengths)]
    pub targets: Tensor<B, 1, Int>,

    /// Length of each sample's label sequence, in batch order
    pub target_lengths: Vec<usize>,

    /// Ground-truth texts, in batch order (for sequence accuracy)
    pub labels: Vec<String>,
}

/// Holds the image geometry; tensors are created on the device
/// the DataLoader hands in.
#[derive(Clone, Debug)]
pub struct CaptchaBatcher {
    width:  usize,
    height: usize,
}

impl CaptchaBatcher {
    pub fn new(width: usize, height: usize) -> Self {
        Self { width, height }
    }
}

/// Concatenate label sequences and record their lengths.
pub fn collate_targets(items: &[CaptchaItem]) -> (Vec<i64>, Vec<usize>) {
    let lengths = items.iter().map(|item| item.targets.len()).collect();
    let flat    = items
        .iter()
        .flat_map(|item| item.targets.iter().map(|&t| t as i64))
        .collect();
    (flat, lengths)
}

impl<B: Backend> Batcher<B, CaptchaItem, CaptchaBatch<B>> for CaptchaBatcher {
    fn batch(&self, items: Vec<CaptchaItem>, device: &B::Device) -> CaptchaBatch<B> {
        let batch_size = items.len();

        // ── Stack images ──────────────────────────────────────────────────────
        let pixels: Vec<f32> = items
            .iter()
            .flat_map(|item| item.pixels.iter().copied())
            .collect();

        let images = Tensor::<B, 4>::from_data(
            TensorData::new(pixels, [batch_size, 1, self.height, self.width]),
            device,
        );

        // ── Flatten targets ───────────────────────────────────────────────────
        let (flat, target_lengths) = collate_targets(&items);
        let total   = flat.len();
        let targets = Tensor::<B, 1, Int>::from_data(TensorData::new(flat, [total]), device);

        let labels = items.into_iter().map(|item| item.label).collect();

        CaptchaBatch { images, targets, target_lengths, labels }
    }
}
