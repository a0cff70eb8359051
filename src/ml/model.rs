// ============================================================
// Layer 5 — CRNN Model
// ============================================================
// Convolutional recurrent network for sequence recognition.
//
//   image [B, 1, H, W]
//     → 3 × (Conv 3x3 same → BatchNorm → ReLU → MaxPool 2x2)
//       channels 1 → 32 → 64 → 128, spatial size H/8 × W/8
//     → columns as time steps: [B, W/8, 128 · H/8]
//     → Linear(d_feature) → Dropout
//     → BiLSTM(d_hidden) → Dropout → BiLSTM(d_hidden)
//     → Linear(num_classes)
//   scores [B, T = W/8, num_classes]
//
// Each time step sees one vertical slice of the image, so the
// width fixes the sequence length the CTC loss aligns against.
//
// Reference: Shi et al. (2015) An End-to-End Trainable Neural Network
//            for Image-based Sequence Recognition

use burn::{
    nn::{
        conv::{Conv2d, Conv2dConfig},
        pool::{MaxPool2d, MaxPool2dConfig},
        BatchNorm, BatchNormConfig,
        BiLstm, BiLstmConfig,
        Dropout, DropoutConfig,
        Linear, LinearConfig,
        PaddingConfig2d,
    },
    prelude::*,
    tensor::activation::{log_softmax, relu},
};

use crate::ml::ctc::CtcLoss;

/// Total spatial downsampling of the convolutional stack
pub const DOWNSAMPLE: usize = 8;

const CONV_CHANNELS: [usize; 4] = [1, 32, 64, 128];

/// Sequence length produced for an input of the given width
pub fn time_steps(width: usize) -> usize {
    width / DOWNSAMPLE
}

// NOTE: #[derive(Config)] already generates Clone and Serialize/Deserialize
#[derive(Config, Debug)]
pub struct CrnnConfig {
    /// Alphabet size plus one for the blank
    pub num_classes:  usize,
    pub image_height: usize,
    #[config(default = 256)]
    pub d_feature:    usize,
    #[config(default = 128)]
    pub d_hidden:     usize,
    #[config(default = 0.3)]
    pub dropout:      f64,
}

impl CrnnConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> CrnnModel<B> {
        let convs = CONV_CHANNELS
            .windows(2)
            .map(|pair| ConvBlock::new(pair[0], pair[1], device))
            .collect();

        let feature_rows = self.image_height / DOWNSAMPLE;
        let d_conv       = CONV_CHANNELS[CONV_CHANNELS.len() - 1] * feature_rows;

        CrnnModel {
            convs,
            projection: LinearConfig::new(d_conv, self.d_feature).init(device),
            rnn1:       BiLstmConfig::new(self.d_feature, self.d_hidden, true).init(device),
            rnn2:       BiLstmConfig::new(2 * self.d_hidden, self.d_hidden, true).init(device),
            classifier: LinearConfig::new(2 * self.d_hidden, self.num_classes).init(device),
            dropout:    DropoutConfig::new(self.dropout).init(),
        }
    }
}

#[derive(Module, Debug)]
pub struct ConvBlock<B: Backend> {
    pub conv: Conv2d<B>,
    pub norm: BatchNorm<B>,
    pub pool: MaxPool2d,
}

impl<B: Backend> ConvBlock<B> {
    fn new(channels_in: usize, channels_out: usize, device: &B::Device) -> Self {
        Self {
            conv: Conv2dConfig::new([channels_in, channels_out], [3, 3])
                .with_padding(PaddingConfig2d::Same)
                .init(device),
            norm: BatchNormConfig::new(channels_out).init(device),
            pool: MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init(),
        }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.conv.forward(x);
        let x = self.norm.forward(x);
        self.pool.forward(relu(x))
    }
}

#[derive(Module, Debug)]
pub struct CrnnModel<B: Backend> {
    pub convs:      Vec<ConvBlock<B>>,
    pub projection: Linear<B>,
    pub rnn1:       BiLstm<B>,
    pub rnn2:       BiLstm<B>,
    pub classifier: Linear<B>,
    pub dropout:    Dropout,
}

impl<B: Backend> CrnnModel<B> {
    /// images: [batch, 1, height, width] → raw scores [batch, width/8, classes]
    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 3> {
        let mut x = images;
        for block in &self.convs {
            x = block.forward(x);
        }

        // [B, C, H', W'] → [B, W', C, H'] → [B, W', C·H']
        let [batch, channels, rows, cols] = x.dims();
        let x = x.permute([0, 3, 1, 2]).reshape([batch, cols, channels * rows]);

        let x = self.dropout.forward(self.projection.forward(x));

        let (x, _) = self.rnn1.forward(x, None);
        let x      = self.dropout.forward(x);
        let (x, _) = self.rnn2.forward(x, None);

        self.classifier.forward(x)
    }

    /// Returns (mean CTC loss, raw scores)
    pub fn forward_loss(
        &self,
        images:         Tensor<B, 4>,
        targets:        Tensor<B, 1, Int>,
        target_lengths: &[usize],
        ctc:            &CtcLoss,
    ) -> (Tensor<B, 1>, Tensor<B, 3>) {
        let scores    = self.forward(images);
        let log_probs = log_softmax(scores.clone(), 2);
        let loss      = ctc.forward(log_probs, targets, target_lengths);
        (loss, scores)
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::ctc::CtcLossConfig;
    use burn::{backend::NdArray, tensor::TensorData};

    type TestBackend = NdArray;

    #[test]
    fn test_time_steps() {
        assert_eq!(time_steps(120), 15);
        assert_eq!(time_steps(64), 8);
    }

    #[test]
    fn test_forward_shape() {
        let device = Default::default();
        let model  = CrnnConfig::new(27, 100).init::<TestBackend>(&device);
        let images = Tensor::<TestBackend, 4>::zeros([2, 1, 100, 120], &device);

        assert_eq!(model.forward(images).dims(), [2, 15, 27]);
    }

    #[test]
    fn test_log_probs_normalised() {
        let device = Default::default();
        let model  = CrnnConfig::new(5, 16).with_d_feature(8).with_d_hidden(4).init::<TestBackend>(&device);
        let images = Tensor::<TestBackend, 4>::random(
            [1, 1, 16, 32],
            burn::tensor::Distribution::Uniform(0.0, 1.0),
            &device,
        );

        let probs: Vec<f32> = log_softmax(model.forward(images), 2)
            .exp()
            .sum_dim(2)
            .into_data()
            .iter::<f32>()
            .collect();
        assert_eq!(probs.len(), 4);
        assert!(probs.iter().all(|p| (p - 1.0).abs() < 1e-4));
    }

    #[test]
    fn test_forward_loss_is_finite() {
        let device = Default::default();
        let model  = CrnnConfig::new(5, 16).with_d_feature(8).with_d_hidden(4).init::<TestBackend>(&device);
        let images = Tensor::<TestBackend, 4>::ones([2, 1, 16, 64], &device);
        let targets = Tensor::<TestBackend, 1, Int>::from_data(
            TensorData::new(vec![1i64, 2, 3, 4], [4]),
            &device,
        );

        let ctc          = CtcLossConfig::new().init();
        let (loss, out)  = model.forward_loss(images, targets, &[2, 2], &ctc);
        let loss: f32    = loss.into_scalar().elem();

        assert_eq!(out.dims(), [2, 8, 5]);
        assert!(loss.is_finite() && loss > 0.0);
    }
}
