// ============================================================
// Layer 5 — CTC Loss
// ============================================================
// Connectionist Temporal Classification loss, written with
// Burn tensor ops so autodiff provides the gradient.
//
// A label l = (l1 .. lL) is extended with blanks:
//     l' = (∅, l1, ∅, l2, ∅, ..., lL, ∅)        |l'| = 2L + 1
//
// The forward variable α_t(s) is the log-probability of all
// alignment prefixes of length t+1 that end in l'_s:
//
//   α_0(0) = y_0(∅)     α_0(1) = y_0(l1)     α_0(s>1) = -∞
//   α_t(s) = logsumexp(α_{t-1}(s), α_{t-1}(s-1), α_{t-1}(s-2)*)
//            + y_t(l'_s)
//
//   * the s-2 term is allowed only when l'_s is not blank and
//     l'_s != l'_{s-2} (a repeated symbol needs a blank between)
//
//   -log p(l | x) = -logsumexp(α_{T-1}(2L), α_{T-1}(2L-1))
//
// The batch is processed at once: labels are padded to the
// longest one with blanks, and each sample's end positions are
// gathered from its own length.
//
// Reduction: each sample's loss is divided by its label length,
// then averaged over the batch. Labels that cannot fit in T
// steps give an "infinite" loss, which is replaced by zero.
//
// Reference: Graves et al. (2006) Connectionist Temporal Classification

use burn::{prelude::*, tensor::TensorData};

/// Stand-in for -∞ that keeps exp/log and their gradients finite
const NEG_INF: f32 = -1.0e30;

/// Losses above this only arise from unreachable alignments
const INFEASIBLE: f32 = 1.0e29;

#[derive(Config, Debug)]
pub struct CtcLossConfig {
    /// Class index of the blank symbol
    #[config(default = 0)]
    pub blank: usize,

    /// Replace infinite losses (label too long for T) with zero
    #[config(default = true)]
    pub zero_infinity: bool,
}

impl CtcLossConfig {
    pub fn init(&self) -> CtcLoss {
        CtcLoss { blank: self.blank, zero_infinity: self.zero_infinity }
    }
}

#[derive(Clone, Debug)]
pub struct CtcLoss {
    blank:         usize,
    zero_infinity: bool,
}

impl CtcLoss {
    /// log_probs:      [batch, time, classes], log-softmax over classes
    /// targets:        all label sequences concatenated
    /// target_lengths: length of each sample's label, in batch order
    ///
    /// Returns the mean loss as a one-element tensor.
    pub fn forward<B: Backend>(
        &self,
        log_probs:      Tensor<B, 3>,
        targets:        Tensor<B, 1, Int>,
        target_lengths: &[usize],
    ) -> Tensor<B, 1> {
        let flat: Vec<i64> = targets.into_data().iter::<i64>().collect();
        self.forward_flat(log_probs, &flat, target_lengths)
    }

    /// Same as `forward`, with the flat targets already on the host
    pub fn forward_flat<B: Backend>(
        &self,
        log_probs:      Tensor<B, 3>,
        targets:        &[i64],
        target_lengths: &[usize],
    ) -> Tensor<B, 1> {
        let per_sample = self.per_sample(log_probs, targets, target_lengths);
        let device     = per_sample.device();
        let batch      = target_lengths.len();

        let lengths: Vec<f32> = target_lengths.iter().map(|&l| l.max(1) as f32).collect();
        let lengths = Tensor::<B, 1>::from_data(TensorData::new(lengths, [batch]), &device);

        (per_sample / lengths).mean()
    }

    /// Negative log-likelihood of each sample, shape [batch]
    pub fn per_sample<B: Backend>(
        &self,
        log_probs:      Tensor<B, 3>,
        targets:        &[i64],
        target_lengths: &[usize],
    ) -> Tensor<B, 1> {
        let device = log_probs.device();
        let [batch, steps, _classes] = log_probs.dims();
        debug_assert_eq!(batch, target_lengths.len(), "one target length per batch element");
        debug_assert_eq!(
            targets.len(),
            target_lengths.iter().sum::<usize>(),
            "target lengths must cover the flat targets",
        );

        let blank          = self.blank as i64;
        let (ext, width)   = extend_targets(targets, target_lengths, blank);
        let skip           = skip_mask(&ext, width, blank);
        let (ends, endmsk) = end_positions(target_lengths);

        let ext  = Tensor::<B, 2, Int>::from_data(TensorData::new(ext, [batch, width]), &device);
        let skip = Tensor::<B, 2>::from_data(TensorData::new(skip, [batch, width]), &device);

        // emissions[b, t, s] = log_probs[b, t, l'_s]
        let index     = ext.unsqueeze_dim::<3>(1).expand([batch, steps, width]);
        let emissions = log_probs.gather(2, index);

        let start: Vec<f32> = (0..batch)
            .flat_map(|_| (0..width).map(|s| if s < 2 { 0.0 } else { NEG_INF }))
            .collect();
        let start = Tensor::<B, 2>::from_data(TensorData::new(start, [batch, width]), &device);

        let emit_at = |t: usize| {
            emissions.clone().slice([0..batch, t..t + 1, 0..width]).reshape([batch, width])
        };

        let mut alpha = emit_at(0) + start;
        for t in 1..steps {
            let stay = alpha.clone();
            let step = shift_right(alpha.clone(), 1);
            let jump = shift_right(alpha, 2) + skip.clone();
            alpha = log_sum_exp(Tensor::stack::<3>(vec![stay, step, jump], 2)) + emit_at(t);
        }

        let ends   = Tensor::<B, 2, Int>::from_data(TensorData::new(ends, [batch, 2]), &device);
        let endmsk = Tensor::<B, 2>::from_data(TensorData::new(endmsk, [batch, 2]), &device);
        let last   = alpha.gather(1, ends) + endmsk;
        let nll    = log_sum_exp(last.unsqueeze_dim::<3>(1)).reshape([batch]).neg();

        if self.zero_infinity {
            let infeasible = nll.clone().greater_elem(INFEASIBLE);
            nll.mask_fill(infeasible, 0.0)
        } else {
            nll
        }
    }
}

/// Interleave every label with blanks and pad to the longest one.
/// Returns the row-major [batch, width] table and width = 2 * max_len + 1.
pub fn extend_targets(targets: &[i64], lengths: &[usize], blank: i64) -> (Vec<i64>, usize) {
    let max_len = lengths.iter().copied().max().unwrap_or(0);
    let width   = 2 * max_len + 1;

    let mut ext    = vec![blank; lengths.len() * width];
    let mut offset = 0;
    for (b, &len) in lengths.iter().enumerate() {
        for (i, &label) in targets[offset..offset + len].iter().enumerate() {
            ext[b * width + 2 * i + 1] = label;
        }
        offset += len;
    }
    (ext, width)
}

/// 0 where α may jump two positions, -∞ elsewhere
pub fn skip_mask(ext: &[i64], width: usize, blank: i64) -> Vec<f32> {
    ext.chunks(width)
        .flat_map(|row| {
            (0..width).map(move |s| {
                if s >= 2 && row[s] != blank && row[s] != row[s - 2] {
                    0.0
                } else {
                    NEG_INF
                }
            })
        })
        .collect()
}

/// Final positions (trailing blank, last label) per sample.
/// An empty label has only the single blank position.
fn end_positions(lengths: &[usize]) -> (Vec<i64>, Vec<f32>) {
    let mut index = Vec::with_capacity(lengths.len() * 2);
    let mut mask  = Vec::with_capacity(lengths.len() * 2);
    for &len in lengths {
        let last = 2 * len as i64;
        index.extend([last, (last - 1).max(0)]);
        mask.extend([0.0, if len > 0 { 0.0 } else { NEG_INF }]);
    }
    (index, mask)
}

/// Move columns right by `k`, filling the vacated columns with -∞
fn shift_right<B: Backend>(x: Tensor<B, 2>, k: usize) -> Tensor<B, 2> {
    let [batch, width] = x.dims();
    let device = x.device();
    if k >= width {
        return Tensor::full([batch, width], NEG_INF, &device);
    }
    let pad  = Tensor::full([batch, k], NEG_INF, &device);
    let kept = x.slice([0..batch, 0..width - k]);
    Tensor::cat(vec![pad, kept], 1)
}

/// Numerically stable log(sum(exp(x))) over the last dimension
fn log_sum_exp<B: Backend>(x: Tensor<B, 3>) -> Tensor<B, 2> {
    let [d0, d1, _] = x.dims();
    let max = x.clone().max_dim(2).detach();
    let lse = (x - max.clone()).exp().sum_dim(2).log() + max;
    lse.reshape([d0, d1])
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::{Autodiff, NdArray};
    use burn::tensor::{activation::log_softmax, Distribution};

    type TestBackend = NdArray;

    fn uniform(batch: usize, steps: usize, classes: usize) -> Tensor<TestBackend, 3> {
        let lp = (1.0 / classes as f32).ln();
        Tensor::full([batch, steps, classes], lp, &Default::default())
    }

    fn scalar(t: Tensor<TestBackend, 1>) -> f32 {
        t.into_data().iter::<f32>().next().unwrap()
    }

    #[test]
    fn test_extend_targets_interleaves_blanks() {
        let (ext, width) = extend_targets(&[1, 2, 3, 4, 5], &[2, 3], 0);
        assert_eq!(width, 7);
        assert_eq!(&ext[..7], &[0, 1, 0, 2, 0, 0, 0]);
        assert_eq!(&ext[7..], &[0, 3, 0, 4, 0, 5, 0]);
    }

    #[test]
    fn test_skip_mask_blocks_repeats() {
        // l' = ∅ a ∅ a ∅: the second 'a' must not be reached by a jump
        let mask = skip_mask(&[0, 1, 0, 1, 0], 5, 0);
        assert!(mask.iter().all(|&m| m == NEG_INF));

        // l' = ∅ a ∅ b ∅: 'b' may be reached from 'a'
        let mask = skip_mask(&[0, 1, 0, 2, 0], 5, 0);
        assert_eq!(mask[3], 0.0);
        assert_eq!(mask[2], NEG_INF);
    }

    #[test]
    fn test_single_step_single_label() {
        // Only alignment: [a] with probability 1/2
        let loss = CtcLossConfig::new().init().forward_flat(uniform(1, 1, 2), &[1], &[1]);
        assert!((scalar(loss) - 2f32.ln()).abs() < 1e-5);
    }

    #[test]
    fn test_two_steps_counts_all_alignments() {
        // Alignments of "a" in 2 steps: aa, ∅a, a∅ → 3 × (1/3)^2 = 1/3
        let loss = CtcLossConfig::new().init().forward_flat(uniform(1, 2, 3), &[1], &[1]);
        assert!((scalar(loss) - 3f32.ln()).abs() < 1e-5);
    }

    #[test]
    fn test_repeated_label_requires_blank() {
        // "aa" in 3 steps has the single alignment a∅a → (1/2)^3,
        // divided by the label length 2
        let loss = CtcLossConfig::new().init().forward_flat(uniform(1, 3, 2), &[1, 1], &[2]);
        let expected = 3.0 * 2f32.ln() / 2.0;
        assert!((scalar(loss) - expected).abs() < 1e-4);
    }

    #[test]
    fn test_infeasible_label_is_zeroed() {
        let ctc  = CtcLossConfig::new().init();
        let loss = ctc.per_sample(uniform(1, 1, 3), &[1, 2], &[2]);
        assert_eq!(scalar(loss), 0.0);

        let strict = CtcLossConfig::new().with_zero_infinity(false).init();
        let loss   = strict.per_sample(uniform(1, 1, 3), &[1, 2], &[2]);
        assert!(scalar(loss) > INFEASIBLE);
    }

    #[test]
    fn test_variable_lengths_in_one_batch() {
        // Sample 0: "a" over 2 steps → ln 3
        // Sample 1: "ab" over 2 steps → only "ab" → 2 ln 3
        let ctc  = CtcLossConfig::new().init();
        let loss = ctc.per_sample(uniform(2, 2, 3), &[1, 1, 2], &[1, 2]);
        let values: Vec<f32> = loss.into_data().iter::<f32>().collect();
        assert!((values[0] - 3f32.ln()).abs() < 1e-5);
        assert!((values[1] - 2.0 * 3f32.ln()).abs() < 1e-5);

        // Mean of per-length losses: (ln3 / 1 + 2 ln3 / 2) / 2 = ln 3
        let mean = ctc.forward_flat(uniform(2, 2, 3), &[1, 1, 2], &[1, 2]);
        assert!((scalar(mean) - 3f32.ln()).abs() < 1e-5);
    }

    #[test]
    fn test_int_tensor_targets() {
        let device  = Default::default();
        let targets = Tensor::<TestBackend, 1, Int>::from_data(TensorData::new(vec![1i64], [1]), &device);
        let loss    = CtcLossConfig::new().init().forward(uniform(1, 2, 3), targets, &[1]);
        assert!((scalar(loss) - 3f32.ln()).abs() < 1e-5);
    }

    #[test]
    fn test_gradient_flows_to_logits() {
        type Ad = Autodiff<NdArray>;
        let device = Default::default();
        let logits = Tensor::<Ad, 3>::random([2, 6, 4], Distribution::Normal(0.0, 1.0), &device)
            .require_grad();

        let loss  = CtcLossConfig::new()
            .init()
            .forward_flat(log_softmax(logits.clone(), 2), &[1, 2, 3, 3], &[2, 2]);
        let grads = loss.backward();

        let grad = logits.grad(&grads).unwrap();
        assert_eq!(grad.dims(), [2, 6, 4]);
        let values: Vec<f32> = grad.into_data().iter::<f32>().collect();
        assert!(values.iter().all(|v| v.is_finite()));
        assert!(values.iter().any(|v| v.abs() > 0.0));
    }
}
