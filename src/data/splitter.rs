// ============================================================
// Layer 4 — Train/Validation Splitter
// ============================================================
// Randomly shuffles samples and splits them into two sets:
//   - Training set:   used to update model weights
//   - Validation set: drives early stopping and checkpointing
//
// The validation share is rounded down, so a table of 30 001
// rows with a 0.2 fraction gives 6 000 validation samples.
// A fixed seed makes the split reproducible between runs.
//
// Reference: rand crate documentation (SliceRandom, SeedableRng)

use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};

/// Shuffle `samples` with `seed` and split into (train, validation).
///
/// # Arguments
/// * `samples`      - All available samples (consumed by this function)
/// * `val_fraction` - Proportion for validation, e.g. 0.2 = 20%
pub fn split_train_val<T>(mut samples: Vec<T>, val_fraction: f64, seed: u64) -> (Vec<T>, Vec<T>) {
    let mut rng = StdRng::seed_from_u64(seed);
    samples.shuffle(&mut rng);

    let total    = samples.len();
    let val_size = ((total as f64) * val_fraction.clamp(0.0, 1.0)).floor() as usize;

    // split_off(n) leaves [0..n] in `samples` and returns [n..total]
    let val = samples.split_off(total - val_size);

    tracing::debug!(
        "Dataset split: {} training, {} validation",
        samples.len(),
        val.len(),
    );

    (samples, val)
}
