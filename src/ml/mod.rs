// ============================================================
// Layer 5 — ML / Model Layer (Burn)
// ============================================================
// All Burn model, loss and training code lives here.
//
//   model.rs      — CRNN: conv stack → BiLSTM ×2 → class scores
//                   per time step (one step per 8 image columns)
//
//   ctc.rs        — CTC loss from tensor ops, so autodiff
//                   handles the backward pass
//
//   decoder.rs    — Greedy CTC decoding: argmax, collapse
//                   repeats, drop blanks
//
//   trainer.rs    — Training loop with AdamW, step decay,
//                   early stopping and best-model checkpoints
//
//   inferencer.rs — Loads a checkpoint and reads new images
//
// Reference: Burn Book §3 (Building Blocks), §5 (Training)

/// CRNN architecture
pub mod model;

/// Connectionist Temporal Classification loss
pub mod ctc;

/// Greedy CTC decoder
pub mod decoder;

/// Full training loop with validation and checkpointing
pub mod trainer;

/// Inference engine — loads checkpoint and reads CAPTCHAs
pub mod inferencer;
