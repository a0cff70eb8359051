// ============================================================
// Layer 6 — Infrastructure Layer
// ============================================================
// Persistence shared by training and inference:
//
//   checkpoint.rs — Best-model weights (Burn CompactRecorder)
//                   plus the TrainConfig JSON that inference
//                   needs to rebuild the model and vocabulary.
//
//   metrics.rs    — Per-epoch CSV log (loss, accuracy, lr).

/// Model checkpoint saving and loading
pub mod checkpoint;

/// Training metrics CSV logger
pub mod metrics;
