// ============================================================
// Layer 4 — Data Pipeline
// ============================================================
// Everything from a font file or a labels table to
// tensor batches:
//
//   font file
//       │
//       ▼
//   CaptchaGenerator  → renders labelled images (generate)
//       │
//       ▼
//   labels.csv + images/
//       │
//       ▼
//   LabelsTable       → reads (filename, label) rows
//       │
//       ▼
//   split_train_val   → seeded 80/20 split
//       │
//       ▼
//   CaptchaDataset    → grayscale, resize, augment, normalise
//       │
//       ▼
//   CaptchaBatcher    → images + concatenated targets
//       │
//       ▼
//   DataLoader        → feeds batches to the training loop
//
// Reference: Burn Book §4 (Datasets and Dataloaders)

/// Synthetic CAPTCHA rendering with ab_glyph + imageproc
pub mod generator;

/// Reads and writes the `filename,label` CSV
pub mod labels;

/// Grayscale/resize/normalise and training augmentation
pub mod preprocessor;

/// Implements Burn's Dataset trait for CAPTCHA samples
pub mod dataset;

/// Implements Burn's Batcher trait to create tensor batches
pub mod batcher;

/// Shuffles and splits data into train/validation sets
pub mod splitter;
