// ============================================================
// Layer 2 — PredictUseCase
// ============================================================
// Reads CAPTCHAs with a trained checkpoint:
//   - predict_one: a single image file → recognised text
//   - evaluate:    every row of a labels table → exact-match
//                  accuracy over the whole table

use anyhow::Result;
use std::path::Path;

use crate::data::labels::LabelsTable;
use crate::domain::traits::{SampleSource, TextRecognizer};
use crate::infra::checkpoint::CheckpointManager;
use crate::ml::inferencer::Inferencer;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvaluationReport {
    pub correct: usize,
    pub total:   usize,
}

impl EvaluationReport {
    /// 0.0 for an empty table
    pub fn accuracy(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.correct as f64 / self.total as f64
        }
    }
}

pub struct PredictUseCase<R: TextRecognizer = Inferencer> {
    recognizer: R,
}

impl PredictUseCase<Inferencer> {
    /// Load the model now; a missing checkpoint fails here.
    pub fn new(checkpoint_dir: &Path) -> Result<Self> {
        let ckpt_manager = CheckpointManager::new(checkpoint_dir);
        let inferencer   = Inferencer::from_checkpoint(&ckpt_manager)?;
        Ok(Self { recognizer: inferencer })
    }
}

impl<R: TextRecognizer> PredictUseCase<R> {
    pub fn with_recognizer(recognizer: R) -> Self {
        Self { recognizer }
    }

    pub fn predict_one(&self, image_path: &Path) -> Result<String> {
        self.recognizer.recognize_file(image_path)
    }

    pub fn evaluate(&self, labels_path: &Path, images_dir: &Path) -> Result<EvaluationReport> {
        let samples = LabelsTable::new(labels_path).load_all()?;
        let mut report = EvaluationReport { correct: 0, total: 0 };

        for sample in &samples {
            let predicted = self.recognizer.recognize_file(&images_dir.join(&sample.filename))?;
            if predicted == sample.label {
                report.correct += 1;
            } else {
                tracing::debug!("{}: expected '{}', got '{}'", sample.filename, sample.label, predicted);
            }
            report.total += 1;
        }

        tracing::info!("Evaluated {} images", report.total);
        Ok(report)
    }
}
