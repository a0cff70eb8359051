// ============================================================
// Layer 3 — Core Traits (Abstractions)
// ============================================================
// The application layer talks to these traits rather than to
// concrete loaders and models:
//   - LabelsTable implements SampleSource
//   - Inferencer  implements TextRecognizer
//
// Reference: Rust Book §10 (Traits: Defining Shared Behaviour)

use anyhow::{Context, Result};
use image::DynamicImage;
use std::path::Path;

use crate::domain::sample::LabelledSample;

// ─── SampleSource ─────────────────────────────────────────────────────────────
/// Any component that can list labelled samples.
pub trait SampleSource {
    /// Load every (filename, label) pair from this source.
    fn load_all(&self) -> Result<Vec<LabelledSample>>;
}

// ─── TextRecognizer ───────────────────────────────────────────────────────────
/// Any component that can read the text inside a CAPTCHA image.
pub trait TextRecognizer {
    /// Recognise the text in an already decoded image.
    fn recognize(&self, image: &DynamicImage) -> Result<String>;

    /// Open an image file and recognise its text.
    fn recognize_file(&self, path: &Path) -> Result<String> {
        let image = image::open(path)
            .with_context(|| format!("Cannot open image '{}'", path.display()))?;
        self.recognize(&image)
    }
}
