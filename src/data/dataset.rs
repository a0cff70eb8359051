use anyhow::{bail, Context, Result};
use burn::data::dataset::Dataset;
use image::GrayImage;
use std::path::Path;

use crate::data::preprocessor::{Augmentation, Preprocessor};
use crate::domain::sample::LabelledSample;
use crate::domain::vocabulary::Vocabulary;

/// One preprocessed sample: normalised pixels plus its encoded label.
#[derive(Debug, Clone)]
pub struct CaptchaItem {
    /// Row-major grayscale intensities, length = width * height
    pub pixels:  Vec<f32>,
    /// Vocabulary indices of the label (blank never appears)
    pub targets: Vec<usize>,
    pub label:   String,
}

#[derive(Debug, Clone)]
struct Entry {
    image:   GrayImage,
    targets: Vec<usize>,
    label:   String,
}

/// Labelled CAPTCHA images held in memory at model resolution.
///
/// Decoding and resizing happen once, when the dataset is built, so a
/// missing or corrupt file stops the run before training starts.
/// Augmentation (if any) and normalisation run on every `get`.
pub struct CaptchaDataset {
    entries:      Vec<Entry>,
    preprocessor: Preprocessor,
    augmentation: Option<Augmentation>,
}

impl CaptchaDataset {
    pub fn load(
        samples:      &[LabelledSample],
        image_dir:    &Path,
        preprocessor: Preprocessor,
        vocab:        &Vocabulary,
    ) -> Result<Self> {
        let mut entries = Vec::with_capacity(samples.len());

        for (i, sample) in samples.iter().enumerate() {
            let path = image_dir.join(&sample.filename);
            if !path.is_file() {
                bail!("Image '{}' listed in the labels table does not exist", path.display());
            }

            let targets = vocab.encode(&sample.label)?;
            let image   = image::open(&path)
                .with_context(|| format!("Cannot decode image '{}'", path.display()))?;

            entries.push(Entry {
                image: preprocessor.prepare(&image),
                targets,
                label: sample.label.clone(),
            });

            if (i + 1) % 5000 == 0 {
                tracing::debug!("Decoded {}/{} images", i + 1, samples.len());
            }
        }

        Ok(Self { entries, preprocessor, augmentation: None })
    }

    /// Build from already decoded images (resized here if needed).
    pub fn from_images(
        images:       Vec<(GrayImage, String)>,
        preprocessor: Preprocessor,
        vocab:        &Vocabulary,
    ) -> Result<Self> {
        let entries = images
            .into_iter()
            .map(|(image, label)| {
                let targets = vocab.encode(&label)?;
                let image   = preprocessor.prepare(&image::DynamicImage::ImageLuma8(image));
                Ok(Entry { image, targets, label })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { entries, preprocessor, augmentation: None })
    }

    /// Enable random augmentation on every `get`
    pub fn with_augmentation(mut self, augmentation: Augmentation) -> Self {
        self.augmentation = Some(augmentation);
        self
    }

    /// Length of the longest label in the dataset
    pub fn max_label_len(&self) -> usize {
        self.entries.iter().map(|e| e.targets.len()).max().unwrap_or(0)
    }
}

impl Dataset<CaptchaItem> for CaptchaDataset {
    fn get(&self, index: usize) -> Option<CaptchaItem> {
        let entry = self.entries.get(index)?;

        let pixels = match &self.augmentation {
            Some(aug) => {
                let augmented = aug.apply(&entry.image, &mut rand::thread_rng());
                self.preprocessor.to_pixels(&augmented)
            }
            None => self.preprocessor.to_pixels(&entry.image),
        };

        Some(CaptchaItem {
            pixels,
            targets: entry.targets.clone(),
            label:   entry.label.clone(),
        })
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}
