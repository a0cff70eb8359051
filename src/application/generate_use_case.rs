// ============================================================
// Layer 2 — GenerateUseCase
// ============================================================
// Produces a synthetic training set:
//
//   <output_dir>/
//     images/captcha_00001.png
//     images/captcha_00002.png
//     ...
//     labels.csv            ← filename,label
//
// The font is loaded before anything is written, so a bad
// font path leaves no partial output behind.

use anyhow::{bail, Context, Result};
use rand::{rngs::StdRng, SeedableRng};
use std::{fs, path::PathBuf, sync::Arc};

use crate::data::{
    generator::{CaptchaGenerator, CaptchaStyle},
    labels::LabelsWriter,
};
use crate::domain::{
    sample::LabelledSample,
    vocabulary::{Vocabulary, LOWERCASE},
};

const PROGRESS_EVERY: usize = 1000;

#[derive(Debug, Clone)]
pub struct GenerateConfig {
    pub font_path:  PathBuf,
    pub output_dir: PathBuf,
    pub count:      usize,
    /// Fixed seed for a reproducible set; entropy otherwise
    pub seed:       Option<u64>,
    pub alphabet:   String,
    pub style:      CaptchaStyle,
}

impl Default for GenerateConfig {
    fn default() -> Self {
        Self {
            font_path:  PathBuf::from("fonts/captcha.ttf"),
            output_dir: PathBuf::from("data"),
            count:      30_000,
            seed:       None,
            alphabet:   LOWERCASE.to_string(),
            style:      CaptchaStyle::default(),
        }
    }
}

/// File name of the `idx`-th generated image; numbering starts at 1
pub fn image_name(idx: usize) -> String {
    format!("captcha_{idx:05}.png")
}

pub struct GenerateUseCase {
    config: GenerateConfig,
}

impl GenerateUseCase {
    pub fn new(config: GenerateConfig) -> Self {
        Self { config }
    }

    /// Returns the path of the written labels table
    pub fn execute(&self) -> Result<PathBuf> {
        let cfg = &self.config;
        if cfg.style.chars_per_image == 0 {
            bail!("chars_per_image must be at least 1");
        }

        let vocab     = Arc::new(Vocabulary::new(&cfg.alphabet)?);
        let generator = CaptchaGenerator::from_font_file(&cfg.font_path, cfg.style.clone(), vocab)?;
        let style     = generator.style();
        tracing::info!(
            "Font '{}' loaded; {} chars per {}x{} image",
            cfg.font_path.display(),
            style.chars_per_image,
            style.width,
            style.height,
        );

        let images_dir = cfg.output_dir.join("images");
        fs::create_dir_all(&images_dir)
            .with_context(|| format!("Cannot create '{}'", images_dir.display()))?;

        let labels_path = cfg.output_dir.join("labels.csv");
        let mut labels  = LabelsWriter::create(&labels_path)?;

        let mut rng = match cfg.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None       => StdRng::from_entropy(),
        };

        for idx in 1..=cfg.count {
            let (text, image) = generator.generate(&mut rng);
            let name = image_name(idx);
            let path = images_dir.join(&name);

            image
                .save(&path)
                .with_context(|| format!("Cannot write '{}'", path.display()))?;
            labels.append(&LabelledSample::new(name, text))?;

            if idx % PROGRESS_EVERY == 0 {
                tracing::info!("Generated {}/{} images", idx, cfg.count);
            }
        }

        let rows = labels.finish()?;
        tracing::info!("Wrote {} rows to '{}'", rows, labels_path.display());
        Ok(labels_path)
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::labels::LabelsTable;
    use crate::domain::traits::SampleSource;

    #[test]
    fn test_image_name_is_zero_padded() {
        assert_eq!(image_name(1), "captcha_00001.png");
        assert_eq!(image_name(123), "captcha_00123.png");
        assert_eq!(image_name(30_000), "captcha_30000.png");
    }

    #[test]
    fn test_generated_set_is_numbered_from_one() {
        let Some(font_path) = crate::data::generator::system_font() else {
            return;
        };
        let dir = tempfile::tempdir().unwrap();
        let cfg = GenerateConfig {
            font_path,
            output_dir: dir.path().to_path_buf(),
            count:      3,
            seed:       Some(7),
            ..GenerateConfig::default()
        };

        let labels_path = GenerateUseCase::new(cfg).execute().unwrap();
        let rows = LabelsTable::new(&labels_path).load_all().unwrap();

        let names: Vec<_> = rows.iter().map(|r| r.filename.as_str()).collect();
        assert_eq!(names, ["captcha_00001.png", "captcha_00002.png", "captcha_00003.png"]);
        assert!(!dir.path().join("images").join("captcha_00000.png").exists());
        for row in &rows {
            assert!(dir.path().join("images").join(&row.filename).is_file());
            assert_eq!(row.label_len(), 4);
        }
    }

    #[test]
    fn test_missing_font_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out");
        let cfg = GenerateConfig {
            font_path:  dir.path().join("missing.ttf"),
            output_dir: out.clone(),
            count:      3,
            ..GenerateConfig::default()
        };

        assert!(GenerateUseCase::new(cfg).execute().is_err());
        assert!(!out.exists());
    }
}
