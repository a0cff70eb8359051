// ============================================================
// Layer 1 — CLI Commands and Arguments
// ============================================================
// Defines the three subcommands: `generate`, `train` and
// `predict`, and all their configurable flags.
//
// Each *Args struct converts into a plain application config,
// so the application layer never sees clap types.

use clap::{Args, Subcommand};
use std::path::PathBuf;

use crate::application::{generate_use_case::GenerateConfig, train_use_case::TrainConfig};
use crate::data::generator::{parse_hex_color, CaptchaStyle};
use crate::domain::vocabulary::LOWERCASE;

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Render a synthetic labelled CAPTCHA dataset
    Generate(GenerateArgs),

    /// Train the CRNN on a labelled CAPTCHA dataset
    Train(TrainArgs),

    /// Read CAPTCHAs with a trained checkpoint
    Predict(PredictArgs),
}

// ─── generate ─────────────────────────────────────────────────────────────────
#[derive(Args, Debug)]
pub struct GenerateArgs {
    /// TrueType/OpenType font used for the glyphs
    #[arg(long)]
    pub font: PathBuf,

    /// Receives images/ and labels.csv
    #[arg(long, default_value = "data")]
    pub output_dir: PathBuf,

    #[arg(long, default_value_t = 30_000)]
    pub count: usize,

    /// Seed for a reproducible dataset
    #[arg(long)]
    pub seed: Option<u64>,

    #[arg(long, default_value = LOWERCASE)]
    pub alphabet: String,

    #[arg(long, default_value_t = 4)]
    pub chars_per_image: usize,

    /// Background colour as #RRGGBB
    #[arg(long, default_value = "#036CDF", value_parser = parse_hex_color)]
    pub background: [u8; 3],

    /// Glyph colour as #RRGGBB
    #[arg(long, default_value = "#FFFFFF", value_parser = parse_hex_color)]
    pub foreground: [u8; 3],
}

impl From<GenerateArgs> for GenerateConfig {
    fn from(a: GenerateArgs) -> Self {
        GenerateConfig {
            font_path:  a.font,
            output_dir: a.output_dir,
            count:      a.count,
            seed:       a.seed,
            alphabet:   a.alphabet,
            style:      CaptchaStyle {
                chars_per_image: a.chars_per_image,
                background:      a.background,
                foreground:      a.foreground,
                ..CaptchaStyle::default()
            },
        }
    }
}

// ─── train ────────────────────────────────────────────────────────────────────
#[derive(Args, Debug)]
pub struct TrainArgs {
    /// CSV with header `filename,label`
    #[arg(long, default_value = "data/labels.csv")]
    pub labels: PathBuf,

    /// Directory the labels table's filenames are relative to
    #[arg(long, default_value = "data/images")]
    pub images: PathBuf,

    /// Receives best_model.mpk, train_config.json and metrics.csv
    #[arg(long, default_value = "checkpoints")]
    pub checkpoint_dir: PathBuf,

    /// Symbols the model can emit (the blank is added on top)
    #[arg(long, default_value = LOWERCASE)]
    pub alphabet: String,

    #[arg(long, default_value_t = 120)]
    pub image_width: u32,

    #[arg(long, default_value_t = 100)]
    pub image_height: u32,

    #[arg(long, default_value_t = 64)]
    pub batch_size: usize,

    /// Upper bound; early stopping usually ends the run sooner
    #[arg(long, default_value_t = 50)]
    pub epochs: usize,

    #[arg(long, default_value_t = 1e-3)]
    pub lr: f64,

    /// Epochs between learning-rate decays
    #[arg(long, default_value_t = 10)]
    pub lr_step: usize,

    /// Factor applied at each decay
    #[arg(long, default_value_t = 0.5)]
    pub lr_gamma: f64,

    #[arg(long, default_value_t = 1e-4)]
    pub weight_decay: f64,

    /// Non-improving epochs tolerated before stopping
    #[arg(long, default_value_t = 5)]
    pub patience: usize,

    #[arg(long, default_value_t = 0.2)]
    pub val_fraction: f64,

    /// Seed for the train/validation split and batch shuffling
    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    #[arg(long, default_value_t = 4)]
    pub num_workers: usize,

    /// Disable random affine and brightness augmentation
    #[arg(long)]
    pub no_augment: bool,

    #[arg(long, default_value_t = 256)]
    pub d_feature: usize,

    /// LSTM hidden size per direction
    #[arg(long, default_value_t = 128)]
    pub d_hidden: usize,

    #[arg(long, default_value_t = 0.3)]
    pub dropout: f64,
}

impl From<TrainArgs> for TrainConfig {
    fn from(a: TrainArgs) -> Self {
        TrainConfig {
            labels_path:    a.labels,
            images_dir:     a.images,
            checkpoint_dir: a.checkpoint_dir,
            alphabet:       a.alphabet,
            image_width:    a.image_width,
            image_height:   a.image_height,
            batch_size:     a.batch_size,
            epochs:         a.epochs,
            lr:             a.lr,
            lr_step:        a.lr_step,
            lr_gamma:       a.lr_gamma,
            weight_decay:   a.weight_decay,
            patience:       a.patience,
            val_fraction:   a.val_fraction,
            seed:           a.seed,
            num_workers:    a.num_workers,
            augment:        !a.no_augment,
            d_feature:      a.d_feature,
            d_hidden:       a.d_hidden,
            dropout:        a.dropout,
        }
    }
}

// ─── predict ──────────────────────────────────────────────────────────────────
#[derive(Args, Debug)]
pub struct PredictArgs {
    /// Image to read
    #[arg(short, long, required_unless_present = "batch", conflicts_with = "batch")]
    pub image: Option<PathBuf>,

    /// Evaluate every row of a labels table instead of one image
    #[arg(short, long)]
    pub batch: bool,

    #[arg(long, default_value = "data/labels.csv")]
    pub labels: PathBuf,

    #[arg(long, default_value = "data/images")]
    pub images: PathBuf,

    #[arg(long, default_value = "checkpoints")]
    pub checkpoint_dir: PathBuf,
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use crate::cli::Cli;
    use super::*;
    use clap::Parser;

    #[test]
    fn test_train_defaults() {
        let cli = Cli::try_parse_from(["captcha-ocr", "train"]).unwrap();
        let Commands::Train(args) = cli.command else { panic!("expected train") };

        let cfg: TrainConfig = args.into();
        let def = TrainConfig::default();
        assert_eq!(cfg.batch_size, def.batch_size);
        assert_eq!(cfg.epochs, def.epochs);
        assert_eq!(cfg.alphabet, def.alphabet);
        assert!(cfg.augment);
    }

    #[test]
    fn test_generate_colours() {
        let cli = Cli::try_parse_from([
            "captcha-ocr", "generate", "--font", "f.ttf", "--count", "5", "--background", "#000000",
        ])
        .unwrap();
        let Commands::Generate(args) = cli.command else { panic!("expected generate") };

        let cfg: GenerateConfig = args.into();
        assert_eq!(cfg.count, 5);
        assert_eq!(cfg.style.background, [0, 0, 0]);
        assert_eq!(cfg.style.foreground, [255, 255, 255]);
        assert_eq!(cfg.seed, None);
    }

    #[test]
    fn test_predict_needs_image_or_batch() {
        assert!(Cli::try_parse_from(["captcha-ocr", "predict"]).is_err());
        assert!(Cli::try_parse_from(["captcha-ocr", "predict", "--image", "x.png"]).is_ok());
        assert!(Cli::try_parse_from(["captcha-ocr", "predict", "--batch"]).is_ok());
        assert!(Cli::try_parse_from(["captcha-ocr", "predict", "-i", "x.png", "-b"]).is_err());
    }
}
