// ============================================================
// Layer 1 — CLI / Presentation Layer
// ============================================================
// Entry point for all user interaction. Arguments are parsed
// with clap; every command is delegated to Layer 2.
//
//   1. `generate` — render a synthetic labelled dataset
//   2. `train`    — fit the CRNN and keep the best checkpoint
//   3. `predict`  — read one image, or score a labels table

pub mod commands;

use anyhow::Result;
use clap::Parser;
use commands::{Commands, GenerateArgs, PredictArgs, TrainArgs};

#[derive(Parser, Debug)]
#[command(
    name = "captcha-ocr",
    version,
    about = "Generate synthetic CAPTCHAs, train a CRNN + CTC reader, and read CAPTCHAs."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Dispatch to the matching use case; the CLI layer only routes.
    pub fn run(self) -> Result<()> {
        match self.command {
            Commands::Generate(args) => run_generate(args),
            Commands::Train(args)    => run_train(args),
            Commands::Predict(args)  => run_predict(args),
        }
    }
}

fn run_generate(args: GenerateArgs) -> Result<()> {
    use crate::application::generate_use_case::GenerateUseCase;

    tracing::info!("Generating {} CAPTCHAs into '{}'", args.count, args.output_dir.display());
    let labels = GenerateUseCase::new(args.into()).execute()?;

    println!("Dataset written. Labels table: {}", labels.display());
    Ok(())
}

fn run_train(args: TrainArgs) -> Result<()> {
    use crate::application::train_use_case::TrainUseCase;

    tracing::info!("Starting training on '{}'", args.labels.display());
    let checkpoint_dir = args.checkpoint_dir.clone();
    TrainUseCase::new(args.into()).execute()?;

    println!("Training complete. Best model in '{}'.", checkpoint_dir.display());
    Ok(())
}

fn run_predict(args: PredictArgs) -> Result<()> {
    use crate::application::predict_use_case::PredictUseCase;

    let use_case = PredictUseCase::new(&args.checkpoint_dir)?;

    if args.batch {
        let report = use_case.evaluate(&args.labels, &args.images)?;
        println!(
            "Accuracy: {}/{} ({:.2}%)",
            report.correct,
            report.total,
            report.accuracy() * 100.0,
        );
    } else if let Some(image) = args.image {
        println!("{}", use_case.predict_one(&image)?);
    }
    Ok(())
}
