// ============================================================
// Layer 1 — CLI / Presentation Layer
// ============================================================
// Parses the command line with clap and routes each
// subcommand to its use case in Layer 2:
//
//   train   — train or resume training
//   eval    — score a trained model on test / dev
//   sample  — generate tunes from a trained model

pub mod commands;

use anyhow::Result;
use clap::Parser;
use commands::{Commands, EvalArgs, SampleArgs, TrainArgs};

#[derive(Parser, Debug)]
#[command(
    name = "abc-rnn",
    version,
    about = "Train recurrent models on tokenized tunes, evaluate them and sample new ones."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Dispatch to the use case; this layer only routes and prints.
    pub fn run(self) -> Result<()> {
        match self.command {
            Commands::Train(args)  => run_train(args),
            Commands::Eval(args)   => run_eval(args),
            Commands::Sample(args) => run_sample(args),
        }
    }
}

fn run_train(args: TrainArgs) -> Result<()> {
    use crate::application::train_use_case::TrainUseCase;

    let report = TrainUseCase::new(args.into()).execute()?;
    if report.epochs_run() == 0 {
        println!("Nothing to do: every configured epoch is already checkpointed.");
    } else {
        println!(
            "Training complete: epochs {}..{} checkpointed.",
            report.start_epoch,
            report.start_epoch + report.epochs_run() - 1
        );
    }
    Ok(())
}

fn run_eval(args: EvalArgs) -> Result<()> {
    use crate::application::eval_use_case::EvalUseCase;

    let split = args.split;
    let summary = EvalUseCase::new(args.into()).execute()?;
    println!("{} set accuracy: {}", split, summary.accuracy);
    Ok(())
}

fn run_sample(args: SampleArgs) -> Result<()> {
    use crate::application::sample_use_case::SampleUseCase;

    let tunes = SampleUseCase::new(args.into()).execute()?;
    for (i, tune) in tunes.iter().enumerate() {
        println!("\n── Tune {} ({:?}) ──", i + 1, tune.stop);
        if !tune.meta.is_empty() {
            println!("Metadata: {:?}", tune.meta);
        }
        println!("{}", tune.text());
    }
    Ok(())
}
