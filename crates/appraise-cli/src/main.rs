//! Appraise CLI
//!
//! One binary for the whole study workflow:
//! - `assess`: run the dual-evaluator + arbitration pipeline over a paper
//!   directory, persisting the assessment store after every metric.
//! - `report *`: pivot the store into LaTeX rows / agreement summaries.
//! - `reset`: strip automated judgments for a re-annotation round.
//! - `manual show`: list metrics awaiting re-review.

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::error;
use tracing_subscriber::EnvFilter;

mod assess;
mod manual;
mod report;
mod reset;

#[derive(Parser)]
#[command(name = "appraise")]
#[command(
    author,
    version,
    about = "Codebook-driven LLM assessment of research papers"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Assess every paper in a directory against every codebook metric.
    Assess(assess::AssessArgs),

    /// Read-only pivots of the assessment store (LaTeX rows on stdout).
    Report {
        #[command(subcommand)]
        command: report::ReportCommands,
    },

    /// Strip automated judgments for a new annotation round, moving `manual`
    /// to `manual1`. Writes to a separate document, never in place.
    Reset(reset::ResetArgs),

    /// Inspect human annotations.
    Manual {
        #[command(subcommand)]
        command: manual::ManualCommands,
    },
}

fn main() {
    init_tracing();

    if let Err(err) = run() {
        error!(error = %err, "command failed");
        for cause in err.chain().skip(1) {
            error!(cause = %cause, "caused by");
        }
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Assess(args) => assess::run(args),
        Commands::Report { command } => report::run(command),
        Commands::Reset(args) => reset::run(args),
        Commands::Manual { command } => manual::run(command),
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
