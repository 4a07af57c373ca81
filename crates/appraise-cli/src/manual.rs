//! `appraise manual`: inspect human annotations.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use colored::Colorize;

use appraise_core::AssessmentStore;

#[derive(Subcommand)]
pub enum ManualCommands {
    /// List metrics that have a prior-round manual judgment but no current
    /// one — the re-review backlog after a `reset`.
    Show(ShowArgs),
}

#[derive(Args)]
pub struct ShowArgs {
    /// Assessment store document.
    #[arg(short = 's', long, default_value = "results/assessments.json")]
    store: PathBuf,
}

pub fn run(command: ManualCommands) -> Result<()> {
    match command {
        ManualCommands::Show(args) => show(args),
    }
}

fn show(args: ShowArgs) -> Result<()> {
    let store = AssessmentStore::load(&args.store)
        .with_context(|| format!("loading store {}", args.store.display()))?;

    let mut pending = 0usize;
    for (_, record) in store.papers() {
        let mut printed_header = false;
        for (metric, entry) in &record.assessments {
            let Some(prior) = entry.prior_manual.as_ref() else {
                continue;
            };
            if prior.rationale.is_empty() || !entry.manual.rationale.is_empty() {
                continue;
            }
            pending += 1;

            if !printed_header {
                println!("{}", "=".repeat(40));
                println!("Key: {}", record.key.bold());
                println!("{}", "=".repeat(40));
                printed_header = true;
            }
            println!("Metric: {}", metric.cyan());
            println!("{}", "-".repeat(40));
            println!("manual1:");
            println!("  value    : {}", prior.value);
            println!("  rationale: {}", prior.rationale);
            println!();
            println!("manual:");
            println!("  value    : {}", or_na(&entry.manual.value));
            println!("  rationale: {}", or_na(&entry.manual.rationale));
            println!();
        }
        if printed_header {
            println!();
        }
    }

    if pending == 0 {
        println!("{}", "no metrics awaiting re-review".green());
    }
    Ok(())
}

fn or_na(value: &str) -> &str {
    if value.is_empty() {
        "N/A"
    } else {
        value
    }
}
