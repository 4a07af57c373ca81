//! `appraise reset`: prepare a fresh annotation round.
//!
//! Strips every automated judgment and moves the current `manual` slot to
//! `manual1`, so the next pipeline run re-assesses from scratch while the
//! previous round's human labels stay available for comparison. The result
//! is written to a separate document; the input store is never touched.

use std::mem;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;

use appraise_core::AssessmentStore;

#[derive(Args)]
pub struct ResetArgs {
    /// Assessment store document to read.
    #[arg(short = 's', long, default_value = "results/assessments.json")]
    store: PathBuf,

    /// Output document. Defaults to `<store stem>_cleaned.json` next to the
    /// input.
    #[arg(short = 'o', long)]
    out: Option<PathBuf>,
}

pub fn run(args: ResetArgs) -> Result<()> {
    let out = args.out.unwrap_or_else(|| cleaned_path(&args.store));

    let mut store = AssessmentStore::load(&args.store)
        .with_context(|| format!("loading store {}", args.store.display()))?;

    let mut stripped = 0usize;
    let mut carried = 0usize;
    for (_, record) in store.papers_mut() {
        for entry in record.assessments.values_mut() {
            let had_automated = entry.evaluator_a.is_some()
                || entry.evaluator_b.is_some()
                || entry.arbitrator.is_some();
            entry.evaluator_a = None;
            entry.evaluator_b = None;
            entry.arbitrator = None;
            if had_automated {
                stripped += 1;
            }
            // Carry the manual label into the prior-round slot. An empty
            // manual never clobbers an existing prior round.
            if !entry.manual.is_empty() {
                entry.prior_manual = Some(mem::take(&mut entry.manual));
                carried += 1;
            }
        }
    }

    store
        .with_path(&out)
        .flush()
        .with_context(|| format!("writing {}", out.display()))?;

    println!(
        "{}: stripped {} automated assessments, carried {} manual judgments to manual1, wrote {}",
        "reset".green().bold(),
        stripped,
        carried,
        out.display()
    );
    Ok(())
}

fn cleaned_path(store: &std::path::Path) -> PathBuf {
    let stem = store
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "assessments".to_string());
    store.with_file_name(format!("{stem}_cleaned.json"))
}
