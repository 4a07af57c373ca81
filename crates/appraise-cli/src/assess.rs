//! `appraise assess`: the evaluate → compare → reconcile pipeline.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;

use appraise_core::{AssessmentStore, Codebook, ResponseCache};
use appraise_llm::{AssessmentPipeline, PipelineOptions, RunSummary};

#[derive(Args)]
pub struct AssessArgs {
    /// Directory of paper documents (`*.pdf`).
    #[arg(short = 'p', long, default_value = "papers")]
    paper_directory: PathBuf,

    /// Metric codebook document.
    #[arg(short = 'c', long, default_value = "codebook.json")]
    codebook: PathBuf,

    /// Assessment store document (read if present, rewritten after every
    /// metric finalization).
    #[arg(short = 'o', long, default_value = "results/assessments.json")]
    output_json: PathBuf,

    /// Directory for raw backend-response envelopes.
    #[arg(long, default_value = "llm_responses")]
    responses_dir: PathBuf,

    /// Recompute metrics that are already finalized.
    #[arg(long = "override")]
    override_finalized: bool,

    /// Ignore cached raw responses and re-invoke the backends.
    #[arg(long)]
    no_cache: bool,
}

pub fn run(args: AssessArgs) -> Result<()> {
    let codebook = Codebook::load(&args.codebook)
        .with_context(|| format!("loading codebook {}", args.codebook.display()))?;

    let mut store = AssessmentStore::load(&args.output_json)
        .with_context(|| format!("loading store {}", args.output_json.display()))?;
    store.canonicalize_metrics(&codebook);

    let cache = ResponseCache::open(&args.responses_dir)
        .with_context(|| format!("opening response cache {}", args.responses_dir.display()))?;

    let (evaluator_a, evaluator_b, arbiter) = backends()?;

    let options = PipelineOptions {
        override_finalized: args.override_finalized,
        no_cache: args.no_cache,
    };

    let summary = AssessmentPipeline::new(
        &codebook,
        &mut store,
        &cache,
        evaluator_a,
        evaluator_b,
        arbiter,
        options,
    )
    .run(&args.paper_directory)
    .context("assessment run aborted")?;

    print_summary(&summary);
    Ok(())
}

#[cfg(all(feature = "llm-openai", feature = "llm-anthropic"))]
fn backends() -> Result<(
    Box<dyn appraise_llm::Evaluator>,
    Box<dyn appraise_llm::Evaluator>,
    Box<dyn appraise_llm::Arbiter>,
)> {
    use std::sync::Arc;

    let openai = Arc::new(
        appraise_llm::OpenAiEvaluator::from_env().context("configuring evaluator A (openai)")?,
    );
    let anthropic = appraise_llm::AnthropicEvaluator::from_env()
        .context("configuring evaluator B (anthropic)")?;
    // Arbitration rides the same backend family as evaluator A and shares
    // its per-paper upload memo.
    let arbiter = appraise_llm::OpenAiArbiter::new(openai.clone());

    Ok((Box::new(openai), Box::new(anthropic), Box::new(arbiter)))
}

#[cfg(not(all(feature = "llm-openai", feature = "llm-anthropic")))]
fn backends() -> Result<(
    Box<dyn appraise_llm::Evaluator>,
    Box<dyn appraise_llm::Evaluator>,
    Box<dyn appraise_llm::Arbiter>,
)> {
    anyhow::bail!(
        "this build has no hosted LLM backends; rebuild with the `llm-openai` and `llm-anthropic` features"
    )
}

fn print_summary(summary: &RunSummary) {
    println!("{}", "assessment run complete".green().bold());
    println!("  papers processed     {}", summary.papers_seen);
    println!("  metrics finalized    {}", summary.metrics_finalized);
    println!("  already finalized    {}", summary.skipped_finalized);
    if summary.skipped_unparseable > 0 {
        println!(
            "  unparseable outputs  {}",
            summary.skipped_unparseable.to_string().yellow()
        );
    }
    if summary.backend_failures > 0 {
        println!(
            "  backend failures     {}",
            summary.backend_failures.to_string().yellow()
        );
    }
    if summary.quarantined_papers > 0 {
        println!(
            "  quarantined papers   {}",
            summary.quarantined_papers.to_string().red()
        );
    }
}
