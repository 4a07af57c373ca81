//! `appraise report *`: read-only pivots of the assessment store.
//!
//! Every table command prints LaTeX rows to stdout, ready to paste between
//! the study's `\begin{tabular}` fences; `agreement` prints a plain-text
//! summary. Levels render through the study's macros (`\high`, `\medium`,
//! `\low`), cells above 50% get `\cellcolor{gray!15}` shading.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Args, Subcommand};

use appraise_core::{AssessmentStore, Codebook, MetricDefinition, Taxonomy};

#[derive(Subcommand)]
pub enum ReportCommands {
    /// How often arbitrator and manual labels align with each evaluator.
    Agreement(StoreArgs),
    /// Manual level distribution per metric.
    Summary(StoreArgs),
    /// Per-metric agreement between manual and arbitrator labels.
    LlmVsHuman(StoreArgs),
    /// Level distribution per metric and publication year.
    ByYear(StoreArgs),
    /// Level distribution per metric and method-design taxonomy tag.
    ByDesign(StoreArgs),
}

#[derive(Args)]
pub struct StoreArgs {
    /// Assessment store document.
    #[arg(short = 's', long, default_value = "results/assessments.json")]
    store: PathBuf,

    /// Metric codebook document.
    #[arg(short = 'c', long, default_value = "codebook.json")]
    codebook: PathBuf,
}

pub fn run(command: ReportCommands) -> Result<()> {
    let lines = match &command {
        ReportCommands::Agreement(args) => {
            let (codebook, store) = load(args)?;
            agreement_report(&codebook, &store)
        }
        ReportCommands::Summary(args) => {
            let (codebook, store) = load(args)?;
            summary_report(&codebook, &store)
        }
        ReportCommands::LlmVsHuman(args) => {
            let (codebook, store) = load(args)?;
            llm_vs_human_report(&codebook, &store)
        }
        ReportCommands::ByYear(args) => {
            let (codebook, store) = load(args)?;
            by_year_report(&codebook, &store)
        }
        ReportCommands::ByDesign(args) => {
            let (codebook, store) = load(args)?;
            by_design_report(&codebook, &store)?
        }
    };

    for line in lines {
        println!("{line}");
    }
    Ok(())
}

fn load(args: &StoreArgs) -> Result<(Codebook, AssessmentStore)> {
    let codebook = Codebook::load(&args.codebook)
        .with_context(|| format!("loading codebook {}", args.codebook.display()))?;
    let mut store = AssessmentStore::load(&args.store)
        .with_context(|| format!("loading store {}", args.store.display()))?;
    store.canonicalize_metrics(&codebook);
    Ok((codebook, store))
}

// =============================================================================
// Shared helpers
// =============================================================================

/// The study's per-level LaTeX macro (`High` → `\high`).
fn level_macro(level: &str) -> String {
    format!("\\{}", level.to_lowercase().replace(' ', ""))
}

/// Integer-percent cell, shaded when the share exceeds 50%.
fn pct_cell(numer: usize, denom: usize) -> String {
    let pct = if denom == 0 {
        0
    } else {
        ((numer as f64 / denom as f64) * 100.0).round() as u32
    };
    if pct > 50 {
        format!("\\cellcolor{{gray!15}}{pct}")
    } else {
        pct.to_string()
    }
}

/// `metric.name` broken across lines for `\makecell`.
fn multiline_name(metric: &MetricDefinition) -> String {
    metric.name.replace(' ', "\\\\")
}

/// Ordered union of every metric's allowed values (the study uses a shared
/// High/Medium/Low scale, but nothing here requires it).
fn shared_levels(codebook: &Codebook) -> Vec<String> {
    let mut levels = Vec::new();
    for metric in codebook.metrics() {
        for value in metric.allowed_values() {
            if !levels.iter().any(|l| l == value) {
                levels.push(value.to_string());
            }
        }
    }
    levels
}

/// The manual label when set, the arbitrator label otherwise.
fn manual_or_arbitrator(entry: &appraise_core::MetricAssessment) -> Option<&str> {
    let manual = entry.manual.value.trim();
    if !manual.is_empty() {
        return Some(manual);
    }
    entry
        .arbitrator
        .as_ref()
        .map(|j| j.value.trim())
        .filter(|v| !v.is_empty())
}

// =============================================================================
// Taxonomy groups (fixed column order)
// =============================================================================

fn access(t: &Taxonomy) -> &BTreeSet<String> {
    &t.access_level
}
fn mutation(t: &Taxonomy) -> &BTreeSet<String> {
    &t.mutation_strategy
}
fn exploration(t: &Taxonomy) -> &BTreeSet<String> {
    &t.exploration_strategy
}
fn oracle(t: &Taxonomy) -> &BTreeSet<String> {
    &t.oracle
}

type TagAccessor = fn(&Taxonomy) -> &BTreeSet<String>;

const TAXONOMY_GROUPS: [(&str, &[&str], TagAccessor); 4] = [
    ("Access", &["Whitebox", "Greybox", "Blackbox"], access),
    (
        "Mutation",
        &["Feedback-informed", "Rule-based", "Generative Synthesized"],
        mutation,
    ),
    (
        "Exploration",
        &[
            "Coverage-guided",
            "Prediction-guided",
            "Oracle-guided",
            "Data-driven",
        ],
        exploration,
    ),
    ("Oracle", &["Metamorphic", "Differential", "Property-based"], oracle),
];

// =============================================================================
// agreement
// =============================================================================

fn agreement_report(codebook: &Codebook, store: &AssessmentStore) -> Vec<String> {
    let mut overall = 0usize;
    let mut disagreements = 0usize;
    let (mut arb_a, mut arb_b, mut man_a, mut man_b) = (0usize, 0usize, 0usize, 0usize);

    for (_, record) in store.papers() {
        for metric in codebook.metrics() {
            let Some(entry) = record.assessments.get(&metric.name) else {
                continue;
            };
            let value = |j: &Option<appraise_core::Judgment>| {
                j.as_ref().map(|j| j.value.to_lowercase()).unwrap_or_default()
            };
            let a = value(&entry.evaluator_a);
            let b = value(&entry.evaluator_b);
            let arb = value(&entry.arbitrator);
            let manual = entry.manual.value.to_lowercase();

            overall += 1;
            if manual == a {
                man_a += 1;
            }
            if manual == b {
                man_b += 1;
            }
            if a == b {
                continue;
            }
            disagreements += 1;
            if arb == a {
                arb_a += 1;
            }
            if arb == b {
                arb_b += 1;
            }
        }
    }

    let rate = |n: usize, d: usize| {
        if d == 0 {
            0.0
        } else {
            n as f64 / d as f64 * 100.0
        }
    };

    vec![
        "=== Overall Agreement Across All Metrics ===".to_string(),
        format!("Total comparisons: {disagreements}"),
        format!("Arbitrator = Evaluator A : {:.1}%", rate(arb_a, disagreements)),
        format!("Arbitrator = Evaluator B : {:.1}%", rate(arb_b, disagreements)),
        format!("Manual = Evaluator A     : {:.1}%", rate(man_a, overall)),
        format!("Manual = Evaluator B     : {:.1}%", rate(man_b, overall)),
    ]
}

// =============================================================================
// summary
// =============================================================================

fn summary_report(codebook: &Codebook, store: &AssessmentStore) -> Vec<String> {
    let total_papers = store.len();
    // metric -> level -> count of manual labels
    let mut counts: BTreeMap<&str, BTreeMap<&str, usize>> = BTreeMap::new();

    for (_, record) in store.papers() {
        for metric in codebook.metrics() {
            let Some(entry) = record.assessments.get(&metric.name) else {
                continue;
            };
            if let Some(level) = metric.canonical_value(&entry.manual.value) {
                *counts
                    .entry(metric.name.as_str())
                    .or_default()
                    .entry(level)
                    .or_default() += 1;
            }
        }
    }

    let mut rows = Vec::new();
    for level in shared_levels(codebook) {
        let mut cells = vec![format!("{level} ({})", level_macro(&level))];
        for metric in codebook.metrics() {
            let count = counts
                .get(metric.name.as_str())
                .and_then(|by_level| by_level.get(level.as_str()))
                .copied()
                .unwrap_or(0);
            let pct = if total_papers == 0 {
                0.0
            } else {
                count as f64 / total_papers as f64 * 100.0
            };
            cells.push(format!("{pct:.0}\\%"));
        }
        rows.push(format!("{} \\\\", cells.join(" & ")));
    }
    rows
}

// =============================================================================
// llm-vs-human
// =============================================================================

fn llm_vs_human_report(codebook: &Codebook, store: &AssessmentStore) -> Vec<String> {
    let mut rows = Vec::new();
    let (mut overall_agree, mut overall_total) = (0usize, 0usize);

    for metric in codebook.metrics() {
        let (mut agree, mut total) = (0usize, 0usize);
        for (_, record) in store.papers() {
            let Some(entry) = record.assessments.get(&metric.name) else {
                continue;
            };
            let Some(arbitrator) = entry.arbitrator.as_ref() else {
                continue;
            };
            total += 1;
            if entry.manual.value == arbitrator.value {
                agree += 1;
            }
        }

        let rate = if total == 0 {
            0.0
        } else {
            agree as f64 / total as f64 * 100.0
        };
        rows.push(format!("{} & {agree}/{total} ({rate:.1}\\%) \\\\", metric.name));
        overall_agree += agree;
        overall_total += total;
    }

    let overall_rate = if overall_total == 0 {
        0.0
    } else {
        overall_agree as f64 / overall_total as f64 * 100.0
    };
    rows.push("\\hline".to_string());
    rows.push(format!(
        "\\textbf{{Overall}} & \\textbf{{{overall_agree}/{overall_total} ({overall_rate:.1}\\%)}} \\\\"
    ));
    rows
}

// =============================================================================
// by-year
// =============================================================================

fn by_year_report(codebook: &Codebook, store: &AssessmentStore) -> Vec<String> {
    // metric -> year -> level -> count
    let mut counts: BTreeMap<&str, BTreeMap<i32, BTreeMap<&str, usize>>> = BTreeMap::new();
    let mut years: BTreeSet<i32> = BTreeSet::new();

    for (_, record) in store.papers() {
        if record.year <= 0 {
            continue;
        }
        years.insert(record.year);
        for metric in codebook.metrics() {
            let Some(entry) = record.assessments.get(&metric.name) else {
                continue;
            };
            let Some(raw) = manual_or_arbitrator(entry) else {
                continue;
            };
            let Some(level) = metric.canonical_value(raw) else {
                continue;
            };
            *counts
                .entry(metric.name.as_str())
                .or_default()
                .entry(record.year)
                .or_default()
                .entry(level)
                .or_default() += 1;
        }
    }

    let mut rows = Vec::new();
    for metric in codebook.metrics() {
        let levels: Vec<&str> = metric.allowed_values().collect();
        for (i, level) in levels.iter().enumerate() {
            let lead = if i == 0 {
                format!(
                    "\\multirow{{{}}}{{*}}{{\\makecell[l]{{{}}}}}",
                    levels.len(),
                    multiline_name(metric)
                )
            } else {
                String::new()
            };

            let mut cells = vec![format!("{lead} & {}", level_macro(level))];
            for year in &years {
                let by_level = counts
                    .get(metric.name.as_str())
                    .and_then(|by_year| by_year.get(year));
                let total: usize = by_level.map(|m| m.values().sum()).unwrap_or(0);
                let count = by_level.and_then(|m| m.get(level)).copied().unwrap_or(0);
                cells.push(pct_cell(count, total));
            }
            rows.push(format!("{} \\\\", cells.join(" & ")));
        }
        rows.push("\\hline".to_string());
    }
    rows
}

// =============================================================================
// by-design
// =============================================================================

fn by_design_report(codebook: &Codebook, store: &AssessmentStore) -> Result<Vec<String>> {
    // metric -> group -> tag -> level -> count, plus per-tag totals
    #[allow(clippy::type_complexity)]
    let mut counts: BTreeMap<&str, BTreeMap<&str, BTreeMap<&str, BTreeMap<&str, usize>>>> =
        BTreeMap::new();
    let mut totals: BTreeMap<&str, BTreeMap<&str, BTreeMap<&str, usize>>> = BTreeMap::new();

    for (identity, record) in store.papers() {
        for metric in codebook.metrics() {
            let Some(entry) = record.assessments.get(&metric.name) else {
                continue;
            };
            let Some(level) = metric.canonical_value(&entry.manual.value) else {
                continue;
            };

            for &(group, known_tags, tags_of) in &TAXONOMY_GROUPS {
                for raw_tag in tags_of(&record.taxonomy) {
                    let Some(&tag) = known_tags.iter().find(|&&k| k == raw_tag.as_str()) else {
                        bail!("paper {identity:?} carries unrecognized {group} tag {raw_tag:?}");
                    };
                    *totals
                        .entry(metric.name.as_str())
                        .or_default()
                        .entry(group)
                        .or_default()
                        .entry(tag)
                        .or_default() += 1;
                    *counts
                        .entry(metric.name.as_str())
                        .or_default()
                        .entry(group)
                        .or_default()
                        .entry(tag)
                        .or_default()
                        .entry(level)
                        .or_default() += 1;
                }
            }
        }
    }

    let mut rows = Vec::new();
    for metric in codebook.metrics() {
        let levels: Vec<&str> = metric.allowed_values().collect();
        for (i, level) in levels.iter().enumerate() {
            let lead = if i == 0 {
                format!(
                    "\\multirow{{{}}}{{*}}{{\\makecell[l]{{{}}}}}",
                    levels.len(),
                    multiline_name(metric)
                )
            } else {
                String::new()
            };

            let mut cells = vec![format!("{lead} & {}", level_macro(level))];
            for &(group, known_tags, _) in &TAXONOMY_GROUPS {
                for &tag in known_tags {
                    let denom = totals
                        .get(metric.name.as_str())
                        .and_then(|g| g.get(group))
                        .and_then(|t| t.get(tag))
                        .copied()
                        .unwrap_or(0);
                    let numer = counts
                        .get(metric.name.as_str())
                        .and_then(|g| g.get(group))
                        .and_then(|t| t.get(tag))
                        .and_then(|l| l.get(level))
                        .copied()
                        .unwrap_or(0);
                    cells.push(pct_cell(numer, denom));
                }
            }
            rows.push(format!("{} \\\\", cells.join(" & ")));
        }
        rows.push("\\hline".to_string());
    }
    Ok(rows)
}

// =============================================================================
// Tests
// =============================================================================
