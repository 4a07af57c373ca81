//! The assessment pipeline: for every paper × every unfinalized metric,
//! query both evaluators (cache-governed), compare, reconcile on
//! disagreement, persist.
//!
//! Per (paper, metric) the state machine is:
//!
//! ```text
//! Unassessed ──► DualEvaluated ──┬─ values agree ──► Finalized (arbitrator := A)
//!                                └─ values differ ─► Finalized (arbitrator := arbitration)
//! ```
//!
//! `Finalized` is terminal unless the override option is set. The store is
//! flushed in full after every finalization, so a crash resumes at metric
//! granularity; cached raw responses make the resume free of backend calls.
//!
//! Failure policy: backend and parse failures skip the metric and the run
//! continues; papers missing from the store are moved to a quarantine
//! directory (never deleted); persistence failures abort immediately.

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{error, info, warn};

use appraise_core::{
    AssessmentStore, AutomatedBundle, CacheError, CacheStatus, Codebook, Judgment, ResponseCache,
    StoreError, ARBITER_TAG,
};

use crate::arbiter::Arbiter;
use crate::evaluate::{Evaluator, PaperDocument};
use crate::extract::parse_judgment;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("failed to list paper directory {path}: {source}")]
    ListPapers {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to quarantine {path}: {source}")]
    Quarantine {
        path: String,
        #[source]
        source: std::io::Error,
    },
    /// Store rewrite failed: abort before further progress is claimed.
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Cache(#[from] CacheError),
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PipelineOptions {
    /// Recompute metrics that are already finalized. Manual judgments are
    /// still preserved.
    pub override_finalized: bool,
    /// Ignore cached raw responses and re-invoke backends. Fresh responses
    /// still overwrite the cache.
    pub no_cache: bool,
}

/// Per-run tallies, reported to the operator at the end of `assess`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub papers_seen: usize,
    pub metrics_finalized: usize,
    pub skipped_finalized: usize,
    pub skipped_unparseable: usize,
    pub backend_failures: usize,
    pub quarantined_papers: usize,
}

/// Outcome of one raw-response acquisition: either usable text or a skip.
enum RawOutcome {
    Text(String),
    Skip,
}

pub struct AssessmentPipeline<'a> {
    codebook: &'a Codebook,
    store: &'a mut AssessmentStore,
    cache: &'a ResponseCache,
    evaluator_a: Box<dyn Evaluator>,
    evaluator_b: Box<dyn Evaluator>,
    arbiter: Box<dyn Arbiter>,
    options: PipelineOptions,
}

impl<'a> AssessmentPipeline<'a> {
    pub fn new(
        codebook: &'a Codebook,
        store: &'a mut AssessmentStore,
        cache: &'a ResponseCache,
        evaluator_a: Box<dyn Evaluator>,
        evaluator_b: Box<dyn Evaluator>,
        arbiter: Box<dyn Arbiter>,
        options: PipelineOptions,
    ) -> Self {
        Self {
            codebook,
            store,
            cache,
            evaluator_a,
            evaluator_b,
            arbiter,
            options,
        }
    }

    /// Process every `.pdf` under `papers_dir` in sorted order.
    pub fn run(&mut self, papers_dir: &Path) -> Result<RunSummary, PipelineError> {
        let mut summary = RunSummary::default();

        for path in list_papers(papers_dir)? {
            let Some(paper) = PaperDocument::from_path(&path) else {
                warn!(path = %path.display(), "skipping document without a usable file stem");
                continue;
            };

            if !self.store.contains(&paper.identity) {
                error!(
                    paper = %paper.identity,
                    path = %path.display(),
                    "paper has no catalog entry in the store; quarantining"
                );
                quarantine(papers_dir, &path)?;
                summary.quarantined_papers += 1;
                continue;
            }

            summary.papers_seen += 1;
            self.process_paper(&paper, &mut summary)?;
        }

        Ok(summary)
    }

    fn process_paper(
        &mut self,
        paper: &PaperDocument,
        summary: &mut RunSummary,
    ) -> Result<(), PipelineError> {
        // contains() was checked by the caller.
        let paper_key = match self.store.get(&paper.identity) {
            Some(record) => record.key.clone(),
            None => return Ok(()),
        };
        info!(paper = %paper.identity, key = %paper_key, "processing paper");

        // Collect metric refs up front; `self` is mutably borrowed below.
        let metrics: Vec<_> = self.codebook.metrics().collect();
        for metric in metrics {
            if !self.options.override_finalized
                && self.store.is_finalized(&paper.identity, &metric.name)
            {
                info!(paper = %paper.identity, metric = %metric.name, "already finalized, skipping");
                summary.skipped_finalized += 1;
                continue;
            }

            let raw_a = self.obtain_evaluation(paper, &paper_key, metric, &*self.evaluator_a, summary)?;
            let RawOutcome::Text(raw_a) = raw_a else { continue };
            let raw_b = self.obtain_evaluation(paper, &paper_key, metric, &*self.evaluator_b, summary)?;
            let RawOutcome::Text(raw_b) = raw_b else { continue };

            let Some(judgment_a) =
                self.parse_or_demote(&paper_key, metric, self.evaluator_a.name(), &raw_a, summary)?
            else {
                continue;
            };
            let Some(judgment_b) =
                self.parse_or_demote(&paper_key, metric, self.evaluator_b.name(), &raw_b, summary)?
            else {
                continue;
            };

            // Exact, case-sensitive agreement finalizes directly; anything
            // else goes to arbitration.
            let authoritative = if judgment_a.value == judgment_b.value {
                judgment_a.clone()
            } else {
                let raw = self.obtain_arbitration(paper, &paper_key, metric, &judgment_a, &judgment_b, summary)?;
                let RawOutcome::Text(raw) = raw else { continue };
                let Some(judgment) =
                    self.parse_or_demote(&paper_key, metric, ARBITER_TAG, &raw, summary)?
                else {
                    continue;
                };
                judgment
            };

            self.store.upsert(
                &paper.identity,
                &metric.name,
                AutomatedBundle {
                    evaluator_a: judgment_a,
                    evaluator_b: judgment_b,
                    arbitrator: authoritative,
                },
            )?;
            self.store.flush()?;
            info!(paper = %paper.identity, metric = %metric.name, "finalized");
            summary.metrics_finalized += 1;
        }

        Ok(())
    }

    /// Get an evaluator's raw response from the cache or a fresh call. The
    /// raw text is written to the cache before any parsing happens, success
    /// or not.
    fn obtain_evaluation(
        &self,
        paper: &PaperDocument,
        paper_key: &str,
        metric: &appraise_core::MetricDefinition,
        evaluator: &dyn Evaluator,
        summary: &mut RunSummary,
    ) -> Result<RawOutcome, PipelineError> {
        let tag = evaluator.name();
        if let Some(hit) = self.cached(paper_key, &metric.name, tag) {
            return Ok(RawOutcome::Text(hit));
        }

        match evaluator.evaluate(paper, metric) {
            Ok(raw) => {
                self.cache
                    .put(paper_key, &metric.name, tag, CacheStatus::Ok, raw.clone())?;
                Ok(RawOutcome::Text(raw))
            }
            Err(err) => {
                warn!(
                    paper = %paper.identity,
                    metric = %metric.name,
                    backend = tag,
                    error = %err,
                    "backend call failed; metric skipped this run"
                );
                self.cache.put(
                    paper_key,
                    &metric.name,
                    tag,
                    CacheStatus::BackendError,
                    err.to_string(),
                )?;
                summary.backend_failures += 1;
                Ok(RawOutcome::Skip)
            }
        }
    }

    fn obtain_arbitration(
        &self,
        paper: &PaperDocument,
        paper_key: &str,
        metric: &appraise_core::MetricDefinition,
        a: &Judgment,
        b: &Judgment,
        summary: &mut RunSummary,
    ) -> Result<RawOutcome, PipelineError> {
        if let Some(hit) = self.cached(paper_key, &metric.name, ARBITER_TAG) {
            return Ok(RawOutcome::Text(hit));
        }

        match self.arbiter.arbitrate(paper, metric, a, b) {
            Ok(raw) => {
                self.cache.put(
                    paper_key,
                    &metric.name,
                    ARBITER_TAG,
                    CacheStatus::Ok,
                    raw.clone(),
                )?;
                Ok(RawOutcome::Text(raw))
            }
            Err(err) => {
                warn!(
                    paper = %paper.identity,
                    metric = %metric.name,
                    error = %err,
                    "arbitration call failed; metric skipped this run"
                );
                self.cache.put(
                    paper_key,
                    &metric.name,
                    ARBITER_TAG,
                    CacheStatus::BackendError,
                    err.to_string(),
                )?;
                summary.backend_failures += 1;
                Ok(RawOutcome::Skip)
            }
        }
    }

    fn cached(&self, paper_key: &str, metric: &str, tag: &str) -> Option<String> {
        if self.options.no_cache {
            return None;
        }
        let entry = self.cache.get(paper_key, metric, tag)?;
        if entry.is_reusable() {
            info!(key = %paper_key, metric = %metric, tag = %tag, "reusing cached response");
            Some(entry.raw)
        } else {
            None
        }
    }

    /// Parse raw text into a judgment; on failure demote the cache entry so
    /// a later run retries the backend instead of replaying bad text.
    fn parse_or_demote(
        &self,
        paper_key: &str,
        metric: &appraise_core::MetricDefinition,
        tag: &str,
        raw: &str,
        summary: &mut RunSummary,
    ) -> Result<Option<Judgment>, PipelineError> {
        match parse_judgment(raw) {
            Ok(judgment) => Ok(Some(judgment)),
            Err(err) => {
                warn!(
                    key = %paper_key,
                    metric = %metric.name,
                    tag = %tag,
                    error = %err,
                    "response not reducible to a judgment; metric skipped this run"
                );
                self.cache
                    .demote(paper_key, &metric.name, tag, CacheStatus::Unparseable)?;
                summary.skipped_unparseable += 1;
                Ok(None)
            }
        }
    }
}

fn list_papers(dir: &Path) -> Result<Vec<PathBuf>, PipelineError> {
    let entries = std::fs::read_dir(dir).map_err(|source| PipelineError::ListPapers {
        path: dir.display().to_string(),
        source,
    })?;

    let mut papers = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|source| PipelineError::ListPapers {
            path: dir.display().to_string(),
            source,
        })?;
        let path = entry.path();
        let is_pdf = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.eq_ignore_ascii_case("pdf"))
            .unwrap_or(false);
        if path.is_file() && is_pdf {
            papers.push(path);
        }
    }
    papers.sort();
    Ok(papers)
}

/// Move an unrecognized document into `<dir>/quarantine/` for operator
/// review. Never deletes.
fn quarantine(dir: &Path, path: &Path) -> Result<(), PipelineError> {
    let qdir = dir.join("quarantine");
    let into_err = |source: std::io::Error| PipelineError::Quarantine {
        path: path.display().to_string(),
        source,
    };

    std::fs::create_dir_all(&qdir).map_err(into_err)?;
    let file_name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| std::ffi::OsString::from("unnamed.pdf"));
    std::fs::rename(path, qdir.join(file_name)).map_err(into_err)?;
    Ok(())
}
