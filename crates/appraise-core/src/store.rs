//! The assessment store: one JSON document mapping paper identity to
//! [`PaperRecord`], the single source of truth for every downstream report.
//!
//! The store is exposed as a typed repository (`get` / `upsert` / `flush`)
//! rather than as a mutable map, so in-memory mutation is decoupled from
//! persistence cadence. The orchestrator flushes after every metric
//! finalization, which makes progress crash-resumable at metric granularity.
//! Persistence is a full-document rewrite through a temp file and rename;
//! this is only correct under a single-writer assumption.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, warn};

use crate::catalog::Codebook;
use crate::model::{Judgment, MetricAssessment, PaperRecord};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("paper {identity:?} is not present in the assessment store")]
    UnknownPaper { identity: String },
    #[error("failed to read store {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("store {path} is not valid JSON: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to write store {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to serialize store: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// The automated judgments committed together when a metric finalizes.
#[derive(Debug, Clone)]
pub struct AutomatedBundle {
    pub evaluator_a: Judgment,
    pub evaluator_b: Judgment,
    pub arbitrator: Judgment,
}

/// In-memory view of the store document, bound to its on-disk path.
pub struct AssessmentStore {
    path: PathBuf,
    papers: BTreeMap<String, PaperRecord>,
}

impl AssessmentStore {
    /// Load the store document, or start empty when the file does not exist
    /// yet (first run / resume-from-cache).
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let papers = if path.exists() {
            let text = fs::read_to_string(&path).map_err(|source| StoreError::Read {
                path: path.display().to_string(),
                source,
            })?;
            serde_json::from_str(&text).map_err(|source| StoreError::Parse {
                path: path.display().to_string(),
                source,
            })?
        } else {
            BTreeMap::new()
        };
        Ok(Self { path, papers })
    }

    /// Rebind the store to a different output path (used by `reset`, which
    /// never overwrites its input document).
    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = path.into();
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Merge assessments recorded under legacy metric names into their
    /// canonical entries. The canonical entry wins on conflict, except that
    /// a non-empty legacy manual judgment fills an empty canonical one —
    /// human annotations are never silently dropped.
    pub fn canonicalize_metrics(&mut self, codebook: &Codebook) {
        for (identity, record) in &mut self.papers {
            let legacy: Vec<String> = record
                .assessments
                .keys()
                .filter(|name| codebook.canonical_name(name) != name.as_str())
                .cloned()
                .collect();

            for old_name in legacy {
                let new_name = codebook.canonical_name(&old_name).to_string();
                let entry = record
                    .assessments
                    .remove(&old_name)
                    .unwrap_or_default();
                debug!(paper = %identity, from = %old_name, to = %new_name, "canonicalized metric name");

                match record.assessments.get_mut(&new_name) {
                    None => {
                        record.assessments.insert(new_name, entry);
                    }
                    Some(existing) => {
                        if existing.manual.is_empty() && !entry.manual.is_empty() {
                            existing.manual = entry.manual;
                        } else if !entry.manual.is_empty() && entry.manual != existing.manual {
                            warn!(
                                paper = %identity,
                                metric = %new_name,
                                "conflicting manual judgments under legacy name; keeping canonical"
                            );
                        }
                    }
                }
            }
        }
    }

    pub fn contains(&self, identity: &str) -> bool {
        self.papers.contains_key(identity)
    }

    pub fn get(&self, identity: &str) -> Option<&PaperRecord> {
        self.papers.get(identity)
    }

    pub fn get_mut(&mut self, identity: &str) -> Option<&mut PaperRecord> {
        self.papers.get_mut(identity)
    }

    /// Iterate (identity, record) in identity order.
    pub fn papers(&self) -> impl Iterator<Item = (&str, &PaperRecord)> {
        self.papers.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn papers_mut(&mut self) -> impl Iterator<Item = (&str, &mut PaperRecord)> {
        self.papers.iter_mut().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.papers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.papers.is_empty()
    }

    pub fn is_finalized(&self, identity: &str, metric: &str) -> bool {
        self.papers
            .get(identity)
            .and_then(|record| record.assessments.get(metric))
            .map(MetricAssessment::is_finalized)
            .unwrap_or(false)
    }

    /// Commit a finalized metric. Creates the empty manual placeholder on
    /// first write; existing manual judgments (current and prior rounds) are
    /// preserved verbatim, override runs included.
    pub fn upsert(
        &mut self,
        identity: &str,
        metric: &str,
        bundle: AutomatedBundle,
    ) -> Result<(), StoreError> {
        let record = self
            .papers
            .get_mut(identity)
            .ok_or_else(|| StoreError::UnknownPaper {
                identity: identity.to_string(),
            })?;

        let entry = record.assessments.entry(metric.to_string()).or_default();
        entry.evaluator_a = Some(bundle.evaluator_a);
        entry.evaluator_b = Some(bundle.evaluator_b);
        entry.arbitrator = Some(bundle.arbitrator);
        Ok(())
    }

    /// Rewrite the full store document atomically (temp file + rename).
    /// Serialization is deterministic: identical in-memory state always
    /// produces identical bytes.
    pub fn flush(&self) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|source| StoreError::Write {
                    path: self.path.display().to_string(),
                    source,
                })?;
            }
        }

        let mut text = serde_json::to_string_pretty(&self.papers)?;
        text.push('\n');

        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, text).map_err(|source| StoreError::Write {
            path: tmp.display().to_string(),
            source,
        })?;
        fs::rename(&tmp, &self.path).map_err(|source| StoreError::Write {
            path: self.path.display().to_string(),
            source,
        })?;
        Ok(())
    }
}
