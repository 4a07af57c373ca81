//! Serialized data model of the assessment store.
//!
//! These shapes are a contract with the downstream reporting consumers:
//! every paper record exposes `name`, `key`, `year`, `citation_count`, the
//! four taxonomy tag sets, and `assessments[metric].manual.value`.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

/// A single structured verdict about one paper under one metric.
///
/// Produced by an evaluator backend, by arbitration, or by a human reviewer.
/// Immutable once recorded: the pipeline replaces whole judgments, it never
/// edits their fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Judgment {
    /// Assigned value. Usually one of the metric's allowed values, but
    /// arbitration is licensed to pick an out-of-set value when neither
    /// evaluator's choice fits.
    #[serde(default)]
    pub value: String,
    /// Reasoning behind the value. Older store documents used the key `why`.
    #[serde(alias = "why", default)]
    pub rationale: String,
    /// Direct evidence from the paper (quote, section name, page number).
    #[serde(default)]
    pub evidence: String,
}

impl Judgment {
    pub fn new(
        value: impl Into<String>,
        rationale: impl Into<String>,
        evidence: impl Into<String>,
    ) -> Self {
        Self {
            value: value.into(),
            rationale: rationale.into(),
            evidence: evidence.into(),
        }
    }

    /// True for the untouched manual placeholder.
    pub fn is_empty(&self) -> bool {
        self.value.is_empty() && self.rationale.is_empty() && self.evidence.is_empty()
    }
}

/// Judgment bundle for one (paper, metric) pair.
///
/// The automated slots are written together when a metric finalizes; the
/// `manual` slot belongs to the human reviewer and is never written by the
/// pipeline once it holds content.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricAssessment {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evaluator_a: Option<Judgment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evaluator_b: Option<Judgment>,
    /// The authoritative automated judgment. Present iff both evaluator
    /// judgments were obtained and the metric finalized (directly on
    /// agreement, or through arbitration).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arbitrator: Option<Judgment>,
    /// Reserved slot for human annotation. Created empty alongside the first
    /// automated judgments; only ever filled by an external reviewer.
    #[serde(default)]
    pub manual: Judgment,
    /// Manual judgment carried over from a previous annotation round by
    /// `appraise reset`.
    #[serde(rename = "manual1", default, skip_serializing_if = "Option::is_none")]
    pub prior_manual: Option<Judgment>,
}

impl MetricAssessment {
    /// A finalized metric has its arbitrator slot committed.
    pub fn is_finalized(&self) -> bool {
        self.arbitrator.is_some()
    }
}

/// Method-design tags assigned by the external catalog-building step.
///
/// Tag vocabularies are fixed per group; reporting rejects tags outside the
/// vocabulary rather than silently mis-binning them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Taxonomy {
    #[serde(default)]
    pub mutation_strategy: BTreeSet<String>,
    #[serde(default)]
    pub exploration_strategy: BTreeSet<String>,
    #[serde(default)]
    pub oracle: BTreeSet<String>,
    #[serde(default)]
    pub access_level: BTreeSet<String>,
}

/// One paper in the store, keyed externally by its identity (the document
/// file stem). Seeded by the catalog-building step before the pipeline runs;
/// the pipeline only ever extends `assessments`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PaperRecord {
    /// Human-readable title.
    #[serde(default)]
    pub name: String,
    /// Citation key, also the cache-file prefix for this paper.
    pub key: String,
    #[serde(default)]
    pub year: i32,
    #[serde(default)]
    pub citation_count: u64,
    #[serde(default)]
    pub taxonomy: Taxonomy,
    #[serde(default)]
    pub assessments: BTreeMap<String, MetricAssessment>,
}
