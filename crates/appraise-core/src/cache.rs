//! Raw backend-response cache.
//!
//! Every backend call's raw text is written to stable storage *before*
//! parsing is attempted, one envelope file per (paper key, metric, tag),
//! where the tag is an evaluator name or [`ARBITER_TAG`]. Repeated runs
//! reuse cached responses instead of re-invoking backends, which makes
//! reprocessing idempotent and resumable.
//!
//! Entries carry a status alongside the raw text so that only successful
//! calls are reusable:
//!
//! - `ok` — transport succeeded; the raw text is a candidate judgment.
//! - `backend_error` — the call failed; `raw` holds the error text. Kept
//!   for the record, never reused: the next run re-invokes the backend.
//! - `unparseable` — a previously `ok` response whose text could not be
//!   reduced to a judgment. Demoted in place by the pipeline; the next run
//!   re-invokes the backend instead of replaying known-bad text forever.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

/// Cache tag for arbitration responses, which are keyed by (paper, metric)
/// alone — a single blended artifact, not split per evaluator.
pub const ARBITER_TAG: &str = "arbiter";

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("failed to create response cache directory {path}: {source}")]
    Create {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write cache entry {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to serialize cache entry: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheStatus {
    Ok,
    BackendError,
    Unparseable,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub status: CacheStatus,
    pub raw: String,
    pub recorded_at: DateTime<Utc>,
}

impl CacheEntry {
    /// Only transport successes are candidates for reuse.
    pub fn is_reusable(&self) -> bool {
        self.status == CacheStatus::Ok
    }
}

/// Directory of cache envelope files.
pub struct ResponseCache {
    dir: PathBuf,
}

impl ResponseCache {
    /// Open (creating if needed) the cache directory.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, CacheError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|source| CacheError::Create {
            path: dir.display().to_string(),
            source,
        })?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn entry_path(&self, paper_key: &str, metric: &str, tag: &str) -> PathBuf {
        // Metric names may contain spaces; only path separators need mapping.
        let safe = |s: &str| s.replace(['/', '\\'], "_");
        self.dir
            .join(format!("{}-{}.{}.json", safe(paper_key), safe(metric), safe(tag)))
    }

    /// Read an entry if present. An envelope that cannot be read or parsed
    /// is reported as absent (with a warning) so the backend is re-invoked
    /// rather than the run aborted.
    pub fn get(&self, paper_key: &str, metric: &str, tag: &str) -> Option<CacheEntry> {
        let path = self.entry_path(paper_key, metric, tag);
        if !path.exists() {
            return None;
        }
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(err) => {
                warn!(path = %path.display(), error = %err, "unreadable cache entry, ignoring");
                return None;
            }
        };
        match serde_json::from_str(&text) {
            Ok(entry) => Some(entry),
            Err(err) => {
                warn!(path = %path.display(), error = %err, "corrupt cache entry, ignoring");
                None
            }
        }
    }

    /// Record a call's raw output. Always overwrites: a fresh call is a
    /// fresh fact about the backend.
    pub fn put(
        &self,
        paper_key: &str,
        metric: &str,
        tag: &str,
        status: CacheStatus,
        raw: impl Into<String>,
    ) -> Result<CacheEntry, CacheError> {
        let entry = CacheEntry {
            status,
            raw: raw.into(),
            recorded_at: Utc::now(),
        };
        let path = self.entry_path(paper_key, metric, tag);
        let text = serde_json::to_string_pretty(&entry)?;
        fs::write(&path, text).map_err(|source| CacheError::Write {
            path: path.display().to_string(),
            source,
        })?;
        Ok(entry)
    }

    /// Downgrade an existing entry's status in place, keeping its raw text.
    /// A missing entry is a no-op.
    pub fn demote(
        &self,
        paper_key: &str,
        metric: &str,
        tag: &str,
        status: CacheStatus,
    ) -> Result<(), CacheError> {
        let Some(entry) = self.get(paper_key, metric, tag) else {
            return Ok(());
        };
        let path = self.entry_path(paper_key, metric, tag);
        let text = serde_json::to_string_pretty(&CacheEntry { status, ..entry })?;
        fs::write(&path, text).map_err(|source| CacheError::Write {
            path: path.display().to_string(),
            source,
        })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_entries() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ResponseCache::open(dir.path().join("responses")).unwrap();

        assert!(cache.get("smith2021", "Failure Severity", "openai").is_none());

        cache
            .put(
                "smith2021",
                "Failure Severity",
                "openai",
                CacheStatus::Ok,
                "{\"value\": \"High\"}",
            )
            .unwrap();

        let entry = cache.get("smith2021", "Failure Severity", "openai").unwrap();
        assert!(entry.is_reusable());
        assert_eq!(entry.raw, "{\"value\": \"High\"}");
    }

    #[test]
    fn backend_errors_are_recorded_but_not_reusable() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ResponseCache::open(dir.path()).unwrap();

        cache
            .put(
                "smith2021",
                "Input Plausibility",
                "anthropic",
                CacheStatus::BackendError,
                "http error 529",
            )
            .unwrap();

        let entry = cache
            .get("smith2021", "Input Plausibility", "anthropic")
            .unwrap();
        assert!(!entry.is_reusable());
    }

    #[test]
    fn demote_keeps_raw_text() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ResponseCache::open(dir.path()).unwrap();

        cache
            .put("a", "M", ARBITER_TAG, CacheStatus::Ok, "not json at all")
            .unwrap();
        cache
            .demote("a", "M", ARBITER_TAG, CacheStatus::Unparseable)
            .unwrap();

        let entry = cache.get("a", "M", ARBITER_TAG).unwrap();
        assert_eq!(entry.status, CacheStatus::Unparseable);
        assert_eq!(entry.raw, "not json at all");

        // Demoting a missing entry is fine.
        cache
            .demote("a", "Other", ARBITER_TAG, CacheStatus::Unparseable)
            .unwrap();
    }
}
