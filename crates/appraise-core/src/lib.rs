//! Appraise core: codebook catalog, judgment data model, and assessment store
//!
//! This crate holds the shared vocabulary of the assessment pipeline:
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────────┐
//! │                        ASSESSMENT STATE                            │
//! ├────────────────────────────────────────────────────────────────────┤
//! │                                                                    │
//! │  ┌────────────┐        ┌──────────────────┐     ┌──────────────┐   │
//! │  │  Codebook  │──────► │    Pipeline      │────►│  Assessment  │   │
//! │  │ (read-only)│        │ (appraise-llm)   │     │    Store     │   │
//! │  └────────────┘        └──────────────────┘     │  (one JSON   │   │
//! │                               │                 │   document)  │   │
//! │                               ▼                 └──────────────┘   │
//! │                        ┌──────────────┐                            │
//! │                        │   Response   │  one envelope per          │
//! │                        │    Cache     │  (paper, metric, backend)  │
//! │                        └──────────────┘                            │
//! │                                                                    │
//! └────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! - [`catalog`]: the fixed metric codebook (name, description, ordered
//!   allowed values, legacy-name aliases). Loaded once per run, immutable.
//! - [`model`]: [`Judgment`], [`MetricAssessment`], [`PaperRecord`] — the
//!   serialized shapes that reporting consumers read.
//! - [`store`]: the typed repository over the single store document
//!   (`get`/`upsert`/`flush`), full-rewrite persistence, single writer.
//! - [`cache`]: raw backend responses keyed by (paper key, metric, tag),
//!   wrapped in a status envelope so only successful calls are reused.

pub mod cache;
pub mod catalog;
pub mod model;
pub mod store;


pub use cache::{CacheEntry, CacheError, CacheStatus, ResponseCache, ARBITER_TAG};
pub use catalog::{Codebook, CatalogError, MetricDefinition, MetricValue};
pub use model::{Judgment, MetricAssessment, PaperRecord, Taxonomy};
pub use store::{AssessmentStore, AutomatedBundle, StoreError};
