//! LLM evaluator backends and the evaluate → compare → reconcile pipeline.
//!
//! Two independent backends judge each paper against each codebook metric;
//! on disagreement a third arbitration call (same backend family, different
//! framing) produces the authoritative judgment:
//!
//! ```text
//!                 ┌─────────────┐
//!   paper ───────►│ evaluator A │──┐
//!                 └─────────────┘  │  values     ┌─────────────────────┐
//!                                  ├─ agree ────►│ arbitrator :=  A    │
//!                 ┌─────────────┐  │             └─────────────────────┘
//!   paper ───────►│ evaluator B │──┤  values     ┌─────────────────────┐
//!                 └─────────────┘  └─ differ ───►│ arbitration call    │
//!                                                └─────────────────────┘
//! ```
//!
//! Backends are polymorphic behind [`Evaluator`] / [`Arbiter`]: the contract
//! is "produce a judgment from a document"; how the document reaches the
//! backend (pre-uploaded file vs. inlined bytes) is adapter-internal.
//!
//! Every raw response is cached *before* parsing (see
//! [`appraise_core::cache`]), so the pipeline is idempotent and resumable.

pub mod arbiter;
pub mod evaluate;
pub mod extract;
pub mod pipeline;
pub mod prompts;
#[cfg(any(feature = "llm-openai", feature = "llm-anthropic"))]
pub mod providers;

use thiserror::Error;

pub use arbiter::{Arbiter, MockArbiter};
pub use evaluate::{Evaluator, MockEvaluator, PaperDocument};
pub use extract::{parse_judgment, ExtractError};
pub use pipeline::{AssessmentPipeline, PipelineError, PipelineOptions, RunSummary};

#[cfg(feature = "llm-anthropic")]
pub use evaluate::AnthropicEvaluator;
#[cfg(feature = "llm-openai")]
pub use arbiter::OpenAiArbiter;
#[cfg(feature = "llm-openai")]
pub use evaluate::OpenAiEvaluator;

/// Backend call failures. Recoverable at pipeline level: the raw error text
/// is cached as a `backend_error` envelope and the metric skipped for the
/// run.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("API error: {0}")]
    Api(String),
    #[error("network error: {0}")]
    Network(String),
    #[error("invalid response: {0}")]
    InvalidResponse(String),
    #[error("backend not configured: {0}")]
    NotConfigured(String),
    #[error("failed to read paper document: {0}")]
    Document(String),
}
