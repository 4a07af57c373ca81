//! Arbitration: the tie-breaking pass invoked only on evaluator
//! disagreement.
//!
//! The arbitration call sees the metric definition, the paper, and both
//! disagreeing judgments, with explicit license to pick a value outside the
//! enumerated set when neither input fits.

use appraise_core::{Judgment, MetricDefinition};

use crate::evaluate::PaperDocument;
use crate::prompts;
use crate::BackendError;

/// A disagreement-resolving backend. Like [`crate::Evaluator`], returns raw
/// response text; caching and parsing are the caller's concern.
pub trait Arbiter {
    fn arbitrate(
        &self,
        paper: &PaperDocument,
        metric: &MetricDefinition,
        a: &Judgment,
        b: &Judgment,
    ) -> Result<String, BackendError>;
}

/// Arbitration over the OpenAI backend — same family as evaluator A, with
/// the arbitration framing. Shares the evaluator's upload memo so the paper
/// is not re-uploaded for tie-breaking.
#[cfg(feature = "llm-openai")]
pub struct OpenAiArbiter {
    inner: std::sync::Arc<crate::evaluate::OpenAiEvaluator>,
}

#[cfg(feature = "llm-openai")]
impl OpenAiArbiter {
    pub fn new(evaluator: std::sync::Arc<crate::evaluate::OpenAiEvaluator>) -> Self {
        Self { inner: evaluator }
    }
}

#[cfg(feature = "llm-openai")]
impl Arbiter for OpenAiArbiter {
    fn arbitrate(
        &self,
        paper: &PaperDocument,
        metric: &MetricDefinition,
        a: &Judgment,
        b: &Judgment,
    ) -> Result<String, BackendError> {
        let content = self
            .inner
            .paper_content_blocks(paper, prompts::arbitration_user_prompt(metric, a, b))?;
        self.inner
            .complete(prompts::ARBITRATION_SYSTEM_PROMPT, content)
    }
}

/// Scripted arbiter for tests: fixed raw response, call counting.
pub struct MockArbiter {
    response: String,
    calls: std::sync::Arc<std::sync::atomic::AtomicUsize>,
}

impl MockArbiter {
    pub fn returning_value(value: &str) -> Self {
        Self::returning_raw(format!(
            "```json\n{{\"value\": \"{value}\", \"rationale\": \"arbitrated\", \"evidence\": \"n/a\"}}\n```"
        ))
    }

    pub fn returning_raw(raw: impl Into<String>) -> Self {
        Self {
            response: raw.into(),
            calls: std::sync::Arc::new(std::sync::atomic::AtomicUsize::new(0)),
        }
    }

    pub fn call_counter(&self) -> std::sync::Arc<std::sync::atomic::AtomicUsize> {
        self.calls.clone()
    }
}

impl Arbiter for MockArbiter {
    fn arbitrate(
        &self,
        _paper: &PaperDocument,
        _metric: &MetricDefinition,
        _a: &Judgment,
        _b: &Judgment,
    ) -> Result<String, BackendError> {
        self.calls
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        Ok(self.response.clone())
    }
}
