//! Evaluator adapters: "produce a judgment from a document".
//!
//! Both hosted adapters speak the same contract and differ only in backend
//! and document-submission mechanism: OpenAI pre-uploads the paper and
//! references the file id, Anthropic inlines the bytes as a base64 document
//! block. Those quirks stay inside the adapter; the pipeline sees raw
//! response text either way.

use std::fs;
use std::path::{Path, PathBuf};

use appraise_core::MetricDefinition;

use crate::prompts;
use crate::BackendError;

/// One paper document on disk. The identity (store key) is the file stem;
/// bytes are read on demand by adapters that need them.
#[derive(Debug, Clone)]
pub struct PaperDocument {
    pub identity: String,
    pub path: PathBuf,
}

impl PaperDocument {
    /// Derive the document's identity from its file stem. `None` for paths
    /// without a usable stem.
    pub fn from_path(path: &Path) -> Option<Self> {
        let identity = path.file_stem()?.to_str()?.to_string();
        Some(Self {
            identity,
            path: path.to_path_buf(),
        })
    }

    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.identity.clone())
    }

    pub fn read_bytes(&self) -> Result<Vec<u8>, BackendError> {
        fs::read(&self.path)
            .map_err(|e| BackendError::Document(format!("{}: {e}", self.path.display())))
    }
}

/// A judgment-producing backend. Returns the raw response text; the caller
/// caches it before any parsing is attempted.
pub trait Evaluator {
    /// Stable name, used as the cache tag for this evaluator's responses.
    fn name(&self) -> &str;

    fn evaluate(
        &self,
        paper: &PaperDocument,
        metric: &MetricDefinition,
    ) -> Result<String, BackendError>;
}

impl<T: Evaluator + ?Sized> Evaluator for std::sync::Arc<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn evaluate(
        &self,
        paper: &PaperDocument,
        metric: &MetricDefinition,
    ) -> Result<String, BackendError> {
        (**self).evaluate(paper, metric)
    }
}

// =============================================================================
// OpenAI evaluator (pre-uploaded file + Responses API)
// =============================================================================

#[cfg(feature = "llm-openai")]
pub struct OpenAiEvaluator {
    model: String,
    base_url: String,
    api_key: String,
    /// file ids from previous uploads, so one paper is uploaded once per
    /// process rather than once per metric.
    uploads: parking_lot::Mutex<std::collections::HashMap<PathBuf, String>>,
}

#[cfg(feature = "llm-openai")]
impl OpenAiEvaluator {
    pub fn from_env() -> Result<Self, BackendError> {
        Ok(Self {
            model: crate::providers::openai_model(),
            base_url: crate::providers::openai_base_url(),
            api_key: crate::providers::openai_api_key()?,
            uploads: parking_lot::Mutex::new(std::collections::HashMap::new()),
        })
    }

    fn file_id(&self, paper: &PaperDocument) -> Result<String, BackendError> {
        if let Some(id) = self.uploads.lock().get(&paper.path) {
            return Ok(id.clone());
        }
        let bytes = paper.read_bytes()?;
        let id = crate::providers::openai_upload_file(
            &self.base_url,
            &self.api_key,
            &paper.file_name(),
            bytes,
        )?;
        self.uploads.lock().insert(paper.path.clone(), id.clone());
        Ok(id)
    }

    /// Content blocks referencing the uploaded paper, shared with the
    /// arbitration adapter.
    pub(crate) fn paper_content_blocks(
        &self,
        paper: &PaperDocument,
        lead_text: String,
    ) -> Result<Vec<serde_json::Value>, BackendError> {
        let file_id = self.file_id(paper)?;
        Ok(vec![
            serde_json::json!({ "type": "input_text", "text": lead_text }),
            serde_json::json!({ "type": "input_file", "file_id": file_id }),
        ])
    }

    pub(crate) fn complete(
        &self,
        system: &str,
        content: Vec<serde_json::Value>,
    ) -> Result<String, BackendError> {
        crate::providers::openai_responses(&self.base_url, &self.api_key, &self.model, system, content)
    }
}

#[cfg(feature = "llm-openai")]
impl Evaluator for OpenAiEvaluator {
    fn name(&self) -> &str {
        "openai"
    }

    fn evaluate(
        &self,
        paper: &PaperDocument,
        metric: &MetricDefinition,
    ) -> Result<String, BackendError> {
        let content = self.paper_content_blocks(paper, prompts::evaluation_user_prompt(metric))?;
        self.complete(prompts::EVALUATION_SYSTEM_PROMPT, content)
    }
}

// =============================================================================
// Anthropic evaluator (inlined document + Messages API)
// =============================================================================

#[cfg(feature = "llm-anthropic")]
pub struct AnthropicEvaluator {
    model: String,
    base_url: String,
    api_key: String,
}

#[cfg(feature = "llm-anthropic")]
impl AnthropicEvaluator {
    pub fn from_env() -> Result<Self, BackendError> {
        Ok(Self {
            model: crate::providers::anthropic_model(),
            base_url: crate::providers::anthropic_base_url(),
            api_key: crate::providers::anthropic_api_key()?,
        })
    }
}

#[cfg(feature = "llm-anthropic")]
impl Evaluator for AnthropicEvaluator {
    fn name(&self) -> &str {
        "anthropic"
    }

    fn evaluate(
        &self,
        paper: &PaperDocument,
        metric: &MetricDefinition,
    ) -> Result<String, BackendError> {
        let bytes = paper.read_bytes()?;
        let content = vec![
            crate::providers::anthropic_document_block(&bytes),
            serde_json::json!({ "type": "text", "text": prompts::evaluation_user_prompt(metric) }),
        ];
        crate::providers::anthropic_messages(
            &self.base_url,
            &self.api_key,
            &self.model,
            prompts::EVALUATION_SYSTEM_PROMPT,
            content,
        )
    }
}

// =============================================================================
// Mock evaluator (tests, dry runs)
// =============================================================================

/// Scripted evaluator: returns a canned response per metric (or a default),
/// counting invocations. No network, no filesystem.
pub struct MockEvaluator {
    name: String,
    default_response: Option<String>,
    responses: std::collections::BTreeMap<String, String>,
    calls: std::sync::Arc<std::sync::atomic::AtomicUsize>,
}

impl MockEvaluator {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            default_response: None,
            responses: std::collections::BTreeMap::new(),
            calls: std::sync::Arc::new(std::sync::atomic::AtomicUsize::new(0)),
        }
    }

    /// Respond to every metric with a well-formed judgment for `value`.
    pub fn with_default_value(mut self, value: &str) -> Self {
        self.default_response = Some(format!(
            "```json\n{{\"value\": \"{value}\", \"rationale\": \"scripted\", \"evidence\": \"n/a\"}}\n```"
        ));
        self
    }

    /// Respond to every metric with this exact raw text.
    pub fn with_default_raw(mut self, raw: impl Into<String>) -> Self {
        self.default_response = Some(raw.into());
        self
    }

    /// Respond to one metric with this exact raw text.
    pub fn with_response(mut self, metric: impl Into<String>, raw: impl Into<String>) -> Self {
        self.responses.insert(metric.into(), raw.into());
        self
    }

    /// Shared call counter, usable after the evaluator is boxed away.
    pub fn call_counter(&self) -> std::sync::Arc<std::sync::atomic::AtomicUsize> {
        self.calls.clone()
    }
}

impl Evaluator for MockEvaluator {
    fn name(&self) -> &str {
        &self.name
    }

    fn evaluate(
        &self,
        _paper: &PaperDocument,
        metric: &MetricDefinition,
    ) -> Result<String, BackendError> {
        self.calls
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        self.responses
            .get(&metric.name)
            .or(self.default_response.as_ref())
            .cloned()
            .ok_or_else(|| BackendError::Api(format!("no scripted response for {}", metric.name)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paper_identity_is_the_file_stem() {
        let doc = PaperDocument::from_path(Path::new("papers/smith2021fuzz.pdf")).unwrap();
        assert_eq!(doc.identity, "smith2021fuzz");
        assert_eq!(doc.file_name(), "smith2021fuzz.pdf");
    }

    #[test]
    fn mock_evaluator_counts_calls() {
        let codebook = appraise_core::Codebook::from_json_str(
            r#"{ "M": { "description": "", "values": [{ "value": "High", "description": "" }] } }"#,
        )
        .unwrap();
        let metric = codebook.get("M").unwrap();
        let doc = PaperDocument::from_path(Path::new("x.pdf")).unwrap();

        let eval = MockEvaluator::new("stub").with_default_value("High");
        let calls = eval.call_counter();
        let raw = eval.evaluate(&doc, metric).unwrap();
        assert!(raw.contains("\"High\""));
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 1);
    }
}
