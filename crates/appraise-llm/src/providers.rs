//! HTTP plumbing for the hosted LLM backends.
//!
//! Configuration comes from the environment (keys are never taken on the
//! command line):
//!
//! - `OPENAI_API_KEY`, `OPENAI_MODEL`, `OPENAI_BASE_URL`
//! - `ANTHROPIC_API_KEY`, `ANTHROPIC_MODEL`, `ANTHROPIC_BASE_URL`,
//!   `ANTHROPIC_VERSION`
//! - `APPRAISE_LLM_TIMEOUT_SECS` (default 120, `0` disables the timeout)
//! - `APPRAISE_LLM_MAX_OUTPUT_TOKENS` (default 2048)
//!
//! All calls are blocking: the pipeline is strictly sequential and suspends
//! only at these call boundaries.

use std::time::Duration;

use serde_json::json;

use crate::BackendError;

pub const OPENAI_API_KEY_ENV: &str = "OPENAI_API_KEY";
pub const OPENAI_BASE_URL_ENV: &str = "OPENAI_BASE_URL";
pub const OPENAI_MODEL_ENV: &str = "OPENAI_MODEL";
pub const ANTHROPIC_API_KEY_ENV: &str = "ANTHROPIC_API_KEY";
pub const ANTHROPIC_BASE_URL_ENV: &str = "ANTHROPIC_BASE_URL";
pub const ANTHROPIC_MODEL_ENV: &str = "ANTHROPIC_MODEL";
pub const ANTHROPIC_VERSION_ENV: &str = "ANTHROPIC_VERSION";
pub const APPRAISE_LLM_TIMEOUT_SECS_ENV: &str = "APPRAISE_LLM_TIMEOUT_SECS";
pub const APPRAISE_LLM_MAX_OUTPUT_TOKENS_ENV: &str = "APPRAISE_LLM_MAX_OUTPUT_TOKENS";

const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com";
const DEFAULT_ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com";
const DEFAULT_ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_OPENAI_MODEL: &str = "o4-mini";
const DEFAULT_ANTHROPIC_MODEL: &str = "claude-sonnet-4-5";

// Generous enough for long papers; judgments themselves are short.
const DEFAULT_LLM_TIMEOUT_SECS: u64 = 120;
const DEFAULT_LLM_MAX_OUTPUT_TOKENS: u32 = 2048;

fn env_trimmed(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Request timeout from the environment. `0` means no timeout.
pub fn llm_timeout() -> Result<Option<Duration>, BackendError> {
    match env_trimmed(APPRAISE_LLM_TIMEOUT_SECS_ENV) {
        None => Ok(Some(Duration::from_secs(DEFAULT_LLM_TIMEOUT_SECS))),
        Some(v) => {
            let secs: u64 = v.parse().map_err(|_| {
                BackendError::NotConfigured(format!(
                    "invalid {APPRAISE_LLM_TIMEOUT_SECS_ENV}={v:?} (expected seconds)"
                ))
            })?;
            Ok((secs > 0).then(|| Duration::from_secs(secs)))
        }
    }
}

pub fn llm_max_output_tokens() -> Result<u32, BackendError> {
    match env_trimmed(APPRAISE_LLM_MAX_OUTPUT_TOKENS_ENV) {
        None => Ok(DEFAULT_LLM_MAX_OUTPUT_TOKENS),
        Some(v) => v.parse().map_err(|_| {
            BackendError::NotConfigured(format!(
                "invalid {APPRAISE_LLM_MAX_OUTPUT_TOKENS_ENV}={v:?} (expected a token count)"
            ))
        }),
    }
}

fn normalize_http_base_url(base_url: &str, default: &str) -> String {
    let trimmed = base_url.trim();
    let base = if trimmed.is_empty() { default } else { trimmed };
    base.trim_end_matches('/').to_string()
}

fn http_client(timeout: Option<Duration>) -> Result<reqwest::blocking::Client, BackendError> {
    let mut builder = reqwest::blocking::Client::builder();
    if let Some(timeout) = timeout {
        builder = builder.timeout(timeout);
    }
    builder
        .build()
        .map_err(|e| BackendError::Network(format!("failed to build http client: {e}")))
}

// =============================================================================
// OpenAI backend (Files + Responses APIs)
// =============================================================================

#[cfg(feature = "llm-openai")]
pub fn openai_api_key() -> Result<String, BackendError> {
    env_trimmed(OPENAI_API_KEY_ENV).ok_or_else(|| {
        BackendError::NotConfigured(format!(
            "OpenAI backend requires {OPENAI_API_KEY_ENV} (set it in your env; do not hardcode secrets in scripts)"
        ))
    })
}

#[cfg(feature = "llm-openai")]
pub fn openai_model() -> String {
    env_trimmed(OPENAI_MODEL_ENV).unwrap_or_else(|| DEFAULT_OPENAI_MODEL.to_string())
}

#[cfg(feature = "llm-openai")]
pub fn openai_base_url() -> String {
    normalize_http_base_url(
        &env_trimmed(OPENAI_BASE_URL_ENV).unwrap_or_default(),
        DEFAULT_OPENAI_BASE_URL,
    )
}

/// Upload a document to the Files API, returning the file id to reference
/// from Responses API input.
#[cfg(feature = "llm-openai")]
pub fn openai_upload_file(
    base_url: &str,
    api_key: &str,
    file_name: &str,
    bytes: Vec<u8>,
) -> Result<String, BackendError> {
    let base_url = normalize_http_base_url(base_url, DEFAULT_OPENAI_BASE_URL);
    let url = format!("{base_url}/v1/files");

    let part = reqwest::blocking::multipart::Part::bytes(bytes)
        .file_name(file_name.to_string())
        .mime_str("application/pdf")
        .map_err(|e| BackendError::Network(format!("failed to build upload part: {e}")))?;
    let form = reqwest::blocking::multipart::Form::new()
        .text("purpose", "user_data")
        .part("file", part);

    let client = http_client(llm_timeout()?)?;
    let resp = client
        .post(&url)
        .bearer_auth(api_key)
        .multipart(form)
        .send()
        .map_err(|e| BackendError::Network(format!("failed to reach OpenAI at {url}: {e}")))?;

    if !resp.status().is_success() {
        let status = resp.status();
        let text = resp.text().unwrap_or_default();
        return Err(BackendError::Api(format!("openai http error {status}: {text}")));
    }

    let v: serde_json::Value = resp
        .json()
        .map_err(|e| BackendError::InvalidResponse(format!("openai returned invalid JSON: {e}")))?;
    v.get("id")
        .and_then(|id| id.as_str())
        .map(|id| id.to_string())
        .ok_or_else(|| {
            BackendError::InvalidResponse("openai upload response has no file id".to_string())
        })
}

#[cfg(feature = "llm-openai")]
fn openai_extract_output_text(v: &serde_json::Value) -> Option<String> {
    let mut out = String::new();
    let output = v.get("output")?.as_array()?;
    for item in output {
        // The Responses API emits many item types; only "message" carries text.
        let kind = item.get("type").and_then(|x| x.as_str()).unwrap_or("");
        if kind != "message" {
            continue;
        }
        let content = item
            .get("content")
            .and_then(|x| x.as_array())
            .cloned()
            .unwrap_or_default();
        for c in content {
            let ckind = c.get("type").and_then(|x| x.as_str()).unwrap_or("");
            if ckind != "output_text" {
                continue;
            }
            if let Some(t) = c.get("text").and_then(|x| x.as_str()) {
                if !out.is_empty() {
                    out.push('\n');
                }
                out.push_str(t);
            }
        }
    }
    let trimmed = out.trim().to_string();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed)
    }
}

/// One Responses API call with arbitrary user content blocks (input_text /
/// input_file), returning the concatenated output text.
#[cfg(feature = "llm-openai")]
pub fn openai_responses(
    base_url: &str,
    api_key: &str,
    model: &str,
    system: &str,
    content: Vec<serde_json::Value>,
) -> Result<String, BackendError> {
    let base_url = normalize_http_base_url(base_url, DEFAULT_OPENAI_BASE_URL);
    let url = format!("{base_url}/v1/responses");

    let body = json!({
        "model": model,
        "instructions": system,
        "input": [
            { "role": "user", "content": content }
        ],
        "max_output_tokens": llm_max_output_tokens()?,
    });

    let client = http_client(llm_timeout()?)?;
    let resp = client
        .post(&url)
        .bearer_auth(api_key)
        .json(&body)
        .send()
        .map_err(|e| BackendError::Network(format!("failed to reach OpenAI at {url}: {e}")))?;

    if !resp.status().is_success() {
        let status = resp.status();
        let text = resp.text().unwrap_or_default();
        return Err(BackendError::Api(format!("openai http error {status}: {text}")));
    }

    let v: serde_json::Value = resp
        .json()
        .map_err(|e| BackendError::InvalidResponse(format!("openai returned invalid JSON: {e}")))?;
    openai_extract_output_text(&v).ok_or_else(|| {
        BackendError::InvalidResponse(
            "openai: no output_text in response (unexpected response shape)".to_string(),
        )
    })
}

// =============================================================================
// Anthropic backend (Messages API)
// =============================================================================

#[cfg(feature = "llm-anthropic")]
pub fn anthropic_api_key() -> Result<String, BackendError> {
    env_trimmed(ANTHROPIC_API_KEY_ENV).ok_or_else(|| {
        BackendError::NotConfigured(format!(
            "Anthropic backend requires {ANTHROPIC_API_KEY_ENV} (set it in your env; do not hardcode secrets in scripts)"
        ))
    })
}

#[cfg(feature = "llm-anthropic")]
pub fn anthropic_model() -> String {
    env_trimmed(ANTHROPIC_MODEL_ENV).unwrap_or_else(|| DEFAULT_ANTHROPIC_MODEL.to_string())
}

#[cfg(feature = "llm-anthropic")]
pub fn anthropic_base_url() -> String {
    normalize_http_base_url(
        &env_trimmed(ANTHROPIC_BASE_URL_ENV).unwrap_or_default(),
        DEFAULT_ANTHROPIC_BASE_URL,
    )
}

#[cfg(feature = "llm-anthropic")]
pub fn anthropic_version() -> String {
    env_trimmed(ANTHROPIC_VERSION_ENV).unwrap_or_else(|| DEFAULT_ANTHROPIC_VERSION.to_string())
}

/// A base64 `document` content block inlining the paper bytes.
#[cfg(feature = "llm-anthropic")]
pub fn anthropic_document_block(bytes: &[u8]) -> serde_json::Value {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;

    json!({
        "type": "document",
        "source": {
            "type": "base64",
            "media_type": "application/pdf",
            "data": STANDARD.encode(bytes),
        }
    })
}

#[cfg(feature = "llm-anthropic")]
fn anthropic_extract_output_text(v: &serde_json::Value) -> Option<String> {
    let mut out = String::new();
    let blocks = v.get("content")?.as_array()?;
    for b in blocks {
        let kind = b.get("type").and_then(|x| x.as_str()).unwrap_or("");
        if kind != "text" {
            continue;
        }
        if let Some(t) = b.get("text").and_then(|x| x.as_str()) {
            if !out.is_empty() {
                out.push('\n');
            }
            out.push_str(t);
        }
    }
    let trimmed = out.trim().to_string();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed)
    }
}

/// One Messages API call with arbitrary user content blocks, returning the
/// concatenated text blocks of the reply.
#[cfg(feature = "llm-anthropic")]
pub fn anthropic_messages(
    base_url: &str,
    api_key: &str,
    model: &str,
    system: &str,
    content: Vec<serde_json::Value>,
) -> Result<String, BackendError> {
    let base_url = normalize_http_base_url(base_url, DEFAULT_ANTHROPIC_BASE_URL);
    let url = format!("{base_url}/v1/messages");

    let body = json!({
        "model": model,
        "max_tokens": llm_max_output_tokens()?,
        "temperature": 0,
        "system": system,
        "messages": [
            { "role": "user", "content": content }
        ],
    });

    let client = http_client(llm_timeout()?)?;
    let resp = client
        .post(&url)
        .header("x-api-key", api_key)
        .header("anthropic-version", anthropic_version())
        .json(&body)
        .send()
        .map_err(|e| BackendError::Network(format!("failed to reach Anthropic at {url}: {e}")))?;

    if !resp.status().is_success() {
        let status = resp.status();
        let text = resp.text().unwrap_or_default();
        return Err(BackendError::Api(format!(
            "anthropic http error {status}: {text}"
        )));
    }

    let v: serde_json::Value = resp.json().map_err(|e| {
        BackendError::InvalidResponse(format!("anthropic returned invalid JSON: {e}"))
    })?;
    anthropic_extract_output_text(&v).ok_or_else(|| {
        BackendError::InvalidResponse(
            "anthropic: no text blocks in response (unexpected response shape)".to_string(),
        )
    })
}
