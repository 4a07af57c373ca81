//! Reducing raw backend text to a structured [`Judgment`].
//!
//! Backends are asked for a JSON object in a fenced markdown block, but
//! models wrap JSON in prose, emit several blocks, or skip the fence
//! entirely. Extraction is therefore layered:
//!
//! 1. parse the trimmed text directly;
//! 2. parse every ```json fenced block, newest (last) first;
//! 3. parse the first brace-balanced `{…}` substring (string/escape aware —
//!    more robust than `rfind('}')`, which can land on an inner brace).
//!
//! A judgment without a non-empty `value` is rejected regardless of where it
//! was found.

use std::sync::OnceLock;

use regex::Regex;
use thiserror::Error;

use appraise_core::Judgment;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("response contains no JSON object")]
    NoJson,
    #[error("embedded JSON is not a judgment: {0}")]
    BadShape(String),
    #[error("judgment has no value")]
    MissingValue,
}

fn fenced_block_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)```(?:json)?\s*(\{.*?\})\s*```").unwrap())
}

/// Locate the first complete brace-balanced object substring, skipping
/// braces inside string literals.
fn balanced_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;

    let mut depth: i64 = 0;
    let mut in_string = false;
    let mut escape = false;

    for (idx, ch) in text.char_indices().skip(start) {
        if in_string {
            if escape {
                escape = false;
                continue;
            }
            match ch {
                '\\' => escape = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }

        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..=idx]);
                }
            }
            _ => {}
        }
    }

    None
}

fn judgment_from_candidate(candidate: &str) -> Result<Judgment, ExtractError> {
    let judgment: Judgment = serde_json::from_str(candidate)
        .map_err(|err| ExtractError::BadShape(err.to_string()))?;
    if judgment.value.trim().is_empty() {
        return Err(ExtractError::MissingValue);
    }
    Ok(judgment)
}

/// Reduce raw backend output to a judgment, or say precisely why it cannot
/// be.
pub fn parse_judgment(raw: &str) -> Result<Judgment, ExtractError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ExtractError::NoJson);
    }

    if let Ok(judgment) = judgment_from_candidate(trimmed) {
        return Ok(judgment);
    }

    // Models that revise themselves tend to put the final answer in the last
    // fenced block, so scan back-to-front.
    let mut last_err: Option<ExtractError> = None;
    let blocks: Vec<&str> = fenced_block_re()
        .captures_iter(trimmed)
        .filter_map(|cap| cap.get(1).map(|m| m.as_str()))
        .collect();
    for block in blocks.iter().rev() {
        match judgment_from_candidate(block) {
            Ok(judgment) => return Ok(judgment),
            Err(err) => last_err = Some(err),
        }
    }

    if let Some(candidate) = balanced_object(trimmed) {
        match judgment_from_candidate(candidate) {
            Ok(judgment) => return Ok(judgment),
            Err(err) => last_err = Some(err),
        }
    }

    Err(last_err.unwrap_or(ExtractError::NoJson))
}
