//! Completion envelope parsing.
//!
//! A reply is decoded in two stages: the service's envelope (model, usage, first
//! choice) and then the model-written content inside it. The two stages fail with
//! distinct errors so callers can tell a quota/service problem from a bad generation.

use crate::error::GenerationError;
use crate::linearize::DialogueLines;
use serde::Serialize;
use serde_json::Value;
use std::fmt;

/// Usage figures reported alongside a completion
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CompletionStats {
    pub model: String,
    pub prompt_tokens: Option<u64>,
    pub completion_tokens: Option<u64>,
    pub total_tokens: Option<u64>,
}

impl fmt::Display for CompletionStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn count(value: Option<u64>) -> String {
            value.map_or_else(|| "?".to_string(), |v| v.to_string())
        }
        write!(
            f,
            "model {}, prompt tokens {}, completion tokens {}, total tokens {}",
            self.model,
            count(self.prompt_tokens),
            count(self.completion_tokens),
            count(self.total_tokens)
        )
    }
}

/// Decoded envelope: stats plus the raw content of the first choice
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionEnvelope {
    pub stats: CompletionStats,
    pub content: String,
}

const CONTENT_POINTER: &str = "/choices/0/message/content";

/// Decode the service envelope.
///
/// `model` and `choices[0].message.content` must be strings. Usage is optional.
pub fn parse_envelope(body: &str) -> Result<CompletionEnvelope, GenerationError> {
    let value: Value = serde_json::from_str(body)
        .map_err(|e| GenerationError::UnparseableEnvelope(e.to_string()))?;

    let model = value
        .get("model")
        .and_then(Value::as_str)
        .ok_or(GenerationError::EnvelopeMissingField { field: "model" })?;

    let usage = value.get("usage");
    let usage_count = |name: &str| usage.and_then(|u| u.get(name)).and_then(Value::as_u64);

    let content = value
        .pointer(CONTENT_POINTER)
        .and_then(Value::as_str)
        .ok_or(GenerationError::EnvelopeMissingField {
            field: "choices[0].message.content",
        })?;

    Ok(CompletionEnvelope {
        stats: CompletionStats {
            model: model.to_string(),
            prompt_tokens: usage_count("prompt_tokens"),
            completion_tokens: usage_count("completion_tokens"),
            total_tokens: usage_count("total_tokens"),
        },
        content: content.to_string(),
    })
}

/// Error message a service put in an `{"error": {"message": ...}}` body, if any
pub fn service_error_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    value
        .pointer("/error/message")
        .and_then(Value::as_str)
        .map(str::to_string)
}

/// Decode the model-written content as a line list
pub fn parse_content(content: &str) -> Result<DialogueLines, GenerationError> {
    serde_json::from_str(content.trim()).map_err(|e| GenerationError::MalformedContent(e.to_string()))
}
