//! Error types shared across the generation stack.

use std::time::Duration;

use thiserror::Error;

/// Maximum number of raw response characters carried in a parse error.
pub const RAW_EXCERPT_CHARS: usize = 300;

/// Errors produced while generating content for an item.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ContentError {
    /// No API key configured.
    #[error("API key is not configured")]
    NoApiKey,

    /// Upstream rate limit (HTTP 429). Never retried inside a call.
    #[error("rate limited by provider: {0}")]
    RateLimited(String),

    /// Network failure, timeout or upstream 5xx.
    #[error("transient provider error: {0}")]
    Transient(String),

    /// Model-level failure (deprecated or invalid model).
    #[error("model error for '{model}'{}: {message}", fallback_suffix(.fallback))]
    ModelError {
        model: String,
        fallback: Option<String>,
        message: String,
    },

    /// Any other non-success provider response.
    #[error("provider returned HTTP {status}: {message}")]
    Upstream { status: u16, message: String },

    /// The provider answered with no completion text.
    #[error("provider returned an empty response")]
    EmptyResponse,

    /// Structured output could not be parsed after every repair strategy.
    #[error("JSON parsing failed: {detail}. Response: {raw}")]
    Parse { detail: String, raw: String },

    /// Forbidden phrases found in the generated text.
    #[error("blocked terms: {}", .0.join(", "))]
    SafetyViolation(Vec<String>),

    /// One or more quality floor rules failed.
    #[error("quality floor not met: {}", .0.join(" | "))]
    QualityFloor(Vec<String>),

    #[error("item not found: {0}")]
    ItemNotFound(i64),

    #[error("item is locked: {0}")]
    ItemLocked(i64),

    #[error("storage error: {0}")]
    Storage(String),
}

fn fallback_suffix(fallback: &Option<String>) -> String {
    match fallback {
        Some(model) => format!(" (fallback '{}' also failed)", model),
        None => String::new(),
    }
}

impl ContentError {
    /// Build a parse error, truncating the raw text.
    pub fn parse(detail: impl Into<String>, raw: &str) -> Self {
        ContentError::Parse {
            detail: detail.into(),
            raw: excerpt(raw, RAW_EXCERPT_CHARS),
        }
    }

    /// Stable snake_case code for logs, audit rows and CLI output.
    pub fn kind(&self) -> &'static str {
        match self {
            ContentError::NoApiKey => "no_api_key",
            ContentError::RateLimited(_) => "rate_limited",
            ContentError::Transient(_) => "transient",
            ContentError::ModelError { .. } => "model_error",
            ContentError::Upstream { .. } => "upstream_error",
            ContentError::EmptyResponse => "empty_response",
            ContentError::Parse { .. } => "parse_error",
            ContentError::SafetyViolation(_) => "safety_violation",
            ContentError::QualityFloor(_) => "quality_floor",
            ContentError::ItemNotFound(_) => "item_not_found",
            ContentError::ItemLocked(_) => "item_locked",
            ContentError::Storage(_) => "storage",
        }
    }

    /// Whether a later retry of the same request could succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ContentError::RateLimited(_) | ContentError::Transient(_)
        )
    }
}

impl From<StoreError> for ContentError {
    fn from(err: StoreError) -> Self {
        ContentError::Storage(err.to_string())
    }
}

/// Error surfaced by collaborator stores (catalog, config, audit, queue).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{0}")]
pub struct StoreError(pub String);

impl StoreError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Failure to reach the provider at all.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("network error: {0}")]
    Network(String),
}

/// Failure to parse a string into one of the domain enums.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("invalid {kind}: '{value}'")]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
}

/// First `max_chars` characters of `text`, on a char boundary.
pub fn excerpt(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_error_truncates_raw() {
        let raw = "é".repeat(400);
        match ContentError::parse("EOF while parsing", &raw) {
            ContentError::Parse { raw, .. } => assert_eq!(raw.chars().count(), 300),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_model_error_names_both_attempts() {
        let err = ContentError::ModelError {
            model: "old-model".to_string(),
            fallback: Some("fast-model".to_string()),
            message: "model not found".to_string(),
        };
        let text = err.to_string();
        assert!(text.contains("old-model"));
        assert!(text.contains("fast-model"));
        assert_eq!(err.kind(), "model_error");
    }

    #[test]
    fn test_quality_floor_lists_every_rule() {
        let err = ContentError::QualityFloor(vec!["a".to_string(), "b".to_string()]);
        assert_eq!(err.to_string(), "quality floor not met: a | b");
    }

    #[test]
    fn test_transient_kinds() {
        assert!(ContentError::RateLimited("slow down".into()).is_transient());
        assert!(ContentError::Transient("502".into()).is_transient());
        assert!(!ContentError::NoApiKey.is_transient());
    }
}
