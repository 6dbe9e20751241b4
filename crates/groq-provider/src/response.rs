//! Classification of raw provider replies.
//!
//! Generation and health probing both go through [`classify`], so a reply
//! that counts as a failure for one counts as a failure for the other.

use catalog_core::{ContentError, RawReply};

use crate::api_types::{error_message, ChatCompletionResponse};

/// Why a reply did not yield a completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyError {
    /// HTTP 429.
    RateLimited(String),

    /// Non-success status, or an error object in the body.
    Failed {
        status: u16,
        message: String,
        body: String,
    },

    /// Success status but no completion text.
    Empty,
}

impl ReplyError {
    /// Operator-facing reason: the upstream message or `HTTP <status>`.
    pub fn reason(&self) -> String {
        match self {
            ReplyError::RateLimited(message) => message.clone(),
            ReplyError::Failed { message, .. } => message.clone(),
            ReplyError::Empty => "empty completion".to_string(),
        }
    }

    /// Map to the pipeline taxonomy when no fallback applies.
    pub fn into_content_error(self) -> ContentError {
        match self {
            ReplyError::RateLimited(message) => ContentError::RateLimited(message),
            ReplyError::Failed {
                status, message, ..
            } if status >= 500 => ContentError::Transient(format!("HTTP {}: {}", status, message)),
            ReplyError::Failed {
                status, message, ..
            } => ContentError::Upstream { status, message },
            ReplyError::Empty => ContentError::EmptyResponse,
        }
    }
}

/// Extract the completion text of a reply, or say why there is none.
pub fn classify(reply: &RawReply) -> Result<String, ReplyError> {
    if reply.status == 429 {
        let message = error_message(&reply.body)
            .unwrap_or_else(|| "rate limit reached, try again shortly".to_string());
        return Err(ReplyError::RateLimited(message));
    }

    let upstream_message = error_message(&reply.body);
    if !reply.is_success() || upstream_message.is_some() {
        return Err(ReplyError::Failed {
            status: reply.status,
            message: upstream_message.unwrap_or_else(|| format!("HTTP {}", reply.status)),
            body: reply.body.clone(),
        });
    }

    let parsed: ChatCompletionResponse = serde_json::from_str(&reply.body).unwrap_or_default();
    match parsed.first_content() {
        Some(text) if !text.trim().is_empty() => Ok(text.to_string()),
        _ => Err(ReplyError::Empty),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn completion(content: &str) -> String {
        serde_json::json!({
            "choices": [{"index": 0, "message": {"role": "assistant", "content": content}}]
        })
        .to_string()
    }

    #[test]
    fn test_success() {
        let reply = RawReply::new(200, completion("{\"ok\": true}"));
        assert_eq!(classify(&reply).unwrap(), "{\"ok\": true}");
    }

    #[test]
    fn test_rate_limit() {
        let reply = RawReply::new(429, r#"{"error":{"message":"Rate limit reached"}}"#);
        assert_eq!(
            classify(&reply),
            Err(ReplyError::RateLimited("Rate limit reached".to_string()))
        );
        assert!(classify(&reply).unwrap_err().into_content_error().is_transient());
    }

    #[test]
    fn test_server_error_is_transient() {
        let reply = RawReply::new(503, "Service Unavailable");
        let err = classify(&reply).unwrap_err();
        assert_eq!(err.reason(), "HTTP 503");
        assert!(matches!(err.into_content_error(), ContentError::Transient(_)));
    }

    #[test]
    fn test_client_error_keeps_upstream_message() {
        let reply = RawReply::new(404, r#"{"error":{"message":"model not found"}}"#);
        match classify(&reply).unwrap_err().into_content_error() {
            ContentError::Upstream { status, message } => {
                assert_eq!(status, 404);
                assert_eq!(message, "model not found");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_error_body_with_success_status() {
        let reply = RawReply::new(200, r#"{"error":{"message":"invalid model"}}"#);
        assert!(matches!(
            classify(&reply),
            Err(ReplyError::Failed { status: 200, .. })
        ));
    }

    #[test]
    fn test_empty_completion() {
        assert_eq!(classify(&RawReply::new(200, completion("  "))), Err(ReplyError::Empty));
        assert_eq!(classify(&RawReply::new(200, "not json")), Err(ReplyError::Empty));
    }
}
