pub mod gemini;

use futures_util::future::BoxFuture;
use thiserror::Error;

use crate::credential::Credential;

pub use gemini::GeminiClient;

/// Longest response body kept in an [`ApiError::Status`].
pub const MAX_ERROR_BODY_CHARS: usize = 300;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    Text,
    Image,
}

#[derive(Debug, Clone)]
pub enum Payload {
    Prompt(String),
    /// Base64-encoded PNG
    Image(String),
}

/// One in-flight call, built at dispatch time.
///
/// The credential is a snapshot: changing the key later does not affect
/// requests that were already sent.
#[derive(Debug, Clone)]
pub struct PendingRequest {
    pub payload: Payload,
    pub credential: Credential,
}

impl PendingRequest {
    pub fn prompt(prompt: &str, credential: Credential) -> Self {
        Self {
            payload: Payload::Prompt(prompt.to_string()),
            credential,
        }
    }

    pub fn image(image_base64: String, credential: Credential) -> Self {
        Self {
            payload: Payload::Image(image_base64),
            credential,
        }
    }

    pub fn kind(&self) -> RequestKind {
        match self.payload {
            Payload::Prompt(_) => RequestKind::Text,
            Payload::Image(_) => RequestKind::Image,
        }
    }
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("API request failed with status code {status}: {body}")]
    Status { status: u16, body: String },
    #[error("Failed to parse API response: {0}")]
    Parse(String),
    #[error("API request could not be completed: {0}")]
    Transport(String),
}

impl ApiError {
    pub fn status(status: u16, body: &str) -> Self {
        ApiError::Status {
            status,
            body: truncate_chars(body, MAX_ERROR_BODY_CHARS),
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(error: reqwest::Error) -> Self {
        // The URL carries the API key as a query parameter
        ApiError::Transport(error.without_url().to_string())
    }
}

/// A generative model endpoint.
///
/// Implementations perform exactly one attempt per call and resolve to the
/// trimmed response text.
pub trait GenerativeApi: Send + Sync {
    fn generate(&self, request: PendingRequest) -> BoxFuture<'static, Result<String, ApiError>>;
}

fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((byte_idx, _)) => format!("{}...", &text[..byte_idx]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_error_truncates_body() {
        let body = "é".repeat(MAX_ERROR_BODY_CHARS + 50);
        match ApiError::status(500, &body) {
            ApiError::Status { status, body } => {
                assert_eq!(status, 500);
                assert_eq!(body.chars().count(), MAX_ERROR_BODY_CHARS + 3);
                assert!(body.ends_with("..."));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_short_body_is_kept() {
        let error = ApiError::status(404, "not found");
        assert_eq!(
            error.to_string(),
            "API request failed with status code 404: not found"
        );
    }

    #[test]
    fn test_request_kind() {
        let key = Credential::new("k").unwrap();
        assert_eq!(PendingRequest::prompt("hi", key.clone()).kind(), RequestKind::Text);
        assert_eq!(PendingRequest::image("aGk=".into(), key).kind(), RequestKind::Image);
    }
}
