//! Error types for the orchestrator client

use serde_json::Value;
use thiserror::Error;

/// Result type alias for client operations
pub type Result<T> = std::result::Result<T, ClientError>;

#[derive(Debug, Error)]
pub enum ClientError {
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    /// API returned an error status code
    #[error("API error (status {status}): {message}")]
    ApiError { status: u16, message: String },

    /// Failed to parse response
    #[error("Failed to parse response: {0}")]
    ParseError(String),
}

impl ClientError {
    /// Builds an API error from a status code and the raw response body
    ///
    /// JSON error bodies are reduced to their messages; anything else is
    /// kept verbatim.
    pub fn api_error(status: u16, body: &str) -> Self {
        Self::ApiError {
            status,
            message: error_message(body),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::ApiError { status: 404, .. })
    }
}

fn error_message(body: &str) -> String {
    let Ok(value) = serde_json::from_str::<Value>(body) else {
        return body.trim().to_string();
    };

    if let Some(errors) = value.get("errors").and_then(Value::as_array) {
        return errors
            .iter()
            .filter_map(Value::as_str)
            .collect::<Vec<_>>()
            .join("; ");
    }

    match (
        value.get("message").and_then(Value::as_str),
        value.get("error").and_then(Value::as_str),
    ) {
        (Some(message), _) => message.to_string(),
        (None, Some(error)) => error.to_string(),
        (None, None) => body.trim().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_errors_are_joined() {
        let err = ClientError::api_error(
            422,
            r#"{"errors":["Payload can't be blank","Max retries must be a non-negative integer"]}"#,
        );
        assert_eq!(
            err.to_string(),
            "API error (status 422): Payload can't be blank; Max retries must be a non-negative integer"
        );
    }

    #[test]
    fn test_rate_limit_prefers_message() {
        let err = ClientError::api_error(
            429,
            r#"{"error":"Rate limit exceeded","message":"Too many requests. Please try again later.","retry_after":6}"#,
        );
        assert!(matches!(err, ClientError::ApiError { status: 429, .. }));
        assert!(err.to_string().ends_with("Too many requests. Please try again later."));
    }

    #[test]
    fn test_plain_bodies_are_kept() {
        let err = ClientError::api_error(404, r#"{"error":"Job 1 not found"}"#);
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "API error (status 404): Job 1 not found");

        let err = ClientError::api_error(502, "bad gateway\n");
        assert_eq!(err.to_string(), "API error (status 502): bad gateway");
    }
}
