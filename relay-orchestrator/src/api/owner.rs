//! Caller identification
//!
//! Requests name their owner in the `X-Owner-Id` header. The header is
//! trusted as-is; authenticating it is left to whatever sits in front of
//! the orchestrator.

use axum::{extract::FromRequestParts, http::request::Parts};

use crate::api::error::ApiError;

pub const OWNER_HEADER: &str = "x-owner-id";

/// Owner of the current request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OwnerId(pub i64);

impl OwnerId {
    /// Reads the owner from request headers, if present and well-formed
    pub fn from_headers(headers: &axum::http::HeaderMap) -> Option<Self> {
        headers
            .get(OWNER_HEADER)?
            .to_str()
            .ok()?
            .trim()
            .parse()
            .ok()
            .map(OwnerId)
    }
}

impl<S> FromRequestParts<S> for OwnerId
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Self::from_headers(&parts.headers).ok_or_else(|| {
            ApiError::Unauthorized("Missing or invalid X-Owner-Id header".to_string())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderMap, HeaderValue};

    #[test]
    fn test_owner_from_headers() {
        let mut headers = HeaderMap::new();
        assert_eq!(OwnerId::from_headers(&headers), None);

        headers.insert(OWNER_HEADER, HeaderValue::from_static("42"));
        assert_eq!(OwnerId::from_headers(&headers), Some(OwnerId(42)));

        headers.insert(OWNER_HEADER, HeaderValue::from_static("alice"));
        assert_eq!(OwnerId::from_headers(&headers), None);
    }
}
