/// Caller identity extraction
///
/// Authentication happens upstream; the authenticator forwards the verified
/// subject in a header and this module only reads it.
use crate::error::{CardError, CardResult};
use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{request::Parts, HeaderMap},
};

/// Header carrying the authenticated subject
pub const AUTHENTICATED_SUB_HEADER: &str = "x-authenticated-sub";

/// Extract the authenticated subject from the request headers
pub fn extract_subject(headers: &HeaderMap) -> Option<String> {
    headers
        .get(AUTHENTICATED_SUB_HEADER)
        .and_then(|h| h.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// The pre-authenticated caller; rejects with 401 when absent
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    pub sub: String,
}

#[async_trait]
impl<S> FromRequestParts<S> for Caller
where
    S: Send + Sync,
{
    type Rejection = CardError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> CardResult<Self> {
        extract_subject(&parts.headers)
            .map(|sub| Caller { sub })
            .ok_or_else(|| {
                CardError::Authentication(format!("Missing {} header", AUTHENTICATED_SUB_HEADER))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_extract_subject() {
        let mut headers = HeaderMap::new();
        assert_eq!(extract_subject(&headers), None);

        headers.insert(AUTHENTICATED_SUB_HEADER, HeaderValue::from_static("  "));
        assert_eq!(extract_subject(&headers), None);

        headers.insert(AUTHENTICATED_SUB_HEADER, HeaderValue::from_static("user-123"));
        assert_eq!(extract_subject(&headers), Some("user-123".to_string()));
    }
}
