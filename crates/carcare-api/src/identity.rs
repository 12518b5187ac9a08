//! Caller identity resolution.
//!
//! Every user-scoped route runs behind [`resolve_identity`], which reads the
//! `X-User-Id` header (falling back to the configured default user) and
//! stores the resulting [`UserId`] in the request extensions. The identity
//! is taken at face value; no credential is checked.

use axum::extract::{Request, State};
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use carcare_core::types::UserId;

use crate::error::ApiError;
use crate::state::AppState;

/// Header carrying the caller identity.
pub const USER_ID_HEADER: &str = "x-user-id";

/// Longest identity accepted from the header.
const MAX_USER_ID_LEN: usize = 128;

/// Resolve the caller from request headers.
///
/// A missing or blank header yields `default_user`.
pub fn caller_from_headers(headers: &HeaderMap, default_user: &UserId) -> Result<UserId, ApiError> {
    let Some(value) = headers.get(USER_ID_HEADER) else {
        return Ok(default_user.clone());
    };

    let value = value
        .to_str()
        .map_err(|_| ApiError::BadRequest("Invalid X-User-Id header encoding".to_string()))?
        .trim();

    if value.is_empty() {
        return Ok(default_user.clone());
    }
    if value.chars().count() > MAX_USER_ID_LEN {
        return Err(ApiError::BadRequest(format!(
            "X-User-Id exceeds {} characters",
            MAX_USER_ID_LEN
        )));
    }
    Ok(UserId::new(value))
}

/// Middleware that attaches the caller's [`UserId`] to the request.
pub async fn resolve_identity(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Response {
    match caller_from_headers(req.headers(), &state.default_user) {
        Ok(user) => {
            req.extensions_mut().insert(user);
            next.run(req).await
        }
        Err(e) => e.into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn default_user() -> UserId {
        UserId::new("local")
    }

    #[test]
    fn test_missing_header_uses_default() {
        let headers = HeaderMap::new();
        assert_eq!(
            caller_from_headers(&headers, &default_user()).unwrap(),
            default_user()
        );
    }

    #[test]
    fn test_header_value_used() {
        let mut headers = HeaderMap::new();
        headers.insert(USER_ID_HEADER, HeaderValue::from_static("  driver-7 "));
        assert_eq!(
            caller_from_headers(&headers, &default_user()).unwrap(),
            UserId::new("driver-7")
        );
    }

    #[test]
    fn test_blank_header_uses_default() {
        let mut headers = HeaderMap::new();
        headers.insert(USER_ID_HEADER, HeaderValue::from_static("   "));
        assert_eq!(
            caller_from_headers(&headers, &default_user()).unwrap(),
            default_user()
        );
    }

    #[test]
    fn test_non_ascii_header_rejected() {
        let mut headers = HeaderMap::new();
        headers.insert(USER_ID_HEADER, HeaderValue::from_bytes(b"caf\xe9").unwrap());
        assert!(matches!(
            caller_from_headers(&headers, &default_user()),
            Err(ApiError::BadRequest(_))
        ));
    }

    #[test]
    fn test_overlong_header_rejected() {
        let mut headers = HeaderMap::new();
        let long = "u".repeat(MAX_USER_ID_LEN + 1);
        headers.insert(USER_ID_HEADER, HeaderValue::from_str(&long).unwrap());
        assert!(caller_from_headers(&headers, &default_user()).is_err());
    }
}
