//! Extractor wrappers that report rejections as `ApiError` JSON bodies.
//!
//! Handlers use these in place of `axum::Json`, `axum::extract::Path` and
//! `axum::extract::Query` so a malformed request gets the same
//! `{error, message}` shape as every other failure.

use axum::extract::{FromRequest, FromRequestParts};

use crate::error::ApiError;

/// JSON request body. Schema errors map to 422, anything else to 400.
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct AppJson<T>(pub T);

/// Path parameters. Unparseable segments map to 400.
#[derive(Debug, FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(ApiError))]
pub struct AppPath<T>(pub T);

/// Query string parameters. Unparseable values map to 400.
#[derive(Debug, FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(ApiError))]
pub struct AppQuery<T>(pub T);
