//! Owner-scope extractor.
//!
//! The identity gateway in front of this service authenticates callers and
//! forwards the resolved scope in the `x-owner-scope` header. Every job
//! and asset endpoint is scoped by it.

use atelier_core::types::DbId;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use crate::error::AppError;

/// Header carrying the caller's owner scope id.
pub const OWNER_SCOPE_HEADER: &str = "x-owner-scope";

/// The caller's owner scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OwnerScope(pub DbId);

impl<S: Send + Sync> FromRequestParts<S> for OwnerScope {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get(OWNER_SCOPE_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| AppError::Unauthorized(format!("Missing {OWNER_SCOPE_HEADER} header")))?;

        raw.trim()
            .parse::<DbId>()
            .ok()
            .filter(|id| *id > 0)
            .map(OwnerScope)
            .ok_or_else(|| AppError::Unauthorized(format!("Invalid {OWNER_SCOPE_HEADER} header")))
    }
}
