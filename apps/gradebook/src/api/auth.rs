//! # Authentication Module
//!
//! Service-level API key check and per-request professor identity.
//!
//! ## Usage
//!
//! When `security.api_key` is configured, send it on every request except
//! `/health`:
//! ```text
//! Authorization: Bearer <your-api-key>
//! ```
//!
//! Every grading endpoint also needs the acting professor:
//! ```text
//! X-Professor-Id: 42
//! ```

use axum::{
    body::Body,
    extract::{FromRequestParts, State},
    http::{Request, StatusCode, header, request::Parts},
    middleware::Next,
    response::Response,
};
use gradebook_core::{ActorContext, ProfessorId};
use std::sync::Arc;
use subtle::ConstantTimeEq;

/// Header carrying the acting professor's id.
pub const PROFESSOR_HEADER: &str = "x-professor-id";

// =============================================================================
// API KEY AUTHENTICATION
// =============================================================================

/// Configured API key shared with the middleware.
#[derive(Clone)]
pub struct ApiKey(pub Arc<str>);

/// Constant-time comparison over equal-length padded buffers.
fn keys_match(provided: &str, expected: &str) -> bool {
    let provided_bytes = provided.as_bytes();
    let expected_bytes = expected.as_bytes();

    let max_len = provided_bytes.len().max(expected_bytes.len());
    let mut padded_provided = vec![0u8; max_len];
    let mut padded_expected = vec![0u8; max_len];
    padded_provided[..provided_bytes.len()].copy_from_slice(provided_bytes);
    padded_expected[..expected_bytes.len()].copy_from_slice(expected_bytes);

    let bytes_match: bool = padded_provided.ct_eq(&padded_expected).into();
    bytes_match && provided_bytes.len() == expected_bytes.len()
}

/// API key authentication middleware.
///
/// `/health` is always allowed; every other endpoint requires
/// `Authorization: Bearer <key>` (a raw `<key>` is accepted too).
pub async fn api_key_auth_middleware(
    State(expected): State<ApiKey>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, (StatusCode, &'static str)> {
    if request.uri().path() == "/health" {
        return Ok(next.run(request).await);
    }

    let auth_header = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());

    match auth_header {
        Some(header_value) => {
            let provided_key = header_value.strip_prefix("Bearer ").unwrap_or(header_value);
            if keys_match(provided_key, &expected.0) {
                Ok(next.run(request).await)
            } else {
                tracing::warn!(
                    event = "auth_failure",
                    reason = "invalid_api_key",
                    "Authentication failed: invalid API key"
                );
                Err((StatusCode::UNAUTHORIZED, "Unauthorized"))
            }
        }
        None => {
            tracing::warn!(
                event = "auth_failure",
                reason = "missing_authorization_header",
                "Missing Authorization header"
            );
            Err((StatusCode::UNAUTHORIZED, "Unauthorized"))
        }
    }
}

// =============================================================================
// ACTING PROFESSOR
// =============================================================================

/// The authenticated professor of a request.
#[derive(Debug, Clone, Copy)]
pub struct Actor(pub ActorContext);

impl<S: Send + Sync> FromRequestParts<S> for Actor {
    type Rejection = (StatusCode, &'static str);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let professor = parts
            .headers
            .get(PROFESSOR_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok());

        match professor {
            Some(id) => Ok(Self(ActorContext::new(ProfessorId(id)))),
            None => {
                tracing::warn!(
                    event = "auth_failure",
                    reason = "missing_professor_id",
                    "Missing or invalid X-Professor-Id header"
                );
                Err((StatusCode::UNAUTHORIZED, "Missing professor identity"))
            }
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_keys_match() {
        assert!(keys_match("secret-key", "secret-key"));
    }

    #[test]
    fn prefix_does_not_match() {
        assert!(!keys_match("secret", "secret-key"));
        assert!(!keys_match("secret-key-2", "secret-key"));
        assert!(!keys_match("", "secret-key"));
    }
}
