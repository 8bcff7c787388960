//! # Authentication & Caller Identity
//!
//! Two separate concerns:
//!
//! - **Bearer token.** When `AUTH_TOKEN` is set, every non-health route
//!   requires `Authorization: Bearer <token>`. The comparison is constant
//!   time.
//! - **Caller identity.** Agreement operations act on behalf of a party
//!   named in the `x-caller-id` header. The hosting runtime is responsible
//!   for authenticating that header; the engine only checks roles.

use axum::extract::Request;
use axum::http::request::Parts;
use axum::http::{header, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use subtle::ConstantTimeEq;

use isopep_core::PartyId;

use crate::error::{AppError, ErrorBody, ErrorDetail};

/// Header carrying the acting party.
pub const CALLER_HEADER: &str = "x-caller-id";

// ── Caller ──────────────────────────────────────────────────────────────────

/// The party on whose behalf the request acts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller(pub PartyId);

/// Returns 401 when the header is missing and 400 when it is not a valid
/// party id.
#[axum::async_trait]
impl<S: Send + Sync> axum::extract::FromRequestParts<S> for Caller {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get(CALLER_HEADER)
            .ok_or_else(|| AppError::Unauthorized(format!("missing {CALLER_HEADER} header")))?
            .to_str()
            .map_err(|_| AppError::BadRequest(format!("{CALLER_HEADER} is not valid ASCII")))?;
        Ok(Self(PartyId::new(raw)?))
    }
}

// ── Auth Configuration ──────────────────────────────────────────────────────

/// Auth configuration injected into request extensions.
///
/// Custom `Debug` redacts the token value to prevent credential leakage in logs.
#[derive(Clone)]
pub struct AuthConfig {
    pub token: Option<String>,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

/// Constant-time comparison of bearer tokens.
///
/// When lengths differ, performs a dummy comparison so the early return
/// costs the same as a full comparison.
fn constant_time_token_eq(provided: &str, expected: &str) -> bool {
    let provided = provided.as_bytes();
    let expected = expected.as_bytes();
    if provided.len() != expected.len() {
        let _ = expected.ct_eq(expected);
        return false;
    }
    provided.ct_eq(expected).into()
}

/// Bearer-token middleware. A no-op when no token is configured.
pub async fn auth_middleware(request: Request, next: Next) -> Response {
    let expected = request
        .extensions()
        .get::<AuthConfig>()
        .and_then(|c| c.token.clone());

    let Some(expected) = expected else {
        return next.run(request).await;
    };

    let auth_header = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());

    match auth_header {
        Some(value) => match value.strip_prefix("Bearer ") {
            Some(provided) if constant_time_token_eq(provided, &expected) => {
                next.run(request).await
            }
            Some(_) => {
                tracing::warn!("authentication failed: invalid bearer token");
                unauthorized_response("invalid bearer token")
            }
            None => {
                tracing::warn!("authentication failed: non-Bearer authorization scheme");
                unauthorized_response("authorization header must use Bearer scheme")
            }
        },
        None => {
            tracing::warn!("authentication failed: missing authorization header");
            unauthorized_response("missing authorization header")
        }
    }
}

fn unauthorized_response(message: &str) -> Response {
    let body = ErrorBody {
        error: ErrorDetail {
            code: "UNAUTHORIZED".to_string(),
            message: message.to_string(),
            details: None,
        },
    };
    (StatusCode::UNAUTHORIZED, Json(body)).into_response()
}
