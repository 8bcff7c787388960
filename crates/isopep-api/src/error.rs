//! # API Error Types
//!
//! Structured error type implementing `axum::response::IntoResponse`.
//! Domain errors from the agreement engine keep their machine-readable
//! kind as the response `code`; the HTTP status is chosen by kind.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use utoipa::ToSchema;

use isopep_agreement::{AgreementError, OracleError};
use isopep_connect::ConnectError;

/// Structured JSON error response body.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

/// Inner error detail.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorDetail {
    /// Machine-readable error code (e.g., "NOT_FOUND", "INSUFFICIENT_FUNDS").
    pub code: String,
    /// Human-readable error message.
    pub message: String,
    /// Additional details, present only for client errors.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// Application-level error type that implements [`IntoResponse`] for Axum.
#[derive(Error, Debug)]
pub enum AppError {
    /// Resource not found (404).
    #[error("not found: {0}")]
    NotFound(String),

    /// Request validation failed (422).
    #[error("validation error: {0}")]
    Validation(String),

    /// Request could not be parsed (400).
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Missing caller identity or bearer token (401).
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// A backing service is not available (503).
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),

    /// Internal server error (500). Message is logged but not returned to client.
    #[error("internal error: {0}")]
    Internal(String),

    /// Rejected by the agreement engine.
    #[error(transparent)]
    Agreement(#[from] AgreementError),
}

fn agreement_status(err: &AgreementError) -> StatusCode {
    match err {
        AgreementError::Unauthorized { .. } | AgreementError::NotAccepted { .. } => {
            StatusCode::FORBIDDEN
        }
        AgreementError::InvalidState { .. }
        | AgreementError::AlreadyActive { .. }
        | AgreementError::EscrowIntegrity { .. } => StatusCode::CONFLICT,
        AgreementError::DeadlinePassed { .. }
        | AgreementError::InsufficientFunds { .. }
        | AgreementError::InvalidRating { .. }
        | AgreementError::InvalidArgument { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        AgreementError::NotFound { .. } => StatusCode::NOT_FOUND,
        AgreementError::Journal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn agreement_details(err: &AgreementError) -> Option<serde_json::Value> {
    match err {
        AgreementError::Unauthorized { operation, required, .. } => Some(json!({
            "operation": operation,
            "required_role": required.as_str(),
        })),
        AgreementError::InvalidState {
            operation,
            current,
            expected,
        } => Some(json!({
            "operation": operation,
            "current": current,
            "expected": expected,
        })),
        AgreementError::DeadlinePassed { deadline, now } => Some(json!({
            "deadline": deadline,
            "now": now,
        })),
        AgreementError::InsufficientFunds {
            reason,
            required,
            available,
        } => Some(json!({
            "reason": reason,
            "required": required,
            "available": available,
        })),
        _ => None,
    }
}

impl AppError {
    /// Return the HTTP status code and machine-readable error code for this error.
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            Self::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            Self::Validation(_) => (StatusCode::UNPROCESSABLE_ENTITY, "VALIDATION_ERROR"),
            Self::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            Self::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
            Self::ServiceUnavailable(_) => (StatusCode::SERVICE_UNAVAILABLE, "SERVICE_UNAVAILABLE"),
            Self::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
            Self::Agreement(e) => (agreement_status(e), e.kind()),
        }
    }

    fn is_internal(&self) -> bool {
        matches!(
            self,
            Self::Internal(_) | Self::Agreement(AgreementError::Journal(_))
        )
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();

        let message = if self.is_internal() {
            tracing::error!(error = %self, "internal server error");
            "An internal error occurred".to_string()
        } else {
            match &self {
                Self::Agreement(e) => e.to_string(),
                other => other.to_string(),
            }
        };

        let details = match &self {
            Self::Agreement(e) => agreement_details(e),
            _ => None,
        };

        let body = ErrorBody {
            error: ErrorDetail {
                code: code.to_string(),
                message,
                details,
            },
        };

        (status, Json(body)).into_response()
    }
}

impl From<OracleError> for AppError {
    fn from(err: OracleError) -> Self {
        match err {
            OracleError::Unavailable(_) => Self::ServiceUnavailable(err.to_string()),
        }
    }
}

impl From<ConnectError> for AppError {
    fn from(err: ConnectError) -> Self {
        match err {
            ConnectError::Cas(msg) if msg.contains("canonicalization") => Self::Validation(msg),
            other => Self::Internal(other.to_string()),
        }
    }
}

impl From<isopep_core::ValidationError> for AppError {
    fn from(err: isopep_core::ValidationError) -> Self {
        Self::BadRequest(err.to_string())
    }
}
