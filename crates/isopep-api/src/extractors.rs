//! # Extraction Helpers
//!
//! Map body and path parsing failures to [`AppError`] so every rejection
//! carries the structured error body.

use axum::extract::rejection::JsonRejection;
use axum::Json;

use isopep_core::{AgreementId, PartyId};

use crate::error::AppError;

/// Extract a JSON body, mapping deserialization errors to [`AppError::BadRequest`].
///
/// Handlers take `Result<Json<T>, JsonRejection>` and call this first:
/// ```ignore
/// async fn handler(body: Result<Json<T>, JsonRejection>) -> Result<..., AppError> {
///     let req = extract_json(body)?;
/// }
/// ```
pub fn extract_json<T>(result: Result<Json<T>, JsonRejection>) -> Result<T, AppError> {
    result
        .map(|Json(v)| v)
        .map_err(|err| AppError::BadRequest(err.body_text()))
}

/// Parse an agreement id taken from the path.
pub fn agreement_id(raw: &str) -> Result<AgreementId, AppError> {
    Ok(AgreementId::parse(raw)?)
}

/// Parse a party id taken from the path.
pub fn party_id(raw: &str) -> Result<PartyId, AppError> {
    Ok(PartyId::new(raw)?)
}
