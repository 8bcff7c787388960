//! # Content-Addressed Pinning API
//!
//! Pins a JSON document and returns its content reference, which the
//! buyer then passes as `document_ref` when creating an agreement.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::AppError;
use crate::extractors::extract_json;
use crate::state::AppState;

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct PinResponse {
    /// `sha256:<hex>` of the canonical document.
    pub cid: String,
}

/// Build the CAS router.
pub fn router() -> Router<AppState> {
    Router::new().route("/api/ipfs/pin-json", post(pin_json))
}

/// POST /api/ipfs/pin-json: Canonicalize and store a JSON document.
#[utoipa::path(
    post,
    path = "/api/ipfs/pin-json",
    request_body = serde_json::Value,
    responses(
        (status = 200, description = "Document pinned", body = PinResponse),
        (status = 422, description = "Document cannot be canonicalized", body = crate::error::ErrorBody),
    ),
    tag = "cas"
)]
pub(crate) async fn pin_json(
    State(state): State<AppState>,
    body: Result<Json<serde_json::Value>, JsonRejection>,
) -> Result<Json<PinResponse>, AppError> {
    let doc = extract_json(body)?;
    let digest = state.cas.upload_json(&doc)?;
    tracing::info!(cid = %digest, "document pinned");
    Ok(Json(PinResponse {
        cid: digest.to_string(),
    }))
}
