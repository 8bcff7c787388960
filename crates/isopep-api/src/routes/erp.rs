//! # ERP Simulator API
//!
//! In-process stand-in for the buyer's ERP. The outbox relay posts here
//! when no external ERP is configured, and operators can query sync
//! status by agreement id.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use isopep_connect::{SyncRecord, SyncStatus};

use crate::error::AppError;
use crate::extractors::extract_json;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct SyncQuery {
    /// Simulate a failed ERP call.
    #[serde(default)]
    pub fail: bool,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SyncResponse {
    /// `success` or `failed`.
    pub status: String,
    pub agreement_id: String,
    /// Digest of the finalization event the sync reports.
    pub tx_hash: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SyncStatusResponse {
    pub status: String,
}

/// Build the ERP router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/sync-agreement", post(sync_agreement))
        .route("/sync-status/:id", get(sync_status))
}

/// POST /sync-agreement: Record a finalized agreement in the ERP.
#[utoipa::path(
    post,
    path = "/sync-agreement",
    params(SyncQuery),
    request_body = serde_json::Value,
    responses(
        (status = 200, description = "Synced", body = SyncResponse),
        (status = 500, description = "Simulated failure", body = SyncResponse),
    ),
    tag = "erp"
)]
pub(crate) async fn sync_agreement(
    State(state): State<AppState>,
    Query(query): Query<SyncQuery>,
    body: Result<Json<SyncRecord>, JsonRejection>,
) -> Result<(StatusCode, Json<SyncResponse>), AppError> {
    let record = extract_json(body)?;
    let status = state.erp.sync(&record, query.fail);
    let code = match status {
        SyncStatus::Success => StatusCode::OK,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    Ok((
        code,
        Json(SyncResponse {
            status: status.to_string(),
            agreement_id: record.agreement_id.to_string(),
            tx_hash: record.tx_ref.to_string(),
        }),
    ))
}

/// GET /sync-status/:id: Last sync outcome for an agreement.
#[utoipa::path(
    get,
    path = "/sync-status/{id}",
    params(("id" = String, Path, description = "Agreement ID")),
    responses(
        (status = 200, description = "Known status", body = SyncStatusResponse),
        (status = 404, description = "Never synced", body = crate::error::ErrorBody),
    ),
    tag = "erp"
)]
pub(crate) async fn sync_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SyncStatusResponse>, AppError> {
    match state.erp.status(&id) {
        SyncStatus::Unknown => Err(AppError::NotFound(format!("no sync recorded for {id}"))),
        status => Ok(Json(SyncStatusResponse {
            status: status.to_string(),
        })),
    }
}
