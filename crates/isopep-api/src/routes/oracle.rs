//! # Oracle Feed API
//!
//! `GET /oracle-data` reads the feed the engine exposes as
//! `getOracleData`. `PUT /oracle-data` publishes a new answer to the mock
//! feed, standing in for the external data provider.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::AppError;
use crate::extractors::extract_json;
use crate::state::AppState;

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OracleDataResponse {
    /// Latest answer, as a decimal string.
    pub oracle_data: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct SetOracleRequest {
    pub value: i64,
}

/// Build the oracle router.
pub fn router() -> Router<AppState> {
    Router::new().route("/oracle-data", get(get_oracle_data).put(set_oracle_data))
}

/// GET /oracle-data: Latest feed value.
#[utoipa::path(
    get,
    path = "/oracle-data",
    responses(
        (status = 200, description = "Latest answer", body = OracleDataResponse),
        (status = 503, description = "Feed has no answer", body = crate::error::ErrorBody),
    ),
    tag = "oracle"
)]
pub(crate) async fn get_oracle_data(
    State(state): State<AppState>,
) -> Result<Json<OracleDataResponse>, AppError> {
    let value = state.engine.oracle_data()?;
    Ok(Json(OracleDataResponse {
        oracle_data: value.to_string(),
    }))
}

/// PUT /oracle-data: Publish a new answer to the mock feed.
#[utoipa::path(
    put,
    path = "/oracle-data",
    request_body = SetOracleRequest,
    responses(
        (status = 200, description = "Answer published", body = OracleDataResponse),
    ),
    tag = "oracle"
)]
pub(crate) async fn set_oracle_data(
    State(state): State<AppState>,
    body: Result<Json<SetOracleRequest>, JsonRejection>,
) -> Result<Json<OracleDataResponse>, AppError> {
    let req = extract_json(body)?;
    state.oracle.set_latest_answer(i128::from(req.value));
    tracing::info!(value = req.value, "oracle answer published");
    Ok(Json(OracleDataResponse {
        oracle_data: req.value.to_string(),
    }))
}
