//! # Audit Log API
//!
//! Read-only view over the event outbox, in sequence order.

use axum::extract::{Query, State};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use utoipa::IntoParams;

use isopep_agreement::{AgreementEvent, EventKind};

use crate::error::AppError;
use crate::state::AppState;

const DEFAULT_LIMIT: usize = 100;
const MAX_LIMIT: usize = 1_000;

#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct EventQuery {
    /// Only events of this kind, e.g. `PaymentConfirmed`.
    pub kind: Option<String>,
    /// Only events with a sequence number above this one.
    #[serde(default)]
    pub after: u64,
    pub limit: Option<usize>,
}

/// Build the events router.
pub fn router() -> Router<AppState> {
    Router::new().route("/v1/events", get(list_events))
}

/// GET /v1/events: Audit log.
#[utoipa::path(
    get,
    path = "/v1/events",
    params(EventQuery),
    responses(
        (status = 200, description = "Events in sequence order", body = Vec<serde_json::Value>),
        (status = 400, description = "Unknown event kind", body = crate::error::ErrorBody),
    ),
    tag = "events"
)]
pub(crate) async fn list_events(
    State(state): State<AppState>,
    Query(query): Query<EventQuery>,
) -> Result<Json<Vec<AgreementEvent>>, AppError> {
    let kind = query
        .kind
        .as_deref()
        .map(|k| EventKind::parse(k).ok_or_else(|| AppError::BadRequest(format!("unknown event kind {k:?}"))))
        .transpose()?;
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT).min(MAX_LIMIT);
    Ok(Json(state.engine.events(query.after, kind, limit)))
}
