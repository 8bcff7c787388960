//! # Agreement Lifecycle API
//!
//! One route per engine operation. The acting party comes from the
//! `x-caller-id` header; the engine decides whether that party may act.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use isopep_agreement::{AgreementEvent, AgreementState, AgreementView, Receipt, SupplierView};
use isopep_connect::Verdict;
use isopep_core::{AgreementId, Amount, PartyId, Timestamp};

use crate::auth::Caller;
use crate::error::AppError;
use crate::extractors::{agreement_id, extract_json, party_id};
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct CreateAgreementRequest {
    pub quantity: u64,
    /// Decimal string in the smallest token unit.
    #[schema(value_type = String)]
    pub unit_price: Amount,
    /// RFC 3339 UTC timestamp.
    #[schema(value_type = String)]
    pub deadline: Timestamp,
    /// Content reference of the supplier-ranking document.
    pub document_ref: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct PaymentRequest {
    #[schema(value_type = String)]
    pub amount: Amount,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct DeliveryRequest {
    pub ok: bool,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ResolveRequest {
    /// `RefundBuyer` or `ReleaseFunds`.
    pub decision: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RateRequest {
    #[schema(value_type = String)]
    pub supplier: PartyId,
    pub score: u32,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ProofRequest {
    /// Hex-encoded proof blob.
    #[serde(with = "isopep_core::hex::serde_hex")]
    #[schema(value_type = String)]
    pub blob: Vec<u8>,
}

/// Outcome of a committed operation.
#[derive(Debug, Serialize, ToSchema)]
pub struct ReceiptResponse {
    pub txn: u64,
    #[schema(value_type = Option<String>)]
    pub agreement_id: Option<AgreementId>,
    #[schema(value_type = Option<String>)]
    pub state: Option<AgreementState>,
    /// Notifications emitted by the operation.
    #[schema(value_type = Vec<Object>)]
    pub events: Vec<AgreementEvent>,
    /// Read model after the operation.
    #[schema(value_type = Option<Object>)]
    pub agreement: Option<AgreementView>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SupplierResponse {
    #[schema(value_type = Object)]
    pub supplier: SupplierView,
    /// Latest out-of-band verdict on the supplier's proof.
    #[schema(value_type = Option<Object>)]
    pub verdict: Option<Verdict>,
}

fn respond(state: &AppState, receipt: Receipt) -> ReceiptResponse {
    let agreement = receipt
        .agreement_id
        .and_then(|id| state.engine.agreement(id).ok());
    ReceiptResponse {
        txn: receipt.txn,
        agreement_id: receipt.agreement_id,
        state: receipt.state,
        events: receipt.events,
        agreement,
    }
}

/// Build the agreements router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/agreements", post(create_agreement))
        .route("/v1/agreements/active", get(get_active))
        .route("/v1/agreements/:id", get(get_agreement))
        .route("/v1/agreements/:id/accept", post(accept_agreement))
        .route("/v1/agreements/:id/payment", post(confirm_payment))
        .route("/v1/agreements/:id/start", post(start_agreement))
        .route("/v1/agreements/:id/dispatch", post(dispatch_order))
        .route("/v1/agreements/:id/delivery", post(update_delivery))
        .route("/v1/agreements/:id/resolve", post(resolve_dispute))
        .route("/v1/agreements/:id/ratings", post(rate_supplier))
        .route("/v1/agreements/:id/proofs", post(submit_proof))
        .route("/v1/agreements/:id/suppliers/:supplier", get(get_supplier))
}

/// POST /v1/agreements: Publish terms for a new agreement. Buyer only.
#[utoipa::path(
    post,
    path = "/v1/agreements",
    request_body = CreateAgreementRequest,
    responses(
        (status = 201, description = "Agreement created", body = ReceiptResponse),
        (status = 403, description = "Caller is not the buyer", body = crate::error::ErrorBody),
        (status = 409, description = "An agreement is still active", body = crate::error::ErrorBody),
        (status = 422, description = "Invalid terms", body = crate::error::ErrorBody),
    ),
    tag = "agreements"
)]
pub(crate) async fn create_agreement(
    State(state): State<AppState>,
    Caller(caller): Caller,
    body: Result<Json<CreateAgreementRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<ReceiptResponse>), AppError> {
    let req = extract_json(body)?;
    let receipt = state
        .run_engine(move |engine| {
            engine.create_agreement(
                &caller,
                req.quantity,
                req.unit_price,
                req.deadline,
                req.document_ref,
            )
        })
        .await?;
    Ok((StatusCode::CREATED, Json(respond(&state, receipt))))
}

/// GET /v1/agreements/active: Read model of the most recently created agreement.
#[utoipa::path(
    get,
    path = "/v1/agreements/active",
    responses(
        (status = 200, description = "Current agreement", body = serde_json::Value),
        (status = 404, description = "No agreement yet", body = crate::error::ErrorBody),
    ),
    tag = "agreements"
)]
pub(crate) async fn get_active(State(state): State<AppState>) -> Result<Json<AgreementView>, AppError> {
    state
        .engine
        .current()
        .map(Json)
        .ok_or_else(|| AppError::NotFound("no agreement has been created".into()))
}

/// GET /v1/agreements/:id: Read model.
#[utoipa::path(
    get,
    path = "/v1/agreements/{id}",
    params(("id" = String, Path, description = "Agreement ID")),
    responses(
        (status = 200, description = "Agreement found", body = serde_json::Value),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
    ),
    tag = "agreements"
)]
pub(crate) async fn get_agreement(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<AgreementView>, AppError> {
    Ok(Json(state.engine.agreement(agreement_id(&id)?)?))
}

/// POST /v1/agreements/:id/accept: Record the caller's acceptance.
#[utoipa::path(
    post,
    path = "/v1/agreements/{id}/accept",
    params(("id" = String, Path, description = "Agreement ID")),
    responses(
        (status = 200, description = "Acceptance recorded", body = ReceiptResponse),
        (status = 403, description = "The buyer cannot accept", body = crate::error::ErrorBody),
    ),
    tag = "agreements"
)]
pub(crate) async fn accept_agreement(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Path(id): Path<String>,
) -> Result<Json<ReceiptResponse>, AppError> {
    let id = agreement_id(&id)?;
    let receipt = state
        .run_engine(move |engine| engine.accept_agreement(id, &caller))
        .await?;
    Ok(Json(respond(&state, receipt)))
}

/// POST /v1/agreements/:id/payment: Move funds from the buyer into escrow.
#[utoipa::path(
    post,
    path = "/v1/agreements/{id}/payment",
    params(("id" = String, Path, description = "Agreement ID")),
    request_body = PaymentRequest,
    responses(
        (status = 200, description = "Escrow credited", body = ReceiptResponse),
        (status = 422, description = "Insufficient funds", body = crate::error::ErrorBody),
    ),
    tag = "agreements"
)]
pub(crate) async fn confirm_payment(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Path(id): Path<String>,
    body: Result<Json<PaymentRequest>, JsonRejection>,
) -> Result<Json<ReceiptResponse>, AppError> {
    let req = extract_json(body)?;
    let id = agreement_id(&id)?;
    let receipt = state
        .run_engine(move |engine| engine.confirm_payment(id, &caller, req.amount))
        .await?;
    Ok(Json(respond(&state, receipt)))
}

/// POST /v1/agreements/:id/start: Negotiation to Pending.
#[utoipa::path(
    post,
    path = "/v1/agreements/{id}/start",
    params(("id" = String, Path, description = "Agreement ID")),
    responses(
        (status = 200, description = "Agreement started", body = ReceiptResponse),
        (status = 422, description = "Deadline passed", body = crate::error::ErrorBody),
    ),
    tag = "agreements"
)]
pub(crate) async fn start_agreement(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Path(id): Path<String>,
) -> Result<Json<ReceiptResponse>, AppError> {
    let id = agreement_id(&id)?;
    let receipt = state
        .run_engine(move |engine| engine.start_agreement(id, &caller))
        .await?;
    Ok(Json(respond(&state, receipt)))
}

/// POST /v1/agreements/:id/dispatch: Pending to Dispatched. Accepted suppliers only.
#[utoipa::path(
    post,
    path = "/v1/agreements/{id}/dispatch",
    params(("id" = String, Path, description = "Agreement ID")),
    responses(
        (status = 200, description = "Order dispatched", body = ReceiptResponse),
        (status = 403, description = "Caller has not accepted", body = crate::error::ErrorBody),
        (status = 409, description = "Not pending", body = crate::error::ErrorBody),
    ),
    tag = "agreements"
)]
pub(crate) async fn dispatch_order(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Path(id): Path<String>,
) -> Result<Json<ReceiptResponse>, AppError> {
    let id = agreement_id(&id)?;
    let receipt = state
        .run_engine(move |engine| engine.dispatch_order(id, &caller))
        .await?;
    Ok(Json(respond(&state, receipt)))
}

/// POST /v1/agreements/:id/delivery: Oracle reports the delivery outcome.
#[utoipa::path(
    post,
    path = "/v1/agreements/{id}/delivery",
    params(("id" = String, Path, description = "Agreement ID")),
    request_body = DeliveryRequest,
    responses(
        (status = 200, description = "Completed or Disputed", body = ReceiptResponse),
        (status = 403, description = "Caller is not the oracle", body = crate::error::ErrorBody),
    ),
    tag = "agreements"
)]
pub(crate) async fn update_delivery(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Path(id): Path<String>,
    body: Result<Json<DeliveryRequest>, JsonRejection>,
) -> Result<Json<ReceiptResponse>, AppError> {
    let req = extract_json(body)?;
    let id = agreement_id(&id)?;
    let receipt = state
        .run_engine(move |engine| engine.update_delivery_status(id, &caller, req.ok))
        .await?;
    Ok(Json(respond(&state, receipt)))
}

/// POST /v1/agreements/:id/resolve: Arbitrator rules on a disputed delivery.
#[utoipa::path(
    post,
    path = "/v1/agreements/{id}/resolve",
    params(("id" = String, Path, description = "Agreement ID")),
    request_body = ResolveRequest,
    responses(
        (status = 200, description = "Dispute resolved", body = ReceiptResponse),
        (status = 422, description = "Unknown decision", body = crate::error::ErrorBody),
    ),
    tag = "agreements"
)]
pub(crate) async fn resolve_dispute(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Path(id): Path<String>,
    body: Result<Json<ResolveRequest>, JsonRejection>,
) -> Result<Json<ReceiptResponse>, AppError> {
    let req = extract_json(body)?;
    let id = agreement_id(&id)?;
    let receipt = state
        .run_engine(move |engine| engine.resolve_dispute(id, &caller, req.decision))
        .await?;
    Ok(Json(respond(&state, receipt)))
}

/// POST /v1/agreements/:id/ratings: Buyer rates an accepted supplier.
#[utoipa::path(
    post,
    path = "/v1/agreements/{id}/ratings",
    params(("id" = String, Path, description = "Agreement ID")),
    request_body = RateRequest,
    responses(
        (status = 200, description = "Rating recorded", body = ReceiptResponse),
        (status = 422, description = "Score outside 1..=5", body = crate::error::ErrorBody),
    ),
    tag = "agreements"
)]
pub(crate) async fn rate_supplier(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Path(id): Path<String>,
    body: Result<Json<RateRequest>, JsonRejection>,
) -> Result<Json<ReceiptResponse>, AppError> {
    let req = extract_json(body)?;
    let id = agreement_id(&id)?;
    let receipt = state
        .run_engine(move |engine| engine.rate_supplier(id, &caller, &req.supplier, req.score))
        .await?;
    Ok(Json(respond(&state, receipt)))
}

/// POST /v1/agreements/:id/proofs: Accepted supplier records a proof blob.
#[utoipa::path(
    post,
    path = "/v1/agreements/{id}/proofs",
    params(("id" = String, Path, description = "Agreement ID")),
    request_body = ProofRequest,
    responses(
        (status = 200, description = "Proof recorded", body = ReceiptResponse),
        (status = 403, description = "Caller has not accepted", body = crate::error::ErrorBody),
    ),
    tag = "agreements"
)]
pub(crate) async fn submit_proof(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Path(id): Path<String>,
    body: Result<Json<ProofRequest>, JsonRejection>,
) -> Result<Json<ReceiptResponse>, AppError> {
    let req = extract_json(body)?;
    let id = agreement_id(&id)?;
    let receipt = state
        .run_engine(move |engine| engine.submit_zk_proof(id, &caller, req.blob))
        .await?;
    Ok(Json(respond(&state, receipt)))
}

/// GET /v1/agreements/:id/suppliers/:supplier: Acceptance, rating and proof.
#[utoipa::path(
    get,
    path = "/v1/agreements/{id}/suppliers/{supplier}",
    params(
        ("id" = String, Path, description = "Agreement ID"),
        ("supplier" = String, Path, description = "Supplier identity"),
    ),
    responses(
        (status = 200, description = "Supplier record", body = SupplierResponse),
        (status = 404, description = "Agreement not found", body = crate::error::ErrorBody),
    ),
    tag = "agreements"
)]
pub(crate) async fn get_supplier(
    State(state): State<AppState>,
    Path((id, supplier)): Path<(String, String)>,
) -> Result<Json<SupplierResponse>, AppError> {
    let id = agreement_id(&id)?;
    let supplier = party_id(&supplier)?;
    let view = state.engine.supplier(id, &supplier)?;
    let verdict = state.verdicts.get(id, &supplier);
    Ok(Json(SupplierResponse {
        supplier: view,
        verdict,
    }))
}
