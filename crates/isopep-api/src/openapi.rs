//! # OpenAPI Specification Assembly
//!
//! Assembles all utoipa-documented routes into a single OpenAPI document
//! served at `/openapi.json`.

use axum::routing::get;
use axum::{Json, Router};
use utoipa::OpenApi;

use crate::state::AppState;

/// Assembled OpenAPI spec for the entire API surface.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "isopep API",
        description = "Supply-agreement lifecycle: escrowed payment, dispatch, oracle-reported delivery, arbitration, and supplier ratings.",
        license(name = "MIT")
    ),
    paths(
        // Agreements
        crate::routes::agreements::create_agreement,
        crate::routes::agreements::get_active,
        crate::routes::agreements::get_agreement,
        crate::routes::agreements::accept_agreement,
        crate::routes::agreements::confirm_payment,
        crate::routes::agreements::start_agreement,
        crate::routes::agreements::dispatch_order,
        crate::routes::agreements::update_delivery,
        crate::routes::agreements::resolve_dispute,
        crate::routes::agreements::rate_supplier,
        crate::routes::agreements::submit_proof,
        crate::routes::agreements::get_supplier,
        // Tokens
        crate::routes::tokens::mint,
        crate::routes::tokens::approve,
        crate::routes::tokens::balance,
        // Oracle
        crate::routes::oracle::get_oracle_data,
        crate::routes::oracle::set_oracle_data,
        // ERP
        crate::routes::erp::sync_agreement,
        crate::routes::erp::sync_status,
        // CAS
        crate::routes::cas::pin_json,
        // Audit log
        crate::routes::events::list_events,
    ),
    components(schemas(
        crate::error::ErrorBody,
        crate::error::ErrorDetail,
        crate::routes::agreements::CreateAgreementRequest,
        crate::routes::agreements::PaymentRequest,
        crate::routes::agreements::DeliveryRequest,
        crate::routes::agreements::ResolveRequest,
        crate::routes::agreements::RateRequest,
        crate::routes::agreements::ProofRequest,
        crate::routes::agreements::ReceiptResponse,
        crate::routes::agreements::SupplierResponse,
        crate::routes::tokens::MintRequest,
        crate::routes::tokens::ApproveRequest,
        crate::routes::tokens::BalanceResponse,
        crate::routes::oracle::OracleDataResponse,
        crate::routes::oracle::SetOracleRequest,
        crate::routes::erp::SyncResponse,
        crate::routes::erp::SyncStatusResponse,
        crate::routes::cas::PinResponse,
    )),
    tags(
        (name = "agreements", description = "Agreement lifecycle"),
        (name = "tokens", description = "Funding source"),
        (name = "oracle", description = "Delivery-quality feed"),
        (name = "erp", description = "ERP sync simulator"),
        (name = "cas", description = "Content-addressed documents"),
        (name = "events", description = "Audit log"),
    )
)]
pub struct ApiDoc;

/// Serves the OpenAPI JSON spec at `/openapi.json`.
pub fn router() -> Router<AppState> {
    Router::new().route("/openapi.json", get(openapi_json))
}

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_route_is_documented() {
        let doc = ApiDoc::openapi();
        for path in [
            "/v1/agreements",
            "/v1/agreements/{id}/payment",
            "/v1/agreements/{id}/suppliers/{supplier}",
            "/v1/tokens/{owner}",
            "/oracle-data",
            "/sync-status/{id}",
            "/api/ipfs/pin-json",
            "/v1/events",
        ] {
            assert!(doc.paths.paths.contains_key(path), "{path} missing");
        }
    }
}
