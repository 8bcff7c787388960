//! # Funding Source API
//!
//! Minting, allowances and balances of the token that funds escrow.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use isopep_core::{Amount, PartyId};

use crate::auth::Caller;
use crate::error::AppError;
use crate::extractors::extract_json;
use crate::state::AppState;

#[derive(Debug, Deserialize, ToSchema)]
pub struct MintRequest {
    #[schema(value_type = String)]
    pub to: PartyId,
    #[schema(value_type = String)]
    pub amount: Amount,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ApproveRequest {
    /// Usually an agreement's escrow account, `escrow:{agreement_id}`.
    pub spender: String,
    #[schema(value_type = String)]
    pub amount: Amount,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct BalanceQuery {
    /// Also report the allowance granted to this spender.
    pub spender: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct BalanceResponse {
    pub owner: String,
    #[schema(value_type = String)]
    pub balance: Amount,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spender: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<String>)]
    pub allowance: Option<Amount>,
    #[schema(value_type = String)]
    pub total_supply: Amount,
}

/// Accepts party ids and escrow accounts; only the engine can mint into
/// or move out of the latter.
fn account(raw: &str) -> Result<PartyId, AppError> {
    serde_json::from_value(serde_json::Value::String(raw.to_string()))
        .map_err(|e| AppError::BadRequest(format!("invalid account {raw:?}: {e}")))
}

/// Build the tokens router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/tokens/mint", post(mint))
        .route("/v1/tokens/approve", post(approve))
        .route("/v1/tokens/:owner", get(balance))
}

/// POST /v1/tokens/mint: Issue tokens. Buyer only.
#[utoipa::path(
    post,
    path = "/v1/tokens/mint",
    request_body = MintRequest,
    responses(
        (status = 200, description = "Tokens minted", body = BalanceResponse),
        (status = 403, description = "Caller is not the buyer", body = crate::error::ErrorBody),
    ),
    tag = "tokens"
)]
pub(crate) async fn mint(
    State(state): State<AppState>,
    Caller(caller): Caller,
    body: Result<Json<MintRequest>, JsonRejection>,
) -> Result<Json<BalanceResponse>, AppError> {
    let req = extract_json(body)?;
    let (to, amount) = (req.to.clone(), req.amount);
    state
        .run_engine(move |engine| engine.mint(&caller, &to, amount))
        .await?;
    Ok(Json(BalanceResponse {
        owner: req.to.to_string(),
        balance: state.engine.balance_of(&req.to),
        spender: None,
        allowance: None,
        total_supply: state.engine.total_supply(),
    }))
}

/// POST /v1/tokens/approve: Let `spender` pull up to `amount` of the caller's tokens.
#[utoipa::path(
    post,
    path = "/v1/tokens/approve",
    request_body = ApproveRequest,
    responses(
        (status = 200, description = "Allowance set", body = BalanceResponse),
    ),
    tag = "tokens"
)]
pub(crate) async fn approve(
    State(state): State<AppState>,
    Caller(caller): Caller,
    body: Result<Json<ApproveRequest>, JsonRejection>,
) -> Result<Json<BalanceResponse>, AppError> {
    let req = extract_json(body)?;
    let spender = account(&req.spender)?;
    let (owner, target, amount) = (caller.clone(), spender.clone(), req.amount);
    state
        .run_engine(move |engine| engine.approve(&owner, &target, amount))
        .await?;
    Ok(Json(BalanceResponse {
        owner: caller.to_string(),
        balance: state.engine.balance_of(&caller),
        spender: Some(spender.to_string()),
        allowance: Some(state.engine.allowance(&caller, &spender)),
        total_supply: state.engine.total_supply(),
    }))
}

/// GET /v1/tokens/:owner: Balance, and optionally an allowance.
#[utoipa::path(
    get,
    path = "/v1/tokens/{owner}",
    params(
        ("owner" = String, Path, description = "Token holder"),
        BalanceQuery,
    ),
    responses(
        (status = 200, description = "Balance", body = BalanceResponse),
    ),
    tag = "tokens"
)]
pub(crate) async fn balance(
    State(state): State<AppState>,
    Path(owner): Path<String>,
    Query(query): Query<BalanceQuery>,
) -> Result<Json<BalanceResponse>, AppError> {
    let owner = account(&owner)?;
    let spender = query.spender.as_deref().map(account).transpose()?;
    let allowance = spender.as_ref().map(|s| state.engine.allowance(&owner, s));
    Ok(Json(BalanceResponse {
        owner: owner.to_string(),
        balance: state.engine.balance_of(&owner),
        spender: spender.map(|s| s.to_string()),
        allowance,
        total_supply: state.engine.total_supply(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use isopep_core::AgreementId;

    #[test]
    fn escrow_accounts_are_addressable() {
        let id = AgreementId::new();
        let escrow = PartyId::escrow_account(&id);
        assert_eq!(account(escrow.as_str()).unwrap(), escrow);
        assert!(account("bad id").is_err());
    }
}
