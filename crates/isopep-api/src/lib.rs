//! # isopep-api: HTTP Surface
//!
//! Axum routes over the agreement engine plus the supporting services a
//! deployment needs: the mock oracle feed, the ERP simulator, and
//! content-addressed document pinning.
//!
//! ## API Surface
//!
//! | Prefix                  | Module                     |
//! |-------------------------|----------------------------|
//! | `/v1/agreements/*`      | [`routes::agreements`]     |
//! | `/v1/tokens/*`          | [`routes::tokens`]         |
//! | `/v1/events`            | [`routes::events`]         |
//! | `/oracle-data`          | [`routes::oracle`]         |
//! | `/sync-agreement`, `/sync-status/*` | [`routes::erp`] |
//! | `/api/ipfs/pin-json`    | [`routes::cas`]            |
//!
//! ## Middleware Stack (execution order)
//!
//! ```text
//! TraceLayer → AuthMiddleware → Handler
//! ```

pub mod auth;
pub mod error;
pub mod extractors;
pub mod openapi;
pub mod routes;
pub mod state;

use axum::middleware::from_fn;
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::auth::AuthConfig;
use crate::state::AppState;

/// Assemble the full application router with all routes and middleware.
///
/// Health probes (`/health/*`) are mounted outside the auth middleware
/// so they remain accessible without credentials.
pub fn app(state: AppState) -> Router {
    let auth_config = AuthConfig {
        token: state.config.auth_token.clone(),
    };

    let api = Router::new()
        .merge(routes::agreements::router())
        .merge(routes::tokens::router())
        .merge(routes::events::router())
        .merge(routes::oracle::router())
        .merge(routes::erp::router())
        .merge(routes::cas::router())
        .merge(openapi::router())
        .layer(from_fn(auth::auth_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(axum::Extension(auth_config))
        .with_state(state);

    let health = Router::new()
        .route("/health/liveness", axum::routing::get(liveness))
        .route("/health/readiness", axum::routing::get(readiness));

    Router::new().merge(health).merge(api)
}

async fn liveness() -> &'static str {
    "ok"
}

async fn readiness() -> &'static str {
    "ready"
}
