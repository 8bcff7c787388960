//! # isopep-api: Binary Entry Point
//!
//! Starts the Axum HTTP server, the outbox relay and the proof auditor.
//! Binds to configurable port (default 8080).

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use isopep_api::state::{AppConfig, AppState};
use isopep_connect::{ErpNotifier, HttpErpNotifier, OutboxRelay, ProofAuditor};

const RELAY_INTERVAL: Duration = Duration::from_secs(2);
const AUDIT_INTERVAL: Duration = Duration::from_secs(5);
const ERP_TIMEOUT: Duration = Duration::from_secs(10);

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::from_env().context("invalid configuration")?;
    init_tracing(config.json_logs);
    tracing::info!(?config, "starting isopep-api");

    let port = config.port;
    let erp_url = config.erp_url.clone();
    let state = AppState::with_config(config).context("failed to open agreement journal")?;

    let report = state.engine.replay_report();
    if report.discarded > 0 {
        tracing::warn!(
            discarded = report.discarded,
            "journal held operations without a commit; they were discarded"
        );
    }

    let notifier: Arc<dyn ErpNotifier> = match erp_url {
        Some(url) => {
            let client = HttpErpNotifier::new(&url, ERP_TIMEOUT)
                .with_context(|| format!("invalid ISOPEP_ERP_URL {url:?}"))?;
            tracing::info!(base_url = %client.base_url(), "ERP relay targets external endpoint");
            Arc::new(client)
        }
        None => {
            tracing::info!("ERP relay targets in-process simulator");
            state.erp.clone() as Arc<dyn ErpNotifier>
        }
    };
    let relay = Arc::new(OutboxRelay::new(state.engine.clone(), notifier)).spawn(RELAY_INTERVAL);
    let auditor = Arc::new(ProofAuditor::new(
        state.engine.clone(),
        state.verifier.clone(),
        state.verdicts.clone(),
    ))
    .spawn(AUDIT_INTERVAL);

    let app = isopep_api::app(state);

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("isopep API listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    let served = axum::serve(listener, app).await;

    relay.abort();
    auditor.abort();
    served.context("server error")
}
