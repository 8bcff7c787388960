//! # ERP Sync Notifier
//!
//! After an agreement is finalized, its terms and the transaction
//! reference are pushed to the buyer's ERP. The notifier keeps its own
//! status-by-id map, queried independently of the engine.
//!
//! Two implementations:
//!
//! - [`MemoryErp`] simulates the ERP in process and can be told to fail.
//! - [`HttpErpNotifier`] posts to an external `/sync-agreement` endpoint.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use url::Url;

use isopep_agreement::AgreementView;
use isopep_core::{AgreementId, Amount, ContentDigest, Timestamp};

use crate::error::ConnectError;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Outcome of a sync, as reported by the ERP.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    Success,
    Failed,
    Unknown,
}

impl SyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failed => "failed",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payload pushed to the ERP.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncRecord {
    pub agreement_id: AgreementId,
    pub quantity: u64,
    pub price: Amount,
    pub deadline: Timestamp,
    pub document_ref: String,
    /// Digest of the finalization event.
    pub tx_ref: ContentDigest,
}

impl SyncRecord {
    pub fn from_view(view: &AgreementView, tx_ref: ContentDigest) -> Self {
        Self {
            agreement_id: view.id,
            quantity: view.quantity,
            price: view.unit_price,
            deadline: view.deadline,
            document_ref: view.document_ref.clone(),
            tx_ref,
        }
    }
}

/// `notify(record) -> success|failure`, `statusOf(id)`.
pub trait ErpNotifier: Send + Sync {
    fn notify<'a>(&'a self, record: &'a SyncRecord) -> BoxFuture<'a, SyncStatus>;

    fn status_of<'a>(&'a self, agreement_id: &'a str) -> BoxFuture<'a, SyncStatus>;
}

// ─── In-process simulator ────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct MemoryErp {
    statuses: RwLock<HashMap<String, SyncStatus>>,
    fail_all: AtomicBool,
}

impl MemoryErp {
    pub fn new() -> Self {
        Self::default()
    }

    /// A simulator whose every sync fails until [`MemoryErp::set_failing`] resets it.
    pub fn failing() -> Self {
        let erp = Self::default();
        erp.set_failing(true);
        erp
    }

    pub fn set_failing(&self, failing: bool) {
        self.fail_all.store(failing, Ordering::SeqCst);
    }

    /// Record a sync. `force_fail` simulates a failed ERP call for this
    /// request only.
    pub fn sync(&self, record: &SyncRecord, force_fail: bool) -> SyncStatus {
        let status = if force_fail || self.fail_all.load(Ordering::SeqCst) {
            SyncStatus::Failed
        } else {
            SyncStatus::Success
        };
        self.statuses
            .write()
            .insert(record.agreement_id.to_string(), status);
        match status {
            SyncStatus::Success => {
                tracing::info!(agreement_id = %record.agreement_id, tx_ref = %record.tx_ref, "agreement synced to ERP")
            }
            _ => tracing::warn!(agreement_id = %record.agreement_id, "simulated ERP sync failure"),
        }
        status
    }

    /// `Unknown` when the id was never synced.
    pub fn status(&self, agreement_id: &str) -> SyncStatus {
        self.statuses
            .read()
            .get(agreement_id)
            .copied()
            .unwrap_or(SyncStatus::Unknown)
    }
}

impl ErpNotifier for MemoryErp {
    fn notify<'a>(&'a self, record: &'a SyncRecord) -> BoxFuture<'a, SyncStatus> {
        Box::pin(async move { self.sync(record, false) })
    }

    fn status_of<'a>(&'a self, agreement_id: &'a str) -> BoxFuture<'a, SyncStatus> {
        Box::pin(async move { self.status(agreement_id) })
    }
}

// ─── HTTP client ─────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct StatusBody {
    status: SyncStatus,
}

/// Client for an ERP exposing `POST /sync-agreement` and `GET /sync-status/{id}`.
///
/// Transport errors and non-2xx responses count as `Failed`. Retry is the
/// relay's job, not the client's.
#[derive(Debug, Clone)]
pub struct HttpErpNotifier {
    client: reqwest::Client,
    base_url: Url,
}

impl HttpErpNotifier {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ConnectError> {
        let mut base_url = Url::parse(base_url)?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ConnectError::Http {
                endpoint: base_url.to_string(),
                reason: format!("failed to build HTTP client: {e}"),
            })?;
        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    async fn post_sync(&self, record: &SyncRecord) -> Result<SyncStatus, ConnectError> {
        let endpoint = self.base_url.join("sync-agreement")?;
        let resp = self
            .client
            .post(endpoint.clone())
            .json(record)
            .send()
            .await
            .map_err(|e| ConnectError::Http {
                endpoint: endpoint.to_string(),
                reason: e.to_string(),
            })?;
        if resp.status().is_success() {
            Ok(SyncStatus::Success)
        } else {
            tracing::warn!(endpoint = %endpoint, status = %resp.status(), "ERP rejected sync");
            Ok(SyncStatus::Failed)
        }
    }

    async fn get_status(&self, agreement_id: &str) -> Result<SyncStatus, ConnectError> {
        let endpoint = self
            .base_url
            .join("sync-status/")?
            .join(agreement_id)?;
        let resp = self
            .client
            .get(endpoint.clone())
            .send()
            .await
            .map_err(|e| ConnectError::Http {
                endpoint: endpoint.to_string(),
                reason: e.to_string(),
            })?;
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(SyncStatus::Unknown);
        }
        let body: StatusBody = resp.json().await.map_err(|e| ConnectError::Http {
            endpoint: endpoint.to_string(),
            reason: format!("unreadable status body: {e}"),
        })?;
        Ok(body.status)
    }
}

impl ErpNotifier for HttpErpNotifier {
    fn notify<'a>(&'a self, record: &'a SyncRecord) -> BoxFuture<'a, SyncStatus> {
        Box::pin(async move {
            match self.post_sync(record).await {
                Ok(status) => status,
                Err(e) => {
                    tracing::warn!(agreement_id = %record.agreement_id, error = %e, "ERP sync failed");
                    SyncStatus::Failed
                }
            }
        })
    }

    fn status_of<'a>(&'a self, agreement_id: &'a str) -> BoxFuture<'a, SyncStatus> {
        Box::pin(async move {
            self.get_status(agreement_id).await.unwrap_or_else(|e| {
                tracing::warn!(agreement_id, error = %e, "ERP status query failed");
                SyncStatus::Unknown
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> SyncRecord {
        SyncRecord {
            agreement_id: AgreementId::new(),
            quantity: 1000,
            price: Amount::from(10),
            deadline: Timestamp::from_epoch_secs(1_767_225_600).unwrap(),
            document_ref: "QmHashIsopepTOPSIS2025".into(),
            tx_ref: isopep_core::sha256_raw(b"event"),
        }
    }

    #[tokio::test]
    async fn memory_erp_tracks_status() {
        let erp = MemoryErp::new();
        let r = record();
        let id = r.agreement_id.to_string();
        assert_eq!(erp.status_of(&id).await, SyncStatus::Unknown);
        assert_eq!(erp.notify(&r).await, SyncStatus::Success);
        assert_eq!(erp.status_of(&id).await, SyncStatus::Success);
    }

    #[tokio::test]
    async fn forced_failure_is_recorded() {
        let erp = MemoryErp::new();
        let r = record();
        assert_eq!(erp.sync(&r, true), SyncStatus::Failed);
        assert_eq!(erp.status(&r.agreement_id.to_string()), SyncStatus::Failed);
        erp.set_failing(true);
        assert_eq!(erp.notify(&r).await, SyncStatus::Failed);
    }

    #[test]
    fn record_uses_camel_case() {
        let json = serde_json::to_value(record()).unwrap();
        assert!(json.get("agreementId").is_some());
        assert!(json.get("documentRef").is_some());
        assert!(json.get("txRef").is_some());
    }

    #[test]
    fn base_url_gets_trailing_slash() {
        let n = HttpErpNotifier::new("http://erp.local/api", Duration::from_secs(1)).unwrap();
        assert_eq!(n.base_url().as_str(), "http://erp.local/api/");
        assert_eq!(
            n.base_url().join("sync-agreement").unwrap().as_str(),
            "http://erp.local/api/sync-agreement"
        );
    }

    #[tokio::test]
    async fn unreachable_erp_counts_as_failed() {
        let n = HttpErpNotifier::new("http://127.0.0.1:1/", Duration::from_millis(100)).unwrap();
        assert_eq!(n.notify(&record()).await, SyncStatus::Failed);
        assert_eq!(n.status_of("x").await, SyncStatus::Unknown);
    }
}
