//! # isopep-connect
//!
//! Collaborators that sit outside the agreement engine and talk to it only
//! through its public API and event outbox:
//!
//! - [`cas`]: content-addressed uploads producing `documentRef` values.
//! - [`erp`]: ERP sync notifier with a status-by-id query.
//! - [`relay`]: at-least-once delivery of finalization events to the ERP,
//!   with exponential backoff.
//! - [`verifier`]: asynchronous proof verification over submission events.
//!
//! None of these can change agreement state.

pub mod cas;
pub mod erp;
pub mod error;
pub mod relay;
pub mod verifier;

pub use cas::{FsCas, MemoryCas, UploadService};
pub use erp::{BoxFuture, ErpNotifier, HttpErpNotifier, MemoryErp, SyncRecord, SyncStatus};
pub use error::ConnectError;
pub use relay::{OutboxRelay, RelayReport, RetryPolicy, RELAY_CONSUMER};
pub use verifier::{AllowlistVerifier, ProofAuditor, Verdict, VerdictBook, AUDITOR_CONSUMER};
