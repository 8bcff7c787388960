//! # isopep-agreement
//!
//! The supply-agreement lifecycle engine: a role-gated state machine with
//! escrow accounting, deadline enforcement and dispute arbitration.
//!
//! - [`state`]: lifecycle states and the transition graph.
//! - [`roles`]: deployment identities and authorization predicates.
//! - [`escrow`]: the single fund balance tied to an agreement.
//! - [`supplier`]: acceptance flags and ratings.
//! - [`dispute`]: the arbitration decision table.
//! - [`proof`]: accept-and-record attestation store.
//! - [`oracle`]: delivery-quality feed interface.
//! - [`funding`]: token balances and allowances backing `confirmPayment`.
//! - [`agreement`]: the aggregate and its operations.
//! - [`event`]: the notification outbox.
//! - [`journal`]: write-ahead records and replay.
//! - [`engine`]: serialized, journaled entry point.
//!
//! ## Crate Policy
//!
//! - A rejected operation changes nothing and emits nothing.
//! - Escrow is zero in every terminal state.
//! - No operation suspends; waiting is expressed by later calls.

pub mod agreement;
pub mod clock;
pub mod command;
pub mod dispute;
pub mod engine;
pub mod error;
pub mod escrow;
pub mod event;
pub mod funding;
pub mod journal;
pub mod oracle;
pub mod proof;
pub mod repository;
pub mod roles;
pub mod state;
pub mod supplier;

pub use agreement::{Agreement, AgreementView, ProofSummary, SupplierView, Terms};
pub use clock::{Clock, ManualClock, SystemClock};
pub use command::Command;
pub use dispute::Resolution;
pub use engine::{AgreementEngine, Receipt};
pub use error::AgreementError;
pub use escrow::{EscrowLedger, Settlement, SettlementKind};
pub use event::{AgreementEvent, EventDetail, EventKind, EventLog};
pub use funding::{FundingError, TokenLedger};
pub use journal::{FileJournal, Journal, JournalError, JournalRecord, MemoryJournal, ReplayReport};
pub use oracle::{MockOracle, OracleError, OracleFeed};
pub use proof::{ProofRecord, ProofRegistry, ProofVerifier};
pub use roles::{Deployment, Role, RoleTable};
pub use state::AgreementState;
pub use supplier::{SupplierInfo, SupplierRegistry};
