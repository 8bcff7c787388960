//! # API Route Modules
//!
//! - `agreements`: the lifecycle operations and read models.
//! - `tokens`: the funding source (mint, approve, balances).
//! - `oracle`: the delivery-quality feed.
//! - `erp`: the in-process ERP simulator.
//! - `cas`: content-addressed JSON pinning.
//! - `events`: the audit log.

pub mod agreements;
pub mod cas;
pub mod erp;
pub mod events;
pub mod oracle;
pub mod tokens;
