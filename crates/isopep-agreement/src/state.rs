//! # Agreement Lifecycle States
//!
//! ```text
//! Negotiation ──▶ Pending ──▶ Dispatched ──▶ Completed
//!                                 │              ▲
//!                                 ▼              │
//!                              Disputed ─────────┤
//!                                 │
//!                                 ▼
//!                             Cancelled
//! ```
//!
//! The numeric codes are part of the external contract: clients and stored
//! journals refer to states by number. `PendingPayment` (1) and
//! `InProgress` (3) are declared but no operation ever enters them; they
//! keep the numbering of the remaining states stable.
//!
//! Transitions are validated against [`AgreementState::valid_successors`].
//! Terminal states (Completed, Cancelled) have no successors.

use serde::{Deserialize, Serialize};

use isopep_core::{PartyId, Timestamp};

/// Lifecycle state of a supply agreement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(u8)]
pub enum AgreementState {
    /// Terms published; suppliers may accept and the buyer may fund.
    Negotiation = 0,
    /// Declared, never entered.
    PendingPayment = 1,
    /// Started by the buyer; waiting for an accepted supplier to dispatch.
    Pending = 2,
    /// Declared, never entered.
    InProgress = 3,
    /// Goods dispatched; waiting for the oracle's delivery report.
    Dispatched = 4,
    /// Escrow released to the supplier (terminal).
    Completed = 5,
    /// Delivery reported as failed; waiting for the arbitrator.
    Disputed = 6,
    /// Escrow refunded to the buyer (terminal).
    Cancelled = 7,
}

impl AgreementState {
    /// All states in numeric order.
    pub const ALL: [AgreementState; 8] = [
        Self::Negotiation,
        Self::PendingPayment,
        Self::Pending,
        Self::InProgress,
        Self::Dispatched,
        Self::Completed,
        Self::Disputed,
        Self::Cancelled,
    ];

    /// The numeric state code.
    pub fn code(&self) -> u8 {
        *self as u8
    }

    /// Look up a state by its numeric code.
    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.get(usize::from(code)).copied()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Negotiation => "NEGOTIATION",
            Self::PendingPayment => "PENDING_PAYMENT",
            Self::Pending => "PENDING",
            Self::InProgress => "IN_PROGRESS",
            Self::Dispatched => "DISPATCHED",
            Self::Completed => "COMPLETED",
            Self::Disputed => "DISPUTED",
            Self::Cancelled => "CANCELLED",
        }
    }

    /// Completed and Cancelled are final.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }

    /// States reachable in one step.
    pub fn valid_successors(&self) -> &'static [AgreementState] {
        match self {
            Self::Negotiation => &[Self::Pending],
            Self::Pending => &[Self::Dispatched],
            Self::Dispatched => &[Self::Completed, Self::Disputed],
            Self::Disputed => &[Self::Completed, Self::Cancelled],
            Self::PendingPayment | Self::InProgress | Self::Completed | Self::Cancelled => &[],
        }
    }

    pub fn can_transition_to(&self, target: AgreementState) -> bool {
        self.valid_successors().contains(&target)
    }

    /// Depth along the lifecycle graph. Strictly increases on every
    /// transition, unlike the numeric code (Disputed → Completed is 6 → 5).
    pub fn progress(&self) -> u8 {
        match self {
            Self::Negotiation => 0,
            Self::PendingPayment => 1,
            Self::Pending => 2,
            Self::InProgress => 3,
            Self::Dispatched => 4,
            Self::Disputed => 5,
            Self::Completed | Self::Cancelled => 6,
        }
    }
}

impl std::fmt::Display for AgreementState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single committed state transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionRecord {
    pub from: AgreementState,
    pub to: AgreementState,
    /// Operation that caused the transition.
    pub operation: String,
    pub caller: PartyId,
    pub at: Timestamp,
}
