//! # Agreement Error Types
//!
//! Every rejected operation returns exactly one [`AgreementError`] and
//! leaves the aggregate, the token ledger, and the event log untouched.
//! Variants carry enough context for an operator to see why the call was
//! refused without reading logs.

use isopep_core::{Amount, Timestamp};
use thiserror::Error;

use crate::journal::JournalError;
use crate::roles::Role;
use crate::state::AgreementState;

/// Errors arising from agreement operations.
#[derive(Error, Debug)]
pub enum AgreementError {
    /// The caller does not hold the role the operation requires.
    #[error("{caller} is not authorized for {operation}: requires {required}")]
    Unauthorized {
        /// The operation that was attempted.
        operation: &'static str,
        /// The calling identity.
        caller: String,
        /// The role the operation requires.
        required: Role,
    },

    /// The operation is not legal in the agreement's current state.
    #[error("{operation} is not allowed in state {current}; requires {expected}")]
    InvalidState {
        /// The operation that was attempted.
        operation: &'static str,
        /// The state the agreement is in.
        current: AgreementState,
        /// Human-readable description of the required state(s).
        expected: String,
    },

    /// The agreement deadline has elapsed.
    #[error("deadline {deadline} has passed (now {now})")]
    DeadlinePassed {
        /// The agreement deadline.
        deadline: Timestamp,
        /// The time the operation was evaluated at.
        now: Timestamp,
    },

    /// The payment amount, allowance, or balance is too small.
    #[error("insufficient funds: {reason} (required {required}, available {available})")]
    InsufficientFunds {
        /// Which check failed.
        reason: &'static str,
        /// The amount that was needed.
        required: Amount,
        /// The amount that was offered or available.
        available: Amount,
    },

    /// Ratings are integers from 1 to 5.
    #[error("invalid rating {score}: must be between 1 and 5")]
    InvalidRating {
        /// The rejected score.
        score: u32,
    },

    /// The caller has never accepted this agreement.
    #[error("{identity} has not accepted the agreement")]
    NotAccepted {
        /// The identity that lacks an acceptance record.
        identity: String,
    },

    /// An argument failed validation (bad decision token, zero quantity, ...).
    #[error("invalid argument: {reason}")]
    InvalidArgument {
        /// Why the argument was rejected.
        reason: String,
    },

    /// A non-terminal agreement already exists.
    #[error("agreement {agreement_id} is still active in state {state}")]
    AlreadyActive {
        /// The agreement currently active.
        agreement_id: String,
        /// Its state.
        state: AgreementState,
    },

    /// No agreement with this identifier.
    #[error("agreement {agreement_id} not found")]
    NotFound {
        /// The requested identifier.
        agreement_id: String,
    },

    /// Escrow bookkeeping would be violated. Indicates a broken invariant.
    #[error("escrow integrity violation: {reason}")]
    EscrowIntegrity {
        /// Description of the violated invariant.
        reason: String,
    },

    /// The write-ahead record could not be persisted; nothing was applied.
    #[error("journal error: {0}")]
    Journal(#[from] JournalError),
}

impl AgreementError {
    /// Stable machine-readable code for this error.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Unauthorized { .. } => "UNAUTHORIZED",
            Self::InvalidState { .. } => "INVALID_STATE",
            Self::DeadlinePassed { .. } => "DEADLINE_PASSED",
            Self::InsufficientFunds { .. } => "INSUFFICIENT_FUNDS",
            Self::InvalidRating { .. } => "INVALID_RATING",
            Self::NotAccepted { .. } => "NOT_ACCEPTED",
            Self::InvalidArgument { .. } => "INVALID_ARGUMENT",
            Self::AlreadyActive { .. } => "ALREADY_ACTIVE",
            Self::NotFound { .. } => "NOT_FOUND",
            Self::EscrowIntegrity { .. } => "ESCROW_INTEGRITY",
            Self::Journal(_) => "JOURNAL_ERROR",
        }
    }

    pub(crate) fn invalid_argument(reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unauthorized_display() {
        let err = AgreementError::Unauthorized {
            operation: "resolveDispute",
            caller: "mallory".into(),
            required: Role::Arbitrator,
        };
        assert_eq!(
            err.to_string(),
            "mallory is not authorized for resolveDispute: requires arbitrator"
        );
        assert_eq!(err.kind(), "UNAUTHORIZED");
    }

    #[test]
    fn invalid_state_display() {
        let err = AgreementError::InvalidState {
            operation: "dispatchOrder",
            current: AgreementState::Negotiation,
            expected: "PENDING".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("dispatchOrder"));
        assert!(msg.contains("NEGOTIATION"));
        assert!(msg.contains("PENDING"));
    }

    #[test]
    fn insufficient_funds_display() {
        let err = AgreementError::InsufficientFunds {
            reason: "amount below quantity * unit price",
            required: Amount::from(200),
            available: Amount::from(199),
        };
        let msg = err.to_string();
        assert!(msg.contains("required 200"));
        assert!(msg.contains("available 199"));
    }

    #[test]
    fn kinds_are_distinct() {
        let errors = [
            AgreementError::InvalidRating { score: 6 },
            AgreementError::NotAccepted {
                identity: "s".into(),
            },
            AgreementError::invalid_argument("Bogus"),
            AgreementError::NotFound {
                agreement_id: "x".into(),
            },
        ];
        let kinds: std::collections::HashSet<_> = errors.iter().map(|e| e.kind()).collect();
        assert_eq!(kinds.len(), errors.len());
    }
}
