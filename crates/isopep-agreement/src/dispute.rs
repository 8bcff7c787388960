//! # Dispute Resolution
//!
//! Decision table applied when the arbitrator rules on a disputed delivery.
//! This is the only place where the finalization path diverges after a
//! failed delivery report.
//!
//! | Token          | Payee               | Escrow  | Next state |
//! |----------------|---------------------|---------|------------|
//! | `RefundBuyer`  | buyer               | refund  | Cancelled  |
//! | `ReleaseFunds` | dispatching supplier| release | Completed  |
//!
//! Any other token is rejected with `InvalidArgument` and has no effect.

use serde::{Deserialize, Serialize};

use isopep_core::PartyId;

use crate::error::AgreementError;
use crate::escrow::SettlementKind;
use crate::roles::RoleTable;
use crate::state::AgreementState;

/// An arbitrator's decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Resolution {
    RefundBuyer,
    ReleaseFunds,
}

impl Resolution {
    /// Parse a decision token. Tokens are case-sensitive.
    pub fn parse(token: &str) -> Result<Self, AgreementError> {
        match token {
            "RefundBuyer" => Ok(Self::RefundBuyer),
            "ReleaseFunds" => Ok(Self::ReleaseFunds),
            other => Err(AgreementError::invalid_argument(format!(
                "unknown dispute decision {other:?}: expected RefundBuyer or ReleaseFunds"
            ))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RefundBuyer => "RefundBuyer",
            Self::ReleaseFunds => "ReleaseFunds",
        }
    }

    pub fn target_state(&self) -> AgreementState {
        match self {
            Self::RefundBuyer => AgreementState::Cancelled,
            Self::ReleaseFunds => AgreementState::Completed,
        }
    }

    pub fn settlement_kind(&self) -> SettlementKind {
        match self {
            Self::RefundBuyer => SettlementKind::Refund,
            Self::ReleaseFunds => SettlementKind::Release,
        }
    }
}

impl std::fmt::Display for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of applying the decision table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ruling {
    pub resolution: Resolution,
    pub payee: PartyId,
    pub kind: SettlementKind,
    pub next_state: AgreementState,
}

/// Apply the decision table. Pure: reads the inputs, mutates nothing.
pub fn rule(
    decision: &str,
    roles: &RoleTable,
    dispatched_by: Option<&PartyId>,
) -> Result<Ruling, AgreementError> {
    let resolution = Resolution::parse(decision)?;
    let payee = match resolution {
        Resolution::RefundBuyer => roles.buyer().clone(),
        Resolution::ReleaseFunds => dispatched_by.cloned().ok_or_else(|| AgreementError::EscrowIntegrity {
            reason: "disputed agreement has no dispatching supplier".into(),
        })?,
    };
    Ok(Ruling {
        resolution,
        payee,
        kind: resolution.settlement_kind(),
        next_state: resolution.target_state(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::roles::Deployment;

    fn party(s: &str) -> PartyId {
        PartyId::new(s).unwrap()
    }

    fn roles() -> RoleTable {
        Deployment {
            buyer: party("buyer"),
            oracle: party("oracle"),
            arbitrator: party("arbitrator"),
        }
        .role_table()
    }

    #[test]
    fn refund_goes_to_buyer_and_cancels() {
        let r = rule("RefundBuyer", &roles(), Some(&party("s3"))).unwrap();
        assert_eq!(r.payee, party("buyer"));
        assert_eq!(r.kind, SettlementKind::Refund);
        assert_eq!(r.next_state, AgreementState::Cancelled);
    }

    #[test]
    fn release_goes_to_dispatcher_and_completes() {
        let r = rule("ReleaseFunds", &roles(), Some(&party("s3"))).unwrap();
        assert_eq!(r.payee, party("s3"));
        assert_eq!(r.kind, SettlementKind::Release);
        assert_eq!(r.next_state, AgreementState::Completed);
    }

    #[test]
    fn unknown_tokens_rejected() {
        for token in ["Bogus", "", "refundbuyer", "RefundBuyer ", "RELEASEFUNDS"] {
            assert!(
                matches!(
                    rule(token, &roles(), Some(&party("s3"))),
                    Err(AgreementError::InvalidArgument { .. })
                ),
                "{token:?} should be rejected"
            );
        }
    }

    #[test]
    fn parse_display_roundtrip() {
        for r in [Resolution::RefundBuyer, Resolution::ReleaseFunds] {
            assert_eq!(Resolution::parse(&r.to_string()).unwrap(), r);
        }
    }
}
