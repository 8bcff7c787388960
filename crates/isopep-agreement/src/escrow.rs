//! # Escrow Ledger
//!
//! Tracks the single fund balance tied to one agreement.
//!
//! ## Invariants
//!
//! - `balance == total_credited - total_disbursed`; the balance never
//!   exceeds cumulative credits and never goes negative.
//! - The balance is drained to zero exactly once, by either
//!   [`EscrowLedger::release_to`] or [`EscrowLedger::refund_to`]. After
//!   settlement every further operation is rejected.
//! - There are no partial releases.
//!
//! The ledger is bookkeeping only. Moving the underlying tokens between
//! accounts is the caller's job, done in the same atomic step.

use serde::{Deserialize, Serialize};

use isopep_core::{Amount, PartyId, Timestamp};

use crate::error::AgreementError;

/// How escrow was settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettlementKind {
    /// Paid out to the supplier.
    Release,
    /// Returned to the buyer.
    Refund,
}

impl std::fmt::Display for SettlementKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Release => f.write_str("release"),
            Self::Refund => f.write_str("refund"),
        }
    }
}

/// The one-time payout of the escrow balance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settlement {
    pub kind: SettlementKind,
    pub payee: PartyId,
    pub amount: Amount,
    pub at: Timestamp,
}

/// Escrow transaction history entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EscrowTransaction {
    Credit { amount: Amount, at: Timestamp },
    Release { payee: PartyId, amount: Amount, at: Timestamp },
    Refund { payee: PartyId, amount: Amount, at: Timestamp },
}

/// Escrow bookkeeping for one agreement.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscrowLedger {
    balance: Amount,
    total_credited: Amount,
    settlement: Option<Settlement>,
    transactions: Vec<EscrowTransaction>,
}

impl EscrowLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn balance(&self) -> Amount {
        self.balance
    }

    /// Sum of every credit ever applied.
    pub fn total_credited(&self) -> Amount {
        self.total_credited
    }

    pub fn settlement(&self) -> Option<&Settlement> {
        self.settlement.as_ref()
    }

    pub fn is_settled(&self) -> bool {
        self.settlement.is_some()
    }

    pub fn transactions(&self) -> &[EscrowTransaction] {
        &self.transactions
    }

    /// Add a confirmed deposit. Returns the new balance.
    pub fn credit(&mut self, amount: Amount, at: Timestamp) -> Result<Amount, AgreementError> {
        self.require_unsettled("credit")?;
        if amount.is_zero() {
            return Err(AgreementError::invalid_argument("escrow credit must be positive"));
        }
        let balance = self.balance.checked_add(amount).ok_or_else(|| overflow("balance"))?;
        let total = self
            .total_credited
            .checked_add(amount)
            .ok_or_else(|| overflow("total credited"))?;
        self.balance = balance;
        self.total_credited = total;
        self.transactions.push(EscrowTransaction::Credit { amount, at });
        Ok(balance)
    }

    /// Pay the full balance to the supplier. Returns the amount paid.
    pub fn release_to(&mut self, payee: &PartyId, at: Timestamp) -> Result<Amount, AgreementError> {
        self.settle(SettlementKind::Release, payee, at)
    }

    /// Return the full balance to the buyer. Returns the amount refunded.
    pub fn refund_to(&mut self, payee: &PartyId, at: Timestamp) -> Result<Amount, AgreementError> {
        self.settle(SettlementKind::Refund, payee, at)
    }

    fn settle(
        &mut self,
        kind: SettlementKind,
        payee: &PartyId,
        at: Timestamp,
    ) -> Result<Amount, AgreementError> {
        self.require_unsettled(match kind {
            SettlementKind::Release => "release",
            SettlementKind::Refund => "refund",
        })?;
        let amount = self.balance;
        self.balance = Amount::ZERO;
        self.settlement = Some(Settlement {
            kind,
            payee: payee.clone(),
            amount,
            at,
        });
        self.transactions.push(match kind {
            SettlementKind::Release => EscrowTransaction::Release {
                payee: payee.clone(),
                amount,
                at,
            },
            SettlementKind::Refund => EscrowTransaction::Refund {
                payee: payee.clone(),
                amount,
                at,
            },
        });
        Ok(amount)
    }

    fn require_unsettled(&self, operation: &str) -> Result<(), AgreementError> {
        match &self.settlement {
            Some(s) => Err(AgreementError::EscrowIntegrity {
                reason: format!("cannot {operation}: escrow already settled by {} to {}", s.kind, s.payee),
            }),
            None => Ok(()),
        }
    }
}

fn overflow(what: &str) -> AgreementError {
    AgreementError::EscrowIntegrity {
        reason: format!("escrow {what} would overflow"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at() -> Timestamp {
        Timestamp::from_epoch_secs(1_767_225_600).unwrap()
    }

    fn party(s: &str) -> PartyId {
        PartyId::new(s).unwrap()
    }

    #[test]
    fn credits_accumulate() {
        let mut e = EscrowLedger::new();
        e.credit(Amount::from(200), at()).unwrap();
        e.credit(Amount::from(50), at()).unwrap();
        assert_eq!(e.balance(), Amount::from(250));
        assert_eq!(e.total_credited(), Amount::from(250));
        assert_eq!(e.transactions().len(), 2);
    }

    #[test]
    fn release_drains_to_zero() {
        let mut e = EscrowLedger::new();
        e.credit(Amount::from(200), at()).unwrap();
        let paid = e.release_to(&party("s3"), at()).unwrap();
        assert_eq!(paid, Amount::from(200));
        assert_eq!(e.balance(), Amount::ZERO);
        let s = e.settlement().unwrap();
        assert_eq!(s.kind, SettlementKind::Release);
        assert_eq!(s.payee, party("s3"));
    }

    #[test]
    fn refund_drains_to_zero() {
        let mut e = EscrowLedger::new();
        e.credit(Amount::from(200), at()).unwrap();
        assert_eq!(e.refund_to(&party("buyer"), at()).unwrap(), Amount::from(200));
        assert!(e.balance().is_zero());
        assert_eq!(e.settlement().unwrap().kind, SettlementKind::Refund);
    }

    #[test]
    fn settles_exactly_once() {
        let mut e = EscrowLedger::new();
        e.credit(Amount::from(10), at()).unwrap();
        e.release_to(&party("s3"), at()).unwrap();
        assert!(matches!(
            e.refund_to(&party("buyer"), at()),
            Err(AgreementError::EscrowIntegrity { .. })
        ));
        assert!(matches!(
            e.release_to(&party("s3"), at()),
            Err(AgreementError::EscrowIntegrity { .. })
        ));
        assert!(matches!(
            e.credit(Amount::from(1), at()),
            Err(AgreementError::EscrowIntegrity { .. })
        ));
        assert_eq!(e.transactions().len(), 2);
    }

    #[test]
    fn unfunded_settlement_pays_zero() {
        let mut e = EscrowLedger::new();
        assert_eq!(e.refund_to(&party("buyer"), at()).unwrap(), Amount::ZERO);
        assert!(e.is_settled());
    }

    #[test]
    fn zero_credit_rejected() {
        let mut e = EscrowLedger::new();
        assert!(matches!(
            e.credit(Amount::ZERO, at()),
            Err(AgreementError::InvalidArgument { .. })
        ));
        assert!(e.transactions().is_empty());
    }

    #[test]
    fn overflow_is_rejected_without_mutation() {
        let mut e = EscrowLedger::new();
        e.credit(Amount::new(u128::MAX), at()).unwrap();
        assert!(e.credit(Amount::from(1), at()).is_err());
        assert_eq!(e.balance(), Amount::new(u128::MAX));
    }
}
