//! # Roles and Authorization
//!
//! The buyer, oracle, and arbitrator identities are fixed by the
//! [`Deployment`] and copied into each agreement's [`RoleTable`] when the
//! agreement is created. From then on the table is immutable, and every
//! authorization decision is a pure function of the table and the caller.
//!
//! Supplier is not a fixed role: any identity other than the buyer becomes
//! a supplier candidate by accepting the agreement. That membership lives
//! in the supplier registry, not here.

use serde::{Deserialize, Serialize};

use isopep_core::PartyId;

/// The roles an operation may require.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Buyer,
    /// An accepted supplier, or for `acceptAgreement` any non-buyer.
    Supplier,
    Oracle,
    Arbitrator,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Buyer => "buyer",
            Self::Supplier => "supplier",
            Self::Oracle => "oracle",
            Self::Arbitrator => "arbitrator",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identities fixed for the lifetime of an engine instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deployment {
    /// Creates agreements, funds escrow, rates suppliers. Also issues test tokens.
    pub buyer: PartyId,
    /// Reports delivery outcome.
    pub oracle: PartyId,
    /// Resolves disputes.
    pub arbitrator: PartyId,
}

impl Deployment {
    /// Snapshot the fixed roles for a new agreement.
    pub fn role_table(&self) -> RoleTable {
        RoleTable {
            buyer: self.buyer.clone(),
            oracle: self.oracle.clone(),
            arbitrator: self.arbitrator.clone(),
        }
    }
}

/// Role membership captured at agreement creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleTable {
    buyer: PartyId,
    oracle: PartyId,
    arbitrator: PartyId,
}

impl RoleTable {
    pub fn buyer(&self) -> &PartyId {
        &self.buyer
    }

    pub fn oracle(&self) -> &PartyId {
        &self.oracle
    }

    pub fn arbitrator(&self) -> &PartyId {
        &self.arbitrator
    }
}

pub fn is_buyer(table: &RoleTable, caller: &PartyId) -> bool {
    &table.buyer == caller
}

pub fn is_oracle(table: &RoleTable, caller: &PartyId) -> bool {
    &table.oracle == caller
}

pub fn is_arbitrator(table: &RoleTable, caller: &PartyId) -> bool {
    &table.arbitrator == caller
}

/// Only non-buyers may become suppliers.
pub fn may_accept(table: &RoleTable, caller: &PartyId) -> bool {
    !is_buyer(table, caller)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn party(s: &str) -> PartyId {
        PartyId::new(s).unwrap()
    }

    fn table() -> RoleTable {
        Deployment {
            buyer: party("buyer"),
            oracle: party("oracle"),
            arbitrator: party("arbitrator"),
        }
        .role_table()
    }

    #[test]
    fn predicates_match_exact_identity() {
        let t = table();
        assert!(is_buyer(&t, &party("buyer")));
        assert!(!is_buyer(&t, &party("Buyer")));
        assert!(is_oracle(&t, &party("oracle")));
        assert!(!is_oracle(&t, &party("buyer")));
        assert!(is_arbitrator(&t, &party("arbitrator")));
        assert!(!is_arbitrator(&t, &party("oracle")));
    }

    #[test]
    fn buyer_may_not_accept() {
        let t = table();
        assert!(!may_accept(&t, &party("buyer")));
        assert!(may_accept(&t, &party("s3")));
        assert!(may_accept(&t, &party("oracle")));
    }

    #[test]
    fn role_display() {
        assert_eq!(Role::Arbitrator.to_string(), "arbitrator");
        assert_eq!(Role::Supplier.as_str(), "supplier");
    }
}
