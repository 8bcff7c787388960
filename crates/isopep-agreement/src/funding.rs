//! # Funding Source
//!
//! A fungible token ledger with balances and spending allowances. The buyer
//! authorizes an agreement's escrow account to pull funds with
//! [`TokenLedger::approve`]; `confirmPayment` then moves the amount with
//! [`TokenLedger::transfer_from`]. Release and refund move funds out of the
//! escrow account with [`TokenLedger::transfer`].
//!
//! Conservation: the sum of all balances equals `total_supply`, and only
//! [`TokenLedger::mint`] changes it.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use isopep_core::{Amount, PartyId};

/// Token ledger failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FundingError {
    #[error("{owner} holds {available}, needs {required}")]
    InsufficientBalance {
        owner: String,
        required: Amount,
        available: Amount,
    },

    #[error("{owner} has authorized {spender} for {available}, needs {required}")]
    InsufficientAllowance {
        owner: String,
        spender: String,
        required: Amount,
        available: Amount,
    },

    #[error("token supply would overflow")]
    Overflow,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenLedger {
    balances: BTreeMap<PartyId, Amount>,
    /// owner -> spender -> remaining allowance
    allowances: BTreeMap<PartyId, BTreeMap<PartyId, Amount>>,
    total_supply: Amount,
}

impl TokenLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn balance_of(&self, owner: &PartyId) -> Amount {
        self.balances.get(owner).copied().unwrap_or_default()
    }

    pub fn allowance(&self, owner: &PartyId, spender: &PartyId) -> Amount {
        self.allowances
            .get(owner)
            .and_then(|m| m.get(spender))
            .copied()
            .unwrap_or_default()
    }

    pub fn total_supply(&self) -> Amount {
        self.total_supply
    }

    /// Create new tokens for `to`.
    pub fn mint(&mut self, to: &PartyId, amount: Amount) -> Result<Amount, FundingError> {
        let supply = self.total_supply.checked_add(amount).ok_or(FundingError::Overflow)?;
        let balance = self.balance_of(to).checked_add(amount).ok_or(FundingError::Overflow)?;
        self.total_supply = supply;
        self.balances.insert(to.clone(), balance);
        Ok(balance)
    }

    /// Set the amount `spender` may pull from `owner`. Replaces any prior value.
    pub fn approve(&mut self, owner: &PartyId, spender: &PartyId, amount: Amount) {
        self.allowances
            .entry(owner.clone())
            .or_default()
            .insert(spender.clone(), amount);
    }

    /// Move `amount` from `from` to `to`.
    pub fn transfer(&mut self, from: &PartyId, to: &PartyId, amount: Amount) -> Result<(), FundingError> {
        let available = self.balance_of(from);
        let debited = available
            .checked_sub(amount)
            .ok_or_else(|| FundingError::InsufficientBalance {
                owner: from.to_string(),
                required: amount,
                available,
            })?;
        if from == to {
            return Ok(());
        }
        let credited = self
            .balance_of(to)
            .checked_add(amount)
            .ok_or(FundingError::Overflow)?;
        self.balances.insert(from.clone(), debited);
        self.balances.insert(to.clone(), credited);
        Ok(())
    }

    /// Check that `spender` could pull `amount` from `owner` without changing anything.
    pub fn check_transfer_from(
        &self,
        spender: &PartyId,
        owner: &PartyId,
        amount: Amount,
    ) -> Result<(), FundingError> {
        let allowed = self.allowance(owner, spender);
        if allowed < amount {
            return Err(FundingError::InsufficientAllowance {
                owner: owner.to_string(),
                spender: spender.to_string(),
                required: amount,
                available: allowed,
            });
        }
        let available = self.balance_of(owner);
        if available < amount {
            return Err(FundingError::InsufficientBalance {
                owner: owner.to_string(),
                required: amount,
                available,
            });
        }
        Ok(())
    }

    /// Pull `amount` from `owner` to `to`, consuming `spender`'s allowance.
    pub fn transfer_from(
        &mut self,
        spender: &PartyId,
        owner: &PartyId,
        to: &PartyId,
        amount: Amount,
    ) -> Result<(), FundingError> {
        self.check_transfer_from(spender, owner, amount)?;
        self.transfer(owner, to, amount)?;
        let remaining = self
            .allowance(owner, spender)
            .checked_sub(amount)
            .unwrap_or_default();
        self.approve(owner, spender, remaining);
        Ok(())
    }

    /// Sum of all balances. Equals `total_supply` whenever the ledger is consistent.
    pub fn circulating(&self) -> Option<Amount> {
        self.balances
            .values()
            .try_fold(Amount::ZERO, |acc, b| acc.checked_add(*b))
    }
}
