//! # Supplier Registry and Ratings
//!
//! Per-identity acceptance flags and ratings. An entry is created lazily
//! the first time an identity accepts. Several suppliers may be accepted
//! at once; only the one that dispatches is paid.
//!
//! A rating overwrites the previous one. There is no averaging.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use isopep_core::PartyId;

use crate::error::AgreementError;

pub const MIN_RATING: u32 = 1;
pub const MAX_RATING: u32 = 5;

/// Acceptance and rating for one supplier identity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupplierInfo {
    pub accepted: bool,
    /// 0 when never rated, otherwise 1..=5.
    pub rating: u8,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupplierRegistry {
    suppliers: BTreeMap<PartyId, SupplierInfo>,
}

impl SupplierRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark `identity` as accepted. Returns `false` if it already was.
    pub fn accept(&mut self, identity: &PartyId) -> bool {
        let info = self.suppliers.entry(identity.clone()).or_default();
        let newly = !info.accepted;
        info.accepted = true;
        newly
    }

    pub fn is_accepted(&self, identity: &PartyId) -> bool {
        self.suppliers.get(identity).is_some_and(|s| s.accepted)
    }

    pub fn get(&self, identity: &PartyId) -> Option<&SupplierInfo> {
        self.suppliers.get(identity)
    }

    /// Require that `identity` has accepted.
    pub fn require_accepted(&self, identity: &PartyId) -> Result<(), AgreementError> {
        if self.is_accepted(identity) {
            Ok(())
        } else {
            Err(AgreementError::NotAccepted {
                identity: identity.to_string(),
            })
        }
    }

    /// Store `score` for an accepted supplier. Returns the previous rating.
    pub fn rate(&mut self, identity: &PartyId, score: u32) -> Result<u8, AgreementError> {
        let score = validate_rating(score)?;
        self.require_accepted(identity)?;
        let info = self
            .suppliers
            .get_mut(identity)
            .ok_or_else(|| AgreementError::NotAccepted {
                identity: identity.to_string(),
            })?;
        let previous = info.rating;
        info.rating = score;
        Ok(previous)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&PartyId, &SupplierInfo)> {
        self.suppliers.iter()
    }

    pub fn accepted_count(&self) -> usize {
        self.suppliers.values().filter(|s| s.accepted).count()
    }
}

/// Check that a score lies in `1..=5`.
pub fn validate_rating(score: u32) -> Result<u8, AgreementError> {
    if (MIN_RATING..=MAX_RATING).contains(&score) {
        u8::try_from(score).map_err(|_| AgreementError::InvalidRating { score })
    } else {
        Err(AgreementError::InvalidRating { score })
    }
}
