//! Agreement storage with the one-active-agreement rule.
//!
//! Agreements are addressed by [`AgreementId`]. At most one is non-terminal
//! at any time; finalized agreements stay readable forever.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use isopep_core::AgreementId;

use crate::agreement::Agreement;
use crate::error::AgreementError;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Repository {
    agreements: BTreeMap<AgreementId, Agreement>,
    /// Most recently created agreement.
    current: Option<AgreementId>,
}

impl Repository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: AgreementId) -> Option<&Agreement> {
        self.agreements.get(&id)
    }

    pub fn require(&self, id: AgreementId) -> Result<&Agreement, AgreementError> {
        self.get(id).ok_or_else(|| AgreementError::NotFound {
            agreement_id: id.to_string(),
        })
    }

    /// The most recently created agreement, terminal or not.
    pub fn current(&self) -> Option<&Agreement> {
        self.current.and_then(|id| self.agreements.get(&id))
    }

    /// The non-terminal agreement, if there is one.
    pub fn active(&self) -> Option<&Agreement> {
        self.current().filter(|a| !a.state().is_terminal())
    }

    /// Fail with `AlreadyActive` when a non-terminal agreement exists.
    pub fn ensure_none_active(&self) -> Result<(), AgreementError> {
        match self.active() {
            Some(a) => Err(AgreementError::AlreadyActive {
                agreement_id: a.id().to_string(),
                state: a.state(),
            }),
            None => Ok(()),
        }
    }

    /// Insert or replace. A previously unseen agreement becomes current.
    pub fn install(&mut self, agreement: Agreement) {
        let id = agreement.id();
        if !self.agreements.contains_key(&id) {
            self.current = Some(id);
        }
        self.agreements.insert(id, agreement);
    }

    pub fn iter(&self) -> impl Iterator<Item = &Agreement> {
        self.agreements.values()
    }

    pub fn len(&self) -> usize {
        self.agreements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agreements.is_empty()
    }
}
