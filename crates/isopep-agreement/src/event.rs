//! # Notification Events and Outbox
//!
//! Every successful notifying operation appends exactly one
//! [`AgreementEvent`] to the [`EventLog`] in the same commit as the state
//! change. The log is the durable outbox: external consumers (ERP relay,
//! proof verifier, audit views) read from a cursor and acknowledge what
//! they have processed. Anything not acknowledged is handed out again, so
//! delivery is at-least-once and consumers must tolerate duplicates.
//!
//! Sequence numbers start at 1, are contiguous, and never reused.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use isopep_core::{
    sha256_digest, AgreementId, Amount, CanonicalBytes, CanonicalizationError, ContentDigest,
    PartyId, Timestamp,
};

use crate::dispute::Resolution;
use crate::error::AgreementError;
use crate::state::AgreementState;

/// Event discriminant, for filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    AgreementCreated,
    PaymentConfirmed,
    OrderDispatched,
    DeliveryUpdated,
    DisputeResolved,
    SupplierRated,
    #[serde(rename = "ZKProofSubmitted")]
    ZkProofSubmitted,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AgreementCreated => "AgreementCreated",
            Self::PaymentConfirmed => "PaymentConfirmed",
            Self::OrderDispatched => "OrderDispatched",
            Self::DeliveryUpdated => "DeliveryUpdated",
            Self::DisputeResolved => "DisputeResolved",
            Self::SupplierRated => "SupplierRated",
            Self::ZkProofSubmitted => "ZKProofSubmitted",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        [
            Self::AgreementCreated,
            Self::PaymentConfirmed,
            Self::OrderDispatched,
            Self::DeliveryUpdated,
            Self::DisputeResolved,
            Self::SupplierRated,
            Self::ZkProofSubmitted,
        ]
        .into_iter()
        .find(|k| k.as_str() == s)
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Event payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum EventDetail {
    AgreementCreated {
        buyer: PartyId,
        quantity: u64,
        unit_price: Amount,
        deadline: Timestamp,
        document_ref: String,
    },
    PaymentConfirmed {
        buyer: PartyId,
        amount: Amount,
        escrow_balance: Amount,
    },
    OrderDispatched {
        supplier: PartyId,
    },
    DeliveryUpdated {
        ok: bool,
        state: AgreementState,
        /// Set when the report released escrow.
        payee: Option<PartyId>,
        amount: Option<Amount>,
    },
    DisputeResolved {
        decision: Resolution,
        state: AgreementState,
        payee: PartyId,
        amount: Amount,
    },
    SupplierRated {
        supplier: PartyId,
        score: u8,
    },
    #[serde(rename = "ZKProofSubmitted")]
    ZkProofSubmitted {
        supplier: PartyId,
        digest: ContentDigest,
    },
}

impl EventDetail {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::AgreementCreated { .. } => EventKind::AgreementCreated,
            Self::PaymentConfirmed { .. } => EventKind::PaymentConfirmed,
            Self::OrderDispatched { .. } => EventKind::OrderDispatched,
            Self::DeliveryUpdated { .. } => EventKind::DeliveryUpdated,
            Self::DisputeResolved { .. } => EventKind::DisputeResolved,
            Self::SupplierRated { .. } => EventKind::SupplierRated,
            Self::ZkProofSubmitted { .. } => EventKind::ZkProofSubmitted,
        }
    }

    /// The terminal state this event moved the agreement into, if any.
    pub fn finalized_state(&self) -> Option<AgreementState> {
        match self {
            Self::DeliveryUpdated { state, .. } | Self::DisputeResolved { state, .. }
                if state.is_terminal() =>
            {
                Some(*state)
            }
            _ => None,
        }
    }
}

/// A committed notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgreementEvent {
    pub seq: u64,
    pub agreement_id: AgreementId,
    pub at: Timestamp,
    pub detail: EventDetail,
}

impl AgreementEvent {
    pub fn kind(&self) -> EventKind {
        self.detail.kind()
    }

    pub fn is_finalization(&self) -> bool {
        self.detail.finalized_state().is_some()
    }

    /// Content digest of the canonical event, usable as a transaction reference.
    pub fn digest(&self) -> Result<ContentDigest, CanonicalizationError> {
        Ok(sha256_digest(&CanonicalBytes::new(self)?))
    }
}

/// Append-only event outbox with per-consumer cursors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventLog {
    events: Vec<AgreementEvent>,
    next_seq: u64,
    /// consumer -> highest acknowledged seq
    cursors: BTreeMap<String, u64>,
}

impl Default for EventLog {
    fn default() -> Self {
        Self {
            events: Vec::new(),
            next_seq: 1,
            cursors: BTreeMap::new(),
        }
    }
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// The sequence number the next appended event will receive.
    pub fn next_seq(&self) -> u64 {
        self.next_seq
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Assign sequence numbers without appending. Used to build a commit
    /// record before the commit is durable.
    pub fn stamp(
        &self,
        agreement_id: AgreementId,
        at: Timestamp,
        details: Vec<EventDetail>,
    ) -> Vec<AgreementEvent> {
        details
            .into_iter()
            .zip(self.next_seq..)
            .map(|(detail, seq)| AgreementEvent {
                seq,
                agreement_id,
                at,
                detail,
            })
            .collect()
    }

    /// Append events stamped by [`EventLog::stamp`] or read back from a journal.
    ///
    /// Events whose seq is already present are skipped, so replaying a
    /// journal twice cannot duplicate the outbox.
    pub fn append(&mut self, events: impl IntoIterator<Item = AgreementEvent>) -> Result<(), AgreementError> {
        for event in events {
            if event.seq < self.next_seq {
                continue;
            }
            if event.seq != self.next_seq {
                return Err(AgreementError::EscrowIntegrity {
                    reason: format!(
                        "event sequence gap: expected {}, got {}",
                        self.next_seq, event.seq
                    ),
                });
            }
            self.next_seq += 1;
            self.events.push(event);
        }
        Ok(())
    }

    pub fn all(&self) -> &[AgreementEvent] {
        &self.events
    }

    /// Events with `seq > after`, oldest first, at most `limit`.
    pub fn since(&self, after: u64, limit: usize) -> &[AgreementEvent] {
        let start = self.events.partition_point(|e| e.seq <= after);
        let end = start.saturating_add(limit).min(self.events.len());
        &self.events[start..end]
    }

    pub fn by_kind(&self, kind: EventKind) -> impl Iterator<Item = &AgreementEvent> {
        self.events.iter().filter(move |e| e.kind() == kind)
    }

    pub fn for_agreement(&self, id: AgreementId) -> impl Iterator<Item = &AgreementEvent> {
        self.events.iter().filter(move |e| e.agreement_id == id)
    }

    pub fn cursor(&self, consumer: &str) -> u64 {
        self.cursors.get(consumer).copied().unwrap_or(0)
    }

    /// Unacknowledged events for `consumer`.
    pub fn pending(&self, consumer: &str, limit: usize) -> &[AgreementEvent] {
        self.since(self.cursor(consumer), limit)
    }

    /// Validate an acknowledgement without applying it.
    pub fn check_ack(&self, seq: u64) -> Result<(), AgreementError> {
        if seq >= self.next_seq {
            return Err(AgreementError::invalid_argument(format!(
                "cannot acknowledge seq {seq}: last event is {}",
                self.next_seq - 1
            )));
        }
        Ok(())
    }

    /// Advance `consumer`'s cursor to `seq`. Cursors never move backwards.
    pub fn ack(&mut self, consumer: &str, seq: u64) -> Result<u64, AgreementError> {
        self.check_ack(seq)?;
        let cursor = self.cursors.entry(consumer.to_string()).or_insert(0);
        if seq > *cursor {
            *cursor = seq;
        }
        Ok(*cursor)
    }
}
