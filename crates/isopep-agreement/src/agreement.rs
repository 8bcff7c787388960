//! # Agreement Aggregate
//!
//! One supply agreement: its terms, role table, lifecycle state, escrow,
//! supplier registry and proof registry. Each operation validates every
//! precondition before touching anything, so a rejected call leaves the
//! aggregate as it was. Token movements are applied to the caller-supplied
//! [`TokenLedger`]; the engine runs operations against clones of both and
//! installs them only after the commit record is durable.
//!
//! ## Check order
//!
//! Role first, then the guard specific to the operation:
//!
//! | Operation              | Checks                                              |
//! |------------------------|-----------------------------------------------------|
//! | `accept`               | non-buyer, non-terminal                             |
//! | `confirm_payment`      | buyer, amount, Negotiation/Pending, allowance, balance |
//! | `start`                | buyer, deadline, Negotiation                        |
//! | `dispatch`             | accepted, Pending                                   |
//! | `update_delivery`      | oracle, Dispatched                                  |
//! | `resolve_dispute`      | arbitrator, Disputed, decision token                |
//! | `rate_supplier`        | buyer, score range, target accepted                 |
//! | `submit_proof`         | accepted                                            |

use serde::{Deserialize, Serialize};

use isopep_core::{AgreementId, Amount, ContentDigest, PartyId, Timestamp};

use crate::dispute;
use crate::error::AgreementError;
use crate::escrow::{EscrowLedger, EscrowTransaction, Settlement, SettlementKind};
use crate::event::EventDetail;
use crate::funding::{FundingError, TokenLedger};
use crate::proof::{ProofRecord, ProofRegistry};
use crate::roles::{self, Role, RoleTable};
use crate::state::{AgreementState, TransitionRecord};
use crate::supplier::SupplierRegistry;

/// Upper bound on the document reference length.
pub const MAX_DOCUMENT_REF_LEN: usize = 256;

// ─── Terms ───────────────────────────────────────────────────────────

/// Commercial terms fixed at creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Terms {
    pub quantity: u64,
    pub unit_price: Amount,
    pub deadline: Timestamp,
    /// Content hash of the off-chain agreement document.
    pub document_ref: String,
}

impl Terms {
    /// Validate and build terms. A deadline in the past is accepted;
    /// `startAgreement` will reject it later.
    pub fn new(
        quantity: u64,
        unit_price: Amount,
        deadline: Timestamp,
        document_ref: impl Into<String>,
    ) -> Result<Self, AgreementError> {
        let document_ref = document_ref.into();
        if quantity == 0 {
            return Err(AgreementError::invalid_argument("quantity must be positive"));
        }
        if unit_price.is_zero() {
            return Err(AgreementError::invalid_argument("unit price must be positive"));
        }
        if unit_price.checked_mul(quantity).is_none() {
            return Err(AgreementError::invalid_argument(
                "quantity * unit price overflows",
            ));
        }
        if document_ref.is_empty() || document_ref.len() > MAX_DOCUMENT_REF_LEN {
            return Err(AgreementError::invalid_argument(format!(
                "document reference must be 1..={MAX_DOCUMENT_REF_LEN} bytes"
            )));
        }
        Ok(Self {
            quantity,
            unit_price,
            deadline,
            document_ref,
        })
    }

    /// `quantity * unit_price`. Validated not to overflow at construction.
    pub fn total(&self) -> Amount {
        self.unit_price.checked_mul(self.quantity).unwrap_or(Amount::new(u128::MAX))
    }
}

// ─── Aggregate ───────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Agreement {
    id: AgreementId,
    terms: Terms,
    roles: RoleTable,
    state: AgreementState,
    escrow: EscrowLedger,
    suppliers: SupplierRegistry,
    proofs: ProofRegistry,
    /// The accepted supplier that moved the agreement to Dispatched.
    dispatched_by: Option<PartyId>,
    transitions: Vec<TransitionRecord>,
    created_at: Timestamp,
    updated_at: Timestamp,
}

impl Agreement {
    /// `createAgreement`. The caller must be the buyer named in `roles`.
    pub fn create(
        id: AgreementId,
        roles: RoleTable,
        caller: &PartyId,
        terms: Terms,
        now: Timestamp,
    ) -> Result<(Self, EventDetail), AgreementError> {
        if !roles::is_buyer(&roles, caller) {
            return Err(unauthorized("createAgreement", caller, Role::Buyer));
        }
        let event = EventDetail::AgreementCreated {
            buyer: caller.clone(),
            quantity: terms.quantity,
            unit_price: terms.unit_price,
            deadline: terms.deadline,
            document_ref: terms.document_ref.clone(),
        };
        let agreement = Self {
            id,
            terms,
            roles,
            state: AgreementState::Negotiation,
            escrow: EscrowLedger::new(),
            suppliers: SupplierRegistry::new(),
            proofs: ProofRegistry::new(),
            dispatched_by: None,
            transitions: Vec::new(),
            created_at: now,
            updated_at: now,
        };
        Ok((agreement, event))
    }

    pub fn id(&self) -> AgreementId {
        self.id
    }

    pub fn terms(&self) -> &Terms {
        &self.terms
    }

    pub fn roles(&self) -> &RoleTable {
        &self.roles
    }

    pub fn state(&self) -> AgreementState {
        self.state
    }

    pub fn escrow(&self) -> &EscrowLedger {
        &self.escrow
    }

    pub fn suppliers(&self) -> &SupplierRegistry {
        &self.suppliers
    }

    pub fn proofs(&self) -> &ProofRegistry {
        &self.proofs
    }

    pub fn dispatched_by(&self) -> Option<&PartyId> {
        self.dispatched_by.as_ref()
    }

    pub fn transitions(&self) -> &[TransitionRecord] {
        &self.transitions
    }

    /// The token account holding this agreement's escrowed funds.
    pub fn escrow_account(&self) -> PartyId {
        PartyId::escrow_account(&self.id)
    }

    // ── Operations ──

    /// `acceptAgreement`. Returns `false` when the caller had already accepted.
    pub fn accept(&mut self, caller: &PartyId, now: Timestamp) -> Result<bool, AgreementError> {
        if !roles::may_accept(&self.roles, caller) {
            return Err(unauthorized("acceptAgreement", caller, Role::Supplier));
        }
        if self.state.is_terminal() {
            return Err(self.invalid_state("acceptAgreement", "a non-terminal state"));
        }
        let newly = self.suppliers.accept(caller);
        if newly {
            self.updated_at = now;
        }
        Ok(newly)
    }

    /// `confirmPayment`. Pulls `amount` from the buyer into escrow using
    /// the allowance the buyer granted the escrow account.
    pub fn confirm_payment(
        &mut self,
        caller: &PartyId,
        amount: Amount,
        tokens: &mut TokenLedger,
        now: Timestamp,
    ) -> Result<EventDetail, AgreementError> {
        if !roles::is_buyer(&self.roles, caller) {
            return Err(unauthorized("confirmPayment", caller, Role::Buyer));
        }
        let required = self.terms.total();
        if amount < required {
            return Err(AgreementError::InsufficientFunds {
                reason: "amount below quantity * unit price",
                required,
                available: amount,
            });
        }
        if !matches!(
            self.state,
            AgreementState::Negotiation | AgreementState::Pending
        ) {
            return Err(self.invalid_state("confirmPayment", "NEGOTIATION or PENDING"));
        }
        let escrow_account = self.escrow_account();
        tokens
            .check_transfer_from(&escrow_account, caller, amount)
            .map_err(funding_shortfall)?;

        tokens
            .transfer_from(&escrow_account, caller, &escrow_account, amount)
            .map_err(funding_shortfall)?;
        let escrow_balance = self.escrow.credit(amount, now)?;
        self.updated_at = now;
        Ok(EventDetail::PaymentConfirmed {
            buyer: caller.clone(),
            amount,
            escrow_balance,
        })
    }

    /// `startAgreement`. Negotiation → Pending.
    pub fn start(&mut self, caller: &PartyId, now: Timestamp) -> Result<(), AgreementError> {
        if !roles::is_buyer(&self.roles, caller) {
            return Err(unauthorized("startAgreement", caller, Role::Buyer));
        }
        if now > self.terms.deadline {
            return Err(AgreementError::DeadlinePassed {
                deadline: self.terms.deadline,
                now,
            });
        }
        self.require_state(AgreementState::Negotiation, "startAgreement")?;
        self.transition(AgreementState::Pending, "startAgreement", caller, now)
    }

    /// `dispatchOrder`. Pending → Dispatched; the caller becomes the payee.
    pub fn dispatch(&mut self, caller: &PartyId, now: Timestamp) -> Result<EventDetail, AgreementError> {
        self.suppliers.require_accepted(caller)?;
        self.require_state(AgreementState::Pending, "dispatchOrder")?;
        self.transition(AgreementState::Dispatched, "dispatchOrder", caller, now)?;
        self.dispatched_by = Some(caller.clone());
        Ok(EventDetail::OrderDispatched {
            supplier: caller.clone(),
        })
    }

    /// `updateDeliveryStatus`. Dispatched → Completed (escrow released to
    /// the dispatching supplier) or Dispatched → Disputed (escrow held).
    pub fn update_delivery(
        &mut self,
        caller: &PartyId,
        ok: bool,
        tokens: &mut TokenLedger,
        now: Timestamp,
    ) -> Result<EventDetail, AgreementError> {
        if !roles::is_oracle(&self.roles, caller) {
            return Err(unauthorized("updateDeliveryStatus", caller, Role::Oracle));
        }
        self.require_state(AgreementState::Dispatched, "updateDeliveryStatus")?;

        if !ok {
            self.transition(AgreementState::Disputed, "updateDeliveryStatus", caller, now)?;
            return Ok(EventDetail::DeliveryUpdated {
                ok,
                state: self.state,
                payee: None,
                amount: None,
            });
        }

        let payee = self.dispatcher()?;
        let amount = self.settle(SettlementKind::Release, &payee, tokens, now)?;
        self.transition(AgreementState::Completed, "updateDeliveryStatus", caller, now)?;
        Ok(EventDetail::DeliveryUpdated {
            ok,
            state: self.state,
            payee: Some(payee),
            amount: Some(amount),
        })
    }

    /// `resolveDispute`. Disputed → Cancelled (refund) or Completed (release).
    pub fn resolve_dispute(
        &mut self,
        caller: &PartyId,
        decision: &str,
        tokens: &mut TokenLedger,
        now: Timestamp,
    ) -> Result<EventDetail, AgreementError> {
        if !roles::is_arbitrator(&self.roles, caller) {
            return Err(unauthorized("resolveDispute", caller, Role::Arbitrator));
        }
        self.require_state(AgreementState::Disputed, "resolveDispute")?;
        let ruling = dispute::rule(decision, &self.roles, self.dispatched_by.as_ref())?;

        let amount = self.settle(ruling.kind, &ruling.payee, tokens, now)?;
        self.transition(ruling.next_state, "resolveDispute", caller, now)?;
        Ok(EventDetail::DisputeResolved {
            decision: ruling.resolution,
            state: self.state,
            payee: ruling.payee,
            amount,
        })
    }

    /// `rateSupplier`. Allowed in any state, including after finalization.
    pub fn rate_supplier(
        &mut self,
        caller: &PartyId,
        supplier: &PartyId,
        score: u32,
        now: Timestamp,
    ) -> Result<EventDetail, AgreementError> {
        if !roles::is_buyer(&self.roles, caller) {
            return Err(unauthorized("rateSupplier", caller, Role::Buyer));
        }
        self.suppliers.rate(supplier, score)?;
        let score = self
            .suppliers
            .get(supplier)
            .map(|s| s.rating)
            .ok_or_else(|| AgreementError::NotAccepted {
                identity: supplier.to_string(),
            })?;
        self.updated_at = now;
        Ok(EventDetail::SupplierRated {
            supplier: supplier.clone(),
            score,
        })
    }

    /// `submitZKProof`. Records the blob verbatim; validity is not checked here.
    pub fn submit_proof(
        &mut self,
        caller: &PartyId,
        blob: Vec<u8>,
        now: Timestamp,
    ) -> Result<EventDetail, AgreementError> {
        self.suppliers.require_accepted(caller)?;
        let digest = self.proofs.record(caller, blob, now).digest;
        self.updated_at = now;
        Ok(EventDetail::ZkProofSubmitted {
            supplier: caller.clone(),
            digest,
        })
    }

    /// Cross-check the aggregate against the token ledger.
    ///
    /// - a terminal agreement holds zero escrow
    /// - the escrow account's token balance equals the escrow ledger balance
    /// - escrow never exceeds cumulative credits
    pub fn check_invariants(&self, tokens: &TokenLedger) -> Result<(), AgreementError> {
        let balance = self.escrow.balance();
        if self.state.is_terminal() && !balance.is_zero() {
            return Err(AgreementError::EscrowIntegrity {
                reason: format!("terminal state {} still holds {balance}", self.state),
            });
        }
        if balance > self.escrow.total_credited() {
            return Err(AgreementError::EscrowIntegrity {
                reason: format!(
                    "balance {balance} exceeds total credited {}",
                    self.escrow.total_credited()
                ),
            });
        }
        let held = tokens.balance_of(&self.escrow_account());
        if held != balance {
            return Err(AgreementError::EscrowIntegrity {
                reason: format!("escrow account holds {held} but ledger records {balance}"),
            });
        }
        Ok(())
    }

    // ── Internals ──

    fn dispatcher(&self) -> Result<PartyId, AgreementError> {
        self.dispatched_by
            .clone()
            .ok_or_else(|| AgreementError::EscrowIntegrity {
                reason: "dispatched agreement has no dispatching supplier".into(),
            })
    }

    /// Drain escrow to `payee`, moving the tokens in the same step.
    fn settle(
        &mut self,
        kind: SettlementKind,
        payee: &PartyId,
        tokens: &mut TokenLedger,
        now: Timestamp,
    ) -> Result<Amount, AgreementError> {
        let amount = match kind {
            SettlementKind::Release => self.escrow.release_to(payee, now)?,
            SettlementKind::Refund => self.escrow.refund_to(payee, now)?,
        };
        tokens
            .transfer(&self.escrow_account(), payee, amount)
            .map_err(|e| AgreementError::EscrowIntegrity {
                reason: format!("escrow payout failed: {e}"),
            })?;
        Ok(amount)
    }

    fn require_state(
        &self,
        expected: AgreementState,
        operation: &'static str,
    ) -> Result<(), AgreementError> {
        if self.state != expected {
            return Err(self.invalid_state(operation, expected.as_str()));
        }
        Ok(())
    }

    fn invalid_state(&self, operation: &'static str, expected: &str) -> AgreementError {
        AgreementError::InvalidState {
            operation,
            current: self.state,
            expected: expected.to_string(),
        }
    }

    fn transition(
        &mut self,
        to: AgreementState,
        operation: &str,
        caller: &PartyId,
        now: Timestamp,
    ) -> Result<(), AgreementError> {
        if !self.state.can_transition_to(to) {
            return Err(AgreementError::InvalidState {
                operation: "transition",
                current: self.state,
                expected: format!("a predecessor of {to}"),
            });
        }
        self.transitions.push(TransitionRecord {
            from: self.state,
            to,
            operation: operation.to_string(),
            caller: caller.clone(),
            at: now,
        });
        self.state = to;
        self.updated_at = now;
        Ok(())
    }

    // ── Read model ──

    pub fn view(&self) -> AgreementView {
        AgreementView {
            id: self.id,
            quantity: self.terms.quantity,
            unit_price: self.terms.unit_price,
            total_price: self.terms.total(),
            deadline: self.terms.deadline,
            document_ref: self.terms.document_ref.clone(),
            state: self.state,
            state_code: self.state.code(),
            escrow_amount: self.escrow.balance(),
            total_deposited: self.escrow.total_credited(),
            settlement: self.escrow.settlement().cloned(),
            buyer: self.roles.buyer().clone(),
            oracle: self.roles.oracle().clone(),
            arbitrator: self.roles.arbitrator().clone(),
            dispatched_by: self.dispatched_by.clone(),
            accepted_suppliers: self
                .suppliers
                .iter()
                .filter(|(_, s)| s.accepted)
                .map(|(id, _)| id.clone())
                .collect(),
            transitions: self.transitions.clone(),
            escrow_transactions: self.escrow.transactions().to_vec(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }

    /// Acceptance, rating and latest proof for one identity.
    pub fn supplier_view(&self, identity: &PartyId) -> SupplierView {
        let info = self.suppliers.get(identity);
        SupplierView {
            identity: identity.clone(),
            accepted: info.is_some_and(|s| s.accepted),
            rating: info.map_or(0, |s| s.rating),
            proof: self.proofs.get(identity).map(ProofSummary::from),
        }
    }
}

/// Snapshot of an agreement for readers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgreementView {
    pub id: AgreementId,
    pub quantity: u64,
    pub unit_price: Amount,
    pub total_price: Amount,
    pub deadline: Timestamp,
    pub document_ref: String,
    pub state: AgreementState,
    pub state_code: u8,
    pub escrow_amount: Amount,
    pub total_deposited: Amount,
    pub settlement: Option<Settlement>,
    pub buyer: PartyId,
    pub oracle: PartyId,
    pub arbitrator: PartyId,
    pub dispatched_by: Option<PartyId>,
    pub accepted_suppliers: Vec<PartyId>,
    pub transitions: Vec<TransitionRecord>,
    pub escrow_transactions: Vec<EscrowTransaction>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupplierView {
    pub identity: PartyId,
    pub accepted: bool,
    /// 0 when never rated.
    pub rating: u8,
    pub proof: Option<ProofSummary>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofSummary {
    pub digest: ContentDigest,
    pub size: usize,
    pub revision: u32,
    pub submitted_at: Timestamp,
}

impl From<&ProofRecord> for ProofSummary {
    fn from(p: &ProofRecord) -> Self {
        Self {
            digest: p.digest,
            size: p.blob.len(),
            revision: p.revision,
            submitted_at: p.submitted_at,
        }
    }
}

fn unauthorized(operation: &'static str, caller: &PartyId, required: Role) -> AgreementError {
    AgreementError::Unauthorized {
        operation,
        caller: caller.to_string(),
        required,
    }
}

fn funding_shortfall(err: FundingError) -> AgreementError {
    match err {
        FundingError::InsufficientAllowance {
            required,
            available,
            ..
        } => AgreementError::InsufficientFunds {
            reason: "allowance to escrow below amount",
            required,
            available,
        },
        FundingError::InsufficientBalance {
            required,
            available,
            ..
        } => AgreementError::InsufficientFunds {
            reason: "buyer balance below amount",
            required,
            available,
        },
        FundingError::Overflow => AgreementError::EscrowIntegrity {
            reason: "escrow account balance would overflow".into(),
        },
    }
}

// ─── Tests ───────────────────────────────────────────────────────────
