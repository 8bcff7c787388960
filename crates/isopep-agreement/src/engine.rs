//! # Agreement Engine
//!
//! Single-writer front door to the core. All state lives behind one
//! exclusive lock; every mutating call runs start to finish while holding
//! it and never awaits. A call is journaled as an intent, applied to
//! clones, committed to the journal, then installed. A failed
//! precondition or a failed journal write leaves the observable state
//! exactly as it was.

use std::sync::Arc;

use parking_lot::Mutex;

use isopep_core::{AgreementId, Amount, PartyId, Timestamp};

use crate::agreement::{Agreement, AgreementView, SupplierView, Terms};
use crate::clock::{Clock, SystemClock};
use crate::command::Command;
use crate::error::AgreementError;
use crate::event::{AgreementEvent, EventDetail, EventKind, EventLog};
use crate::funding::{FundingError, TokenLedger};
use crate::journal::{replay, Journal, JournalRecord, MemoryJournal, ReplayReport};
use crate::oracle::{MockOracle, OracleError, OracleFeed};
use crate::proof::ProofRecord;
use crate::repository::Repository;
use crate::roles::{self, Deployment, Role};
use crate::state::AgreementState;

/// Result of a committed command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Receipt {
    pub txn: u64,
    pub agreement_id: Option<AgreementId>,
    /// State after the command, for agreement commands.
    pub state: Option<AgreementState>,
    pub events: Vec<AgreementEvent>,
}

struct Inner {
    repository: Repository,
    tokens: TokenLedger,
    events: EventLog,
    journal: Box<dyn Journal>,
    next_txn: u64,
}

/// What a successful `apply` produced, before it is committed.
struct Applied {
    agreement: Option<Agreement>,
    details: Vec<EventDetail>,
}

pub struct AgreementEngine {
    deployment: Deployment,
    clock: Arc<dyn Clock>,
    oracle: Arc<dyn OracleFeed>,
    replay_report: ReplayReport,
    inner: Mutex<Inner>,
}

impl std::fmt::Debug for AgreementEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgreementEngine")
            .field("deployment", &self.deployment)
            .field("replay_report", &self.replay_report)
            .finish_non_exhaustive()
    }
}

impl AgreementEngine {
    /// Engine with an in-memory journal, the system clock, and an empty
    /// mock oracle.
    pub fn new(deployment: Deployment) -> Self {
        Self {
            deployment,
            clock: Arc::new(SystemClock),
            oracle: Arc::new(MockOracle::default()),
            replay_report: ReplayReport::default(),
            inner: Mutex::new(Inner {
                repository: Repository::new(),
                tokens: TokenLedger::new(),
                events: EventLog::new(),
                journal: Box::new(MemoryJournal::new()),
                next_txn: 1,
            }),
        }
    }

    /// Rebuild from `journal` and keep appending to it.
    pub fn open(deployment: Deployment, journal: Box<dyn Journal>) -> Result<Self, AgreementError> {
        let recovered = replay(journal.records()?)?;
        tracing::info!(
            committed = recovered.report.committed,
            aborted = recovered.report.aborted,
            discarded = recovered.report.discarded,
            agreements = recovered.repository.len(),
            events = recovered.events.len(),
            "journal replayed"
        );
        Ok(Self {
            deployment,
            clock: Arc::new(SystemClock),
            oracle: Arc::new(MockOracle::default()),
            replay_report: recovered.report,
            inner: Mutex::new(Inner {
                repository: recovered.repository,
                tokens: recovered.tokens,
                events: recovered.events,
                journal,
                next_txn: recovered.next_txn,
            }),
        })
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_oracle(mut self, oracle: Arc<dyn OracleFeed>) -> Self {
        self.oracle = oracle;
        self
    }

    pub fn deployment(&self) -> &Deployment {
        &self.deployment
    }

    pub fn replay_report(&self) -> ReplayReport {
        self.replay_report
    }

    pub fn now(&self) -> Timestamp {
        self.clock.now()
    }

    // ─── Operations ──────────────────────────────────────────────────

    pub fn create_agreement(
        &self,
        caller: &PartyId,
        quantity: u64,
        unit_price: Amount,
        deadline: Timestamp,
        document_ref: impl Into<String>,
    ) -> Result<Receipt, AgreementError> {
        let command = Command::CreateAgreement {
            quantity,
            unit_price,
            deadline,
            document_ref: document_ref.into(),
        };
        self.execute(caller, Some(AgreementId::new()), command)
    }

    pub fn accept_agreement(&self, id: AgreementId, caller: &PartyId) -> Result<Receipt, AgreementError> {
        self.execute(caller, Some(id), Command::AcceptAgreement)
    }

    pub fn confirm_payment(
        &self,
        id: AgreementId,
        caller: &PartyId,
        amount: Amount,
    ) -> Result<Receipt, AgreementError> {
        self.execute(caller, Some(id), Command::ConfirmPayment { amount })
    }

    pub fn start_agreement(&self, id: AgreementId, caller: &PartyId) -> Result<Receipt, AgreementError> {
        self.execute(caller, Some(id), Command::StartAgreement)
    }

    pub fn dispatch_order(&self, id: AgreementId, caller: &PartyId) -> Result<Receipt, AgreementError> {
        self.execute(caller, Some(id), Command::DispatchOrder)
    }

    pub fn update_delivery_status(
        &self,
        id: AgreementId,
        caller: &PartyId,
        ok: bool,
    ) -> Result<Receipt, AgreementError> {
        self.execute(caller, Some(id), Command::UpdateDeliveryStatus { ok })
    }

    pub fn resolve_dispute(
        &self,
        id: AgreementId,
        caller: &PartyId,
        decision: impl Into<String>,
    ) -> Result<Receipt, AgreementError> {
        let command = Command::ResolveDispute {
            decision: decision.into(),
        };
        self.execute(caller, Some(id), command)
    }

    pub fn rate_supplier(
        &self,
        id: AgreementId,
        caller: &PartyId,
        supplier: &PartyId,
        score: u32,
    ) -> Result<Receipt, AgreementError> {
        let command = Command::RateSupplier {
            supplier: supplier.clone(),
            score,
        };
        self.execute(caller, Some(id), command)
    }

    pub fn submit_zk_proof(
        &self,
        id: AgreementId,
        caller: &PartyId,
        blob: Vec<u8>,
    ) -> Result<Receipt, AgreementError> {
        self.execute(caller, Some(id), Command::SubmitProof { blob })
    }

    /// Issue funding-source tokens. Buyer only.
    pub fn mint(&self, caller: &PartyId, to: &PartyId, amount: Amount) -> Result<Receipt, AgreementError> {
        let command = Command::Mint {
            to: to.clone(),
            amount,
        };
        self.execute(caller, None, command)
    }

    /// Authorize `spender` to pull up to `amount` of the caller's tokens.
    pub fn approve(
        &self,
        caller: &PartyId,
        spender: &PartyId,
        amount: Amount,
    ) -> Result<Receipt, AgreementError> {
        let command = Command::Approve {
            spender: spender.clone(),
            amount,
        };
        self.execute(caller, None, command)
    }

    /// `getOracleData`.
    pub fn oracle_data(&self) -> Result<i128, OracleError> {
        self.oracle.latest_value()
    }

    // ─── Queries ─────────────────────────────────────────────────────

    pub fn agreement(&self, id: AgreementId) -> Result<AgreementView, AgreementError> {
        Ok(self.inner.lock().repository.require(id)?.view())
    }

    /// The most recently created agreement.
    pub fn current(&self) -> Option<AgreementView> {
        self.inner.lock().repository.current().map(Agreement::view)
    }

    pub fn agreements(&self) -> Vec<AgreementView> {
        self.inner.lock().repository.iter().map(Agreement::view).collect()
    }

    pub fn supplier(&self, id: AgreementId, identity: &PartyId) -> Result<SupplierView, AgreementError> {
        Ok(self.inner.lock().repository.require(id)?.supplier_view(identity))
    }

    pub fn proof(&self, id: AgreementId, supplier: &PartyId) -> Result<Option<ProofRecord>, AgreementError> {
        Ok(self
            .inner
            .lock()
            .repository
            .require(id)?
            .proofs()
            .get(supplier)
            .cloned())
    }

    pub fn balance_of(&self, owner: &PartyId) -> Amount {
        self.inner.lock().tokens.balance_of(owner)
    }

    pub fn allowance(&self, owner: &PartyId, spender: &PartyId) -> Amount {
        self.inner.lock().tokens.allowance(owner, spender)
    }

    pub fn total_supply(&self) -> Amount {
        self.inner.lock().tokens.total_supply()
    }

    /// Events with `seq > after`, optionally of one kind.
    pub fn events(&self, after: u64, kind: Option<EventKind>, limit: usize) -> Vec<AgreementEvent> {
        let inner = self.inner.lock();
        let page = inner.events.since(after, usize::MAX);
        page.iter()
            .filter(|e| kind.map_or(true, |k| e.kind() == k))
            .take(limit)
            .cloned()
            .collect()
    }

    /// Events not yet acknowledged by `consumer`.
    pub fn pending_events(&self, consumer: &str, limit: usize) -> Vec<AgreementEvent> {
        self.inner.lock().events.pending(consumer, limit).to_vec()
    }

    /// Record that `consumer` has processed every event up to `seq`.
    pub fn ack(&self, consumer: &str, seq: u64) -> Result<u64, AgreementError> {
        let mut inner = self.inner.lock();
        if seq <= inner.events.cursor(consumer) {
            return Ok(inner.events.cursor(consumer));
        }
        inner.events.check_ack(seq)?;
        inner.journal.append(&JournalRecord::Ack {
            consumer: consumer.to_string(),
            seq,
        })?;
        inner.events.ack(consumer, seq)
    }

    // ─── Execution ───────────────────────────────────────────────────

    fn execute(
        &self,
        caller: &PartyId,
        target: Option<AgreementId>,
        command: Command,
    ) -> Result<Receipt, AgreementError> {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        let now = self.clock.now();
        let operation = command.name();
        let txn = inner.next_txn;

        inner.journal.append(&JournalRecord::Intent {
            txn,
            agreement_id: target,
            caller: caller.clone(),
            command: command.clone(),
            at: now,
        })?;
        inner.next_txn += 1;

        let mut tokens = inner.tokens.clone();
        let before = target
            .and_then(|id| inner.repository.get(id))
            .map(Agreement::state);

        let applied = self
            .apply(&inner.repository, &mut tokens, caller, target, &command, now)
            .and_then(|applied| {
                if let Some(agreement) = &applied.agreement {
                    agreement.check_invariants(&tokens)?;
                }
                Ok(applied)
            });

        let applied = match applied {
            Ok(applied) => applied,
            Err(err) => {
                tracing::debug!(
                    txn,
                    operation,
                    caller = %caller,
                    kind = err.kind(),
                    error = %err,
                    "operation rejected"
                );
                if let Err(journal_err) = inner.journal.append(&JournalRecord::Abort {
                    txn,
                    kind: err.kind().to_string(),
                }) {
                    tracing::warn!(txn, error = %journal_err, "failed to journal abort");
                }
                return Err(err);
            }
        };

        let agreement_id = applied.agreement.as_ref().map(Agreement::id);
        let after = applied.agreement.as_ref().map(Agreement::state);
        let events = match agreement_id {
            Some(id) => inner.events.stamp(id, now, applied.details),
            None => Vec::new(),
        };

        inner.journal.append(&JournalRecord::Commit {
            txn,
            agreement: applied.agreement.clone().map(Box::new),
            tokens: tokens.clone(),
            events: events.clone(),
        })?;

        if let Some(agreement) = applied.agreement {
            inner.repository.install(agreement);
        }
        inner.tokens = tokens;
        inner.events.append(events.clone())?;

        match (before, after) {
            (Some(from), Some(to)) if from != to => tracing::info!(
                txn,
                agreement_id = ?agreement_id,
                caller = %caller,
                operation,
                from = %from,
                to = %to,
                "agreement transitioned"
            ),
            _ => tracing::info!(
                txn,
                agreement_id = ?agreement_id,
                caller = %caller,
                operation,
                events = events.len(),
                "operation committed"
            ),
        }

        Ok(Receipt {
            txn,
            agreement_id,
            state: after,
            events,
        })
    }

    fn apply(
        &self,
        repository: &Repository,
        tokens: &mut TokenLedger,
        caller: &PartyId,
        target: Option<AgreementId>,
        command: &Command,
        now: Timestamp,
    ) -> Result<Applied, AgreementError> {
        match command {
            Command::CreateAgreement {
                quantity,
                unit_price,
                deadline,
                document_ref,
            } => {
                let table = self.deployment.role_table();
                if !roles::is_buyer(&table, caller) {
                    return Err(AgreementError::Unauthorized {
                        operation: "createAgreement",
                        caller: caller.to_string(),
                        required: Role::Buyer,
                    });
                }
                repository.ensure_none_active()?;
                let terms = Terms::new(*quantity, *unit_price, *deadline, document_ref.clone())?;
                let id = target.unwrap_or_default();
                let (agreement, created) = Agreement::create(id, table, caller, terms, now)?;
                Ok(Applied {
                    agreement: Some(agreement),
                    details: vec![created],
                })
            }
            Command::Mint { to, amount } => {
                if !roles::is_buyer(&self.deployment.role_table(), caller) {
                    return Err(AgreementError::Unauthorized {
                        operation: "mint",
                        caller: caller.to_string(),
                        required: Role::Buyer,
                    });
                }
                if to.is_escrow_account() {
                    return Err(AgreementError::invalid_argument(
                        "cannot mint into an escrow account",
                    ));
                }
                if amount.is_zero() {
                    return Err(AgreementError::invalid_argument("mint amount must be positive"));
                }
                tokens.mint(to, *amount).map_err(|e| match e {
                    FundingError::Overflow => AgreementError::invalid_argument("token supply would overflow"),
                    other => AgreementError::invalid_argument(other.to_string()),
                })?;
                Ok(Applied {
                    agreement: None,
                    details: Vec::new(),
                })
            }
            Command::Approve { spender, amount } => {
                tokens.approve(caller, spender, *amount);
                Ok(Applied {
                    agreement: None,
                    details: Vec::new(),
                })
            }
            _ => {
                let id = target.ok_or_else(|| AgreementError::NotFound {
                    agreement_id: "(none)".into(),
                })?;
                let mut agreement = repository.require(id)?.clone();
                let detail = apply_to_agreement(&mut agreement, tokens, caller, command, now)?;
                Ok(Applied {
                    agreement: Some(agreement),
                    details: detail.into_iter().collect(),
                })
            }
        }
    }
}

fn apply_to_agreement(
    agreement: &mut Agreement,
    tokens: &mut TokenLedger,
    caller: &PartyId,
    command: &Command,
    now: Timestamp,
) -> Result<Option<EventDetail>, AgreementError> {
    let detail = match command {
        Command::AcceptAgreement => {
            agreement.accept(caller, now)?;
            None
        }
        Command::ConfirmPayment { amount } => {
            Some(agreement.confirm_payment(caller, *amount, tokens, now)?)
        }
        Command::StartAgreement => {
            agreement.start(caller, now)?;
            None
        }
        Command::DispatchOrder => Some(agreement.dispatch(caller, now)?),
        Command::UpdateDeliveryStatus { ok } => {
            Some(agreement.update_delivery(caller, *ok, tokens, now)?)
        }
        Command::ResolveDispute { decision } => {
            Some(agreement.resolve_dispute(caller, decision, tokens, now)?)
        }
        Command::RateSupplier { supplier, score } => {
            Some(agreement.rate_supplier(caller, supplier, *score, now)?)
        }
        Command::SubmitProof { blob } => Some(agreement.submit_proof(caller, blob.clone(), now)?),
        Command::CreateAgreement { .. } | Command::Mint { .. } | Command::Approve { .. } => {
            return Err(AgreementError::invalid_argument(format!(
                "{} does not target an existing agreement",
                command.name()
            )))
        }
    };
    Ok(detail)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn party(s: &str) -> PartyId {
        PartyId::new(s).unwrap()
    }

    fn deployment() -> Deployment {
        Deployment {
            buyer: party("buyer"),
            oracle: party("oracle"),
            arbitrator: party("arbitrator"),
        }
    }

    fn start() -> Timestamp {
        Timestamp::from_epoch_secs(1_767_225_600).unwrap()
    }

    fn engine_with(journal: MemoryJournal) -> (AgreementEngine, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(start()));
        let engine = AgreementEngine::open(deployment(), Box::new(journal))
            .unwrap()
            .with_clock(clock.clone())
            .with_oracle(Arc::new(MockOracle::with_answer(900)));
        (engine, clock)
    }

    fn created(engine: &AgreementEngine) -> AgreementId {
        let buyer = party("buyer");
        engine.mint(&buyer, &buyer, Amount::from(10_000)).unwrap();
        let r = engine
            .create_agreement(&buyer, 100, Amount::from(2), start().plus_secs(3_600).unwrap(), "Qm1")
            .unwrap();
        let id = r.agreement_id.unwrap();
        engine
            .approve(&buyer, &PartyId::escrow_account(&id), Amount::from(200))
            .unwrap();
        id
    }

    #[test]
    fn happy_path_emits_events_in_order() {
        let (engine, _) = engine_with(MemoryJournal::new());
        let id = created(&engine);
        let (buyer, s3, oracle) = (party("buyer"), party("s3"), party("oracle"));
        engine.accept_agreement(id, &s3).unwrap();
        engine.confirm_payment(id, &buyer, Amount::from(200)).unwrap();
        engine.start_agreement(id, &buyer).unwrap();
        engine.dispatch_order(id, &s3).unwrap();
        let r = engine.update_delivery_status(id, &oracle, true).unwrap();
        assert_eq!(r.state, Some(AgreementState::Completed));

        let kinds: Vec<_> = engine.events(0, None, 100).iter().map(|e| e.kind()).collect();
        assert_eq!(
            kinds,
            vec![
                EventKind::AgreementCreated,
                EventKind::PaymentConfirmed,
                EventKind::OrderDispatched,
                EventKind::DeliveryUpdated,
            ]
        );
        assert_eq!(engine.balance_of(&s3), Amount::from(200));
        assert_eq!(engine.balance_of(&buyer), Amount::from(9_800));
        assert_eq!(engine.oracle_data().unwrap(), 900);
    }

    #[test]
    fn second_active_agreement_rejected() {
        let (engine, clock) = engine_with(MemoryJournal::new());
        created(&engine);
        let err = engine
            .create_agreement(&party("buyer"), 1, Amount::from(1), clock.now(), "Qm2")
            .unwrap_err();
        assert!(matches!(err, AgreementError::AlreadyActive { .. }));
    }

    #[test]
    fn create_checks_role_before_active() {
        let (engine, clock) = engine_with(MemoryJournal::new());
        created(&engine);
        let err = engine
            .create_agreement(&party("s3"), 1, Amount::from(1), clock.now(), "Qm2")
            .unwrap_err();
        assert!(matches!(err, AgreementError::Unauthorized { .. }));
    }

    #[test]
    fn deadline_uses_engine_clock() {
        let (engine, clock) = engine_with(MemoryJournal::new());
        let id = created(&engine);
        clock.advance(3_601);
        assert!(matches!(
            engine.start_agreement(id, &party("buyer")),
            Err(AgreementError::DeadlinePassed { .. })
        ));
    }

    #[test]
    fn rejection_is_journaled_as_abort() {
        let journal = MemoryJournal::new();
        let (engine, _) = engine_with(journal.clone());
        let id = created(&engine);
        let before = journal.len();
        engine.start_agreement(id, &party("s3")).unwrap_err();
        let records = journal.snapshot();
        assert_eq!(records.len(), before + 2);
        assert!(matches!(
            records.last(),
            Some(JournalRecord::Abort { kind, .. }) if kind == "UNAUTHORIZED"
        ));
    }

    #[test]
    fn journal_failure_changes_nothing() {
        let journal = MemoryJournal::new();
        let (engine, _) = engine_with(journal.clone());
        let id = created(&engine);
        engine.accept_agreement(id, &party("s3")).unwrap();
        let view = engine.agreement(id).unwrap();
        let events = engine.events(0, None, 100);

        journal.set_failing(true);
        let err = engine
            .confirm_payment(id, &party("buyer"), Amount::from(200))
            .unwrap_err();
        assert!(matches!(err, AgreementError::Journal(_)));
        assert_eq!(engine.agreement(id).unwrap(), view);
        assert_eq!(engine.events(0, None, 100), events);
        assert_eq!(engine.balance_of(&party("buyer")), Amount::from(10_000));

        journal.set_failing(false);
        engine
            .confirm_payment(id, &party("buyer"), Amount::from(200))
            .unwrap();
        assert_eq!(engine.agreement(id).unwrap().escrow_amount, Amount::from(200));
    }

    #[test]
    fn reopen_restores_state_and_cursors() {
        let journal = MemoryJournal::new();
        let (engine, _) = engine_with(journal.clone());
        let id = created(&engine);
        engine.accept_agreement(id, &party("s3")).unwrap();
        engine.confirm_payment(id, &party("buyer"), Amount::from(200)).unwrap();
        engine.ack("erp", 1).unwrap();
        let view = engine.agreement(id).unwrap();
        drop(engine);

        let (reopened, _) = engine_with(journal);
        assert_eq!(reopened.agreement(id).unwrap(), view);
        assert_eq!(reopened.balance_of(&PartyId::escrow_account(&id)), Amount::from(200));
        let pending = reopened.pending_events("erp", 10);
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].kind(), EventKind::PaymentConfirmed);
        assert_eq!(reopened.replay_report().discarded, 0);
    }

    #[test]
    fn crash_between_intent_and_commit_is_discarded() {
        let journal = MemoryJournal::new();
        let (engine, _) = engine_with(journal.clone());
        let id = created(&engine);
        engine.accept_agreement(id, &party("s3")).unwrap();
        drop(engine);

        let mut raw = journal.clone();
        raw.append(&JournalRecord::Intent {
            txn: 99,
            agreement_id: Some(id),
            caller: party("buyer"),
            command: Command::ConfirmPayment {
                amount: Amount::from(200),
            },
            at: start(),
        })
        .unwrap();

        let (reopened, _) = engine_with(journal);
        assert_eq!(reopened.replay_report().discarded, 1);
        assert!(reopened.agreement(id).unwrap().escrow_amount.is_zero());
        assert_eq!(reopened.balance_of(&party("buyer")), Amount::from(10_000));
    }

    #[test]
    fn only_buyer_mints_and_escrow_accounts_are_off_limits() {
        let (engine, _) = engine_with(MemoryJournal::new());
        assert!(matches!(
            engine.mint(&party("s3"), &party("s3"), Amount::from(1)),
            Err(AgreementError::Unauthorized { .. })
        ));
        let escrow = PartyId::escrow_account(&AgreementId::new());
        assert!(matches!(
            engine.mint(&party("buyer"), &escrow, Amount::from(1)),
            Err(AgreementError::InvalidArgument { .. })
        ));
    }

    #[test]
    fn unknown_agreement_is_not_found() {
        let (engine, _) = engine_with(MemoryJournal::new());
        assert!(matches!(
            engine.accept_agreement(AgreementId::new(), &party("s3")),
            Err(AgreementError::NotFound { .. })
        ));
    }

    #[test]
    fn ack_is_monotone() {
        let (engine, _) = engine_with(MemoryJournal::new());
        created(&engine);
        assert_eq!(engine.ack("erp", 1).unwrap(), 1);
        assert_eq!(engine.ack("erp", 0).unwrap(), 1);
        assert!(engine.ack("erp", 5).is_err());
    }
}
