//! # Outbox Relay
//!
//! Drains the engine's event outbox into the ERP notifier. Only
//! finalization events (Completed, Cancelled) are synced; every other
//! event is acknowledged and skipped.
//!
//! Delivery is at-least-once: an event is acknowledged only after the ERP
//! reports success. When retries are exhausted the relay stops the batch
//! without acknowledging, and the next pass starts from the same event.
//! The relay reads from the engine and never mutates agreement state.

use std::sync::Arc;
use std::time::Duration;

use isopep_agreement::{AgreementEngine, AgreementEvent};

use crate::erp::{ErpNotifier, SyncRecord, SyncStatus};

/// Cursor name under which the relay acknowledges events.
pub const RELAY_CONSUMER: &str = "erp-relay";

/// Exponential backoff for ERP calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts after the first one.
    pub max_retries: u32,
    /// Delay before the first retry; doubles on each further retry.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    /// 200ms, 400ms, 800ms.
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(200),
        }
    }
}

impl RetryPolicy {
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay
            .saturating_mul(2u32.saturating_pow(attempt))
    }

    /// Call `notifier` until it reports success or retries run out.
    pub async fn deliver(&self, notifier: &dyn ErpNotifier, record: &SyncRecord) -> SyncStatus {
        for attempt in 0..self.max_retries {
            match notifier.notify(record).await {
                SyncStatus::Success => return SyncStatus::Success,
                status => {
                    let delay = self.delay_for(attempt);
                    tracing::warn!(
                        agreement_id = %record.agreement_id,
                        attempt = attempt + 1,
                        max_retries = self.max_retries,
                        %status,
                        "ERP sync failed, retrying in {delay:?}"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
        notifier.notify(record).await
    }
}

/// Counts from one relay pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayReport {
    pub delivered: usize,
    pub skipped: usize,
    /// Events left unacknowledged for the next pass.
    pub deferred: usize,
}

pub struct OutboxRelay {
    engine: Arc<AgreementEngine>,
    notifier: Arc<dyn ErpNotifier>,
    policy: RetryPolicy,
    batch_size: usize,
}

impl OutboxRelay {
    pub fn new(engine: Arc<AgreementEngine>, notifier: Arc<dyn ErpNotifier>) -> Self {
        Self {
            engine,
            notifier,
            policy: RetryPolicy::default(),
            batch_size: 64,
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Process one batch of unacknowledged events, in order.
    pub async fn run_once(&self) -> RelayReport {
        let pending = self.engine.pending_events(RELAY_CONSUMER, self.batch_size);
        let mut report = RelayReport::default();

        for (idx, event) in pending.iter().enumerate() {
            if !event.is_finalization() {
                if !self.ack(event) {
                    report.deferred = pending.len() - idx;
                    break;
                }
                report.skipped += 1;
                continue;
            }
            let Some(record) = self.record_for(event) else {
                report.deferred = pending.len() - idx;
                break;
            };
            match self.policy.deliver(self.notifier.as_ref(), &record).await {
                SyncStatus::Success if self.ack(event) => report.delivered += 1,
                status => {
                    tracing::warn!(
                        seq = event.seq,
                        agreement_id = %event.agreement_id,
                        %status,
                        "ERP sync deferred to next pass"
                    );
                    report.deferred = pending.len() - idx;
                    break;
                }
            }
        }
        report
    }

    /// Run [`OutboxRelay::run_once`] every `interval` until the task is aborted.
    pub fn spawn(self: Arc<Self>, interval: Duration) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let report = self.run_once().await;
                if report != RelayReport::default() {
                    tracing::debug!(?report, "relay pass complete");
                }
            }
        })
    }

    fn record_for(&self, event: &AgreementEvent) -> Option<SyncRecord> {
        let view = match self.engine.agreement(event.agreement_id) {
            Ok(view) => view,
            Err(e) => {
                tracing::warn!(seq = event.seq, error = %e, "finalized agreement not readable");
                return None;
            }
        };
        match event.digest() {
            Ok(tx_ref) => Some(SyncRecord::from_view(&view, tx_ref)),
            Err(e) => {
                tracing::warn!(seq = event.seq, error = %e, "cannot digest finalization event");
                None
            }
        }
    }

    fn ack(&self, event: &AgreementEvent) -> bool {
        match self.engine.ack(RELAY_CONSUMER, event.seq) {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!(seq = event.seq, error = %e, "failed to acknowledge event");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    use crate::erp::{BoxFuture, MemoryErp};
    use isopep_agreement::{Deployment, MemoryJournal};
    use isopep_core::{Amount, PartyId};

    fn party(s: &str) -> PartyId {
        PartyId::new(s).unwrap()
    }

    fn completed_engine() -> Arc<AgreementEngine> {
        let engine = AgreementEngine::open(
            Deployment {
                buyer: party("buyer"),
                oracle: party("oracle"),
                arbitrator: party("arbitrator"),
            },
            Box::new(MemoryJournal::new()),
        )
        .unwrap();
        let (buyer, s3) = (party("buyer"), party("s3"));
        let deadline = engine.now().plus_secs(3_600).unwrap();
        let id = engine
            .create_agreement(&buyer, 100, Amount::from(2), deadline, "Qm1")
            .unwrap()
            .agreement_id
            .unwrap();
        engine.mint(&buyer, &buyer, Amount::from(200)).unwrap();
        engine
            .approve(&buyer, &PartyId::escrow_account(&id), Amount::from(200))
            .unwrap();
        engine.accept_agreement(id, &s3).unwrap();
        engine.confirm_payment(id, &buyer, Amount::from(200)).unwrap();
        engine.start_agreement(id, &buyer).unwrap();
        engine.dispatch_order(id, &s3).unwrap();
        engine
            .update_delivery_status(id, &party("oracle"), true)
            .unwrap();
        Arc::new(engine)
    }

    fn fast() -> RetryPolicy {
        RetryPolicy {
            max_retries: 2,
            base_delay: Duration::from_millis(1),
        }
    }

    #[test]
    fn backoff_doubles() {
        let p = RetryPolicy::default();
        assert_eq!(p.delay_for(0), Duration::from_millis(200));
        assert_eq!(p.delay_for(1), Duration::from_millis(400));
        assert_eq!(p.delay_for(2), Duration::from_millis(800));
    }

    #[tokio::test]
    async fn finalization_is_synced_once_and_acknowledged() {
        let engine = completed_engine();
        let erp = Arc::new(MemoryErp::new());
        let relay = OutboxRelay::new(engine.clone(), erp.clone()).with_policy(fast());

        let report = relay.run_once().await;
        assert_eq!(report.delivered, 1);
        assert_eq!(report.skipped, 3);
        assert_eq!(report.deferred, 0);
        let id = engine.current().unwrap().id.to_string();
        assert_eq!(erp.status(&id), SyncStatus::Success);

        assert_eq!(relay.run_once().await, RelayReport::default());
        assert!(engine.pending_events(RELAY_CONSUMER, 10).is_empty());
    }

    #[tokio::test]
    async fn exhausted_retries_leave_event_pending() {
        let engine = completed_engine();
        let erp = Arc::new(MemoryErp::failing());
        let relay = OutboxRelay::new(engine.clone(), erp.clone()).with_policy(fast());

        let report = relay.run_once().await;
        assert_eq!(report.delivered, 0);
        assert_eq!(report.deferred, 1);
        let pending = engine.pending_events(RELAY_CONSUMER, 10);
        assert_eq!(pending.len(), 1);
        assert!(pending[0].is_finalization());

        erp.set_failing(false);
        assert_eq!(relay.run_once().await.delivered, 1);
    }

    struct Flaky {
        failures_left: AtomicU32,
        calls: AtomicU32,
    }

    impl ErpNotifier for Flaky {
        fn notify<'a>(&'a self, _record: &'a SyncRecord) -> BoxFuture<'a, SyncStatus> {
            Box::pin(async move {
                self.calls.fetch_add(1, Ordering::SeqCst);
                let left = self.failures_left.load(Ordering::SeqCst);
                if left > 0 {
                    self.failures_left.store(left - 1, Ordering::SeqCst);
                    SyncStatus::Failed
                } else {
                    SyncStatus::Success
                }
            })
        }

        fn status_of<'a>(&'a self, _id: &'a str) -> BoxFuture<'a, SyncStatus> {
            Box::pin(async { SyncStatus::Unknown })
        }
    }

    #[tokio::test]
    async fn transient_failures_are_retried() {
        let engine = completed_engine();
        let flaky = Arc::new(Flaky {
            failures_left: AtomicU32::new(2),
            calls: AtomicU32::new(0),
        });
        let relay = OutboxRelay::new(engine, flaky.clone()).with_policy(fast());
        assert_eq!(relay.run_once().await.delivered, 1);
        assert_eq!(flaky.calls.load(Ordering::SeqCst), 3);
    }
}
