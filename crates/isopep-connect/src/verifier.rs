//! # Out-of-Band Proof Verification
//!
//! The engine records proof blobs without judging them. [`ProofAuditor`]
//! follows `ZKProofSubmitted` events, runs a [`ProofVerifier`] on a
//! blocking thread, and records each verdict in a [`VerdictBook`]. Verdicts
//! are advisory and never feed back into agreement state.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use isopep_agreement::{AgreementEngine, AgreementEvent, EventDetail, ProofVerifier};
use isopep_core::{sha256_raw, AgreementId, ContentDigest, PartyId, Timestamp};

/// Cursor name under which the auditor acknowledges events.
pub const AUDITOR_CONSUMER: &str = "proof-auditor";

/// Accepts exactly the blobs whose SHA-256 digest is on the list.
#[derive(Debug, Clone, Default)]
pub struct AllowlistVerifier {
    digests: HashSet<ContentDigest>,
}

impl AllowlistVerifier {
    pub fn new(digests: impl IntoIterator<Item = ContentDigest>) -> Self {
        Self {
            digests: digests.into_iter().collect(),
        }
    }

    pub fn allow(&mut self, digest: ContentDigest) {
        self.digests.insert(digest);
    }
}

impl ProofVerifier for AllowlistVerifier {
    fn verify(&self, blob: &[u8]) -> bool {
        self.digests.contains(&sha256_raw(blob))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verdict {
    pub agreement_id: AgreementId,
    pub supplier: PartyId,
    pub digest: ContentDigest,
    pub valid: bool,
    /// Sequence number of the submission event.
    pub event_seq: u64,
    pub checked_at: Timestamp,
}

/// Latest verdict per (agreement, supplier).
#[derive(Debug, Default)]
pub struct VerdictBook {
    verdicts: RwLock<BTreeMap<(AgreementId, PartyId), Verdict>>,
}

impl VerdictBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, verdict: Verdict) {
        self.verdicts
            .write()
            .insert((verdict.agreement_id, verdict.supplier.clone()), verdict);
    }

    pub fn get(&self, agreement_id: AgreementId, supplier: &PartyId) -> Option<Verdict> {
        self.verdicts
            .read()
            .get(&(agreement_id, supplier.clone()))
            .cloned()
    }

    pub fn all(&self) -> Vec<Verdict> {
        self.verdicts.read().values().cloned().collect()
    }
}

pub struct ProofAuditor {
    engine: Arc<AgreementEngine>,
    verifier: Arc<dyn ProofVerifier>,
    book: Arc<VerdictBook>,
    batch_size: usize,
}

impl ProofAuditor {
    pub fn new(
        engine: Arc<AgreementEngine>,
        verifier: Arc<dyn ProofVerifier>,
        book: Arc<VerdictBook>,
    ) -> Self {
        Self {
            engine,
            verifier,
            book,
            batch_size: 64,
        }
    }

    pub fn book(&self) -> &Arc<VerdictBook> {
        &self.book
    }

    /// Verify every pending submission. Returns the number of verdicts recorded.
    pub async fn run_once(&self) -> usize {
        let pending = self.engine.pending_events(AUDITOR_CONSUMER, self.batch_size);
        let mut recorded = 0;
        for event in &pending {
            if let EventDetail::ZkProofSubmitted { supplier, digest } = &event.detail {
                match self.check(event, supplier, *digest).await {
                    Some(verdict) => {
                        tracing::info!(
                            agreement_id = %verdict.agreement_id,
                            supplier = %verdict.supplier,
                            valid = verdict.valid,
                            "proof verified"
                        );
                        self.book.record(verdict);
                        recorded += 1;
                    }
                    None => break,
                }
            }
            if let Err(e) = self.engine.ack(AUDITOR_CONSUMER, event.seq) {
                tracing::warn!(seq = event.seq, error = %e, "failed to acknowledge event");
                break;
            }
        }
        recorded
    }

    pub fn spawn(self: Arc<Self>, interval: Duration) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                self.run_once().await;
            }
        })
    }

    async fn check(
        &self,
        event: &AgreementEvent,
        supplier: &PartyId,
        submitted: ContentDigest,
    ) -> Option<Verdict> {
        let record = match self.engine.proof(event.agreement_id, supplier) {
            Ok(Some(record)) => record,
            Ok(None) => {
                tracing::warn!(seq = event.seq, "submitted proof missing from registry");
                return None;
            }
            Err(e) => {
                tracing::warn!(seq = event.seq, error = %e, "cannot read proof");
                return None;
            }
        };
        if record.digest != submitted {
            // A later submission replaced this blob; verify what is stored now.
            tracing::debug!(seq = event.seq, "proof superseded, verifying latest revision");
        }
        let verifier = Arc::clone(&self.verifier);
        let blob = record.blob;
        let valid = match tokio::task::spawn_blocking(move || verifier.verify(&blob)).await {
            Ok(valid) => valid,
            Err(e) => {
                tracing::warn!(seq = event.seq, error = %e, "verifier task failed");
                return None;
            }
        };
        Some(Verdict {
            agreement_id: event.agreement_id,
            supplier: supplier.clone(),
            digest: record.digest,
            valid,
            event_seq: event.seq,
            checked_at: self.engine.now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use isopep_agreement::{Deployment, MemoryJournal};
    use isopep_core::Amount;

    fn party(s: &str) -> PartyId {
        PartyId::new(s).unwrap()
    }

    fn engine() -> (Arc<AgreementEngine>, AgreementId) {
        let engine = AgreementEngine::open(
            Deployment {
                buyer: party("buyer"),
                oracle: party("oracle"),
                arbitrator: party("arbitrator"),
            },
            Box::new(MemoryJournal::new()),
        )
        .unwrap();
        let deadline = engine.now().plus_secs(3_600).unwrap();
        let id = engine
            .create_agreement(&party("buyer"), 10, Amount::from(1), deadline, "Qm1")
            .unwrap()
            .agreement_id
            .unwrap();
        engine.accept_agreement(id, &party("s3")).unwrap();
        engine.accept_agreement(id, &party("s1")).unwrap();
        (Arc::new(engine), id)
    }

    #[test]
    fn allowlist() {
        let v = AllowlistVerifier::new([sha256_raw(b"good")]);
        assert!(v.verify(b"good"));
        assert!(!v.verify(b"bad"));
    }

    #[tokio::test]
    async fn verdicts_follow_submissions() {
        let (engine, id) = engine();
        engine.submit_zk_proof(id, &party("s3"), b"good".to_vec()).unwrap();
        engine.submit_zk_proof(id, &party("s1"), b"bad".to_vec()).unwrap();

        let verifier = Arc::new(AllowlistVerifier::new([sha256_raw(b"good")]));
        let auditor = ProofAuditor::new(engine.clone(), verifier, Arc::new(VerdictBook::new()));
        assert_eq!(auditor.run_once().await, 2);

        let book = auditor.book();
        assert!(book.get(id, &party("s3")).unwrap().valid);
        assert!(!book.get(id, &party("s1")).unwrap().valid);
        assert!(engine.pending_events(AUDITOR_CONSUMER, 10).is_empty());
        assert_eq!(auditor.run_once().await, 0);
    }

    #[tokio::test]
    async fn verdicts_do_not_touch_the_agreement() {
        let (engine, id) = engine();
        engine.submit_zk_proof(id, &party("s3"), b"bad".to_vec()).unwrap();
        let before = engine.agreement(id).unwrap();
        let auditor = ProofAuditor::new(
            engine.clone(),
            Arc::new(AllowlistVerifier::default()),
            Arc::new(VerdictBook::new()),
        );
        auditor.run_once().await;
        assert_eq!(engine.agreement(id).unwrap(), before);
    }
}
