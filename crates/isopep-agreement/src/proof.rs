//! # Proof Registry
//!
//! Accept-and-record store for opaque attestations submitted by accepted
//! suppliers. The registry never inspects a blob. Validity is decided by
//! a [`ProofVerifier`] running outside the transition path, which reads
//! blobs from here after the submission event has been committed.

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use isopep_core::{sha256_raw, ContentDigest, PartyId, Timestamp};

/// A recorded proof submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofRecord {
    #[serde(with = "isopep_core::hex::serde_hex")]
    pub blob: Vec<u8>,
    /// SHA-256 of the blob, for cheap comparison and event payloads.
    pub digest: ContentDigest,
    pub submitted_at: Timestamp,
    /// How many times this supplier has submitted, including this one.
    pub revision: u32,
}

/// Latest proof per supplier.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofRegistry {
    proofs: BTreeMap<PartyId, ProofRecord>,
}

impl ProofRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `blob` verbatim, replacing any earlier submission.
    pub fn record(&mut self, supplier: &PartyId, blob: Vec<u8>, at: Timestamp) -> &ProofRecord {
        let revision = self
            .proofs
            .get(supplier)
            .map_or(1, |p| p.revision.saturating_add(1));
        let record = ProofRecord {
            digest: sha256_raw(&blob),
            blob,
            submitted_at: at,
            revision,
        };
        match self.proofs.entry(supplier.clone()) {
            Entry::Occupied(mut slot) => {
                slot.insert(record);
                slot.into_mut()
            }
            Entry::Vacant(slot) => slot.insert(record),
        }
    }

    pub fn get(&self, supplier: &PartyId) -> Option<&ProofRecord> {
        self.proofs.get(supplier)
    }

    pub fn len(&self) -> usize {
        self.proofs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.proofs.is_empty()
    }
}

/// Out-of-band proof checker.
///
/// Implementations may be slow or remote. The engine never calls this;
/// a consumer of `ZKProofSubmitted` events does.
pub trait ProofVerifier: Send + Sync {
    fn verify(&self, blob: &[u8]) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn party(s: &str) -> PartyId {
        PartyId::new(s).unwrap()
    }

    fn at() -> Timestamp {
        Timestamp::from_epoch_secs(1_000).unwrap()
    }

    #[test]
    fn stores_blob_verbatim() {
        let mut r = ProofRegistry::new();
        let blob = vec![0xde, 0xad, 0xbe, 0xef];
        let rec = r.record(&party("s3"), blob.clone(), at());
        assert_eq!(rec.blob, blob);
        assert_eq!(rec.digest, sha256_raw(&blob));
        assert_eq!(rec.revision, 1);
    }

    #[test]
    fn resubmission_replaces_and_bumps_revision() {
        let mut r = ProofRegistry::new();
        r.record(&party("s3"), vec![1], at());
        let rec = r.record(&party("s3"), vec![2], at());
        assert_eq!(rec.blob, vec![2]);
        assert_eq!(rec.revision, 2);
        assert_eq!(r.len(), 1);
    }

    #[test]
    fn blob_serializes_as_hex() {
        let mut r = ProofRegistry::new();
        r.record(&party("s3"), vec![0x0a, 0xff], at());
        let json = serde_json::to_value(&r).unwrap();
        assert_eq!(json["proofs"]["s3"]["blob"], "0aff");
        let back: ProofRegistry = serde_json::from_value(json).unwrap();
        assert_eq!(back, r);
    }

    struct NonEmpty;

    impl ProofVerifier for NonEmpty {
        fn verify(&self, blob: &[u8]) -> bool {
            !blob.is_empty()
        }
    }

    #[test]
    fn verifier_is_object_safe() {
        let v: Box<dyn ProofVerifier> = Box::new(NonEmpty);
        assert!(v.verify(b"proof"));
        assert!(!v.verify(b""));
    }
}
