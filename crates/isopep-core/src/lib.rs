//! # isopep-core: Foundational Types
//!
//! Leaf crate of the isopep workspace. It defines the primitives every
//! other crate shares and depends on nothing internal.
//!
//! - [`AgreementId`] and [`PartyId`]: typed identifiers. Callers are parties;
//!   the `escrow:` namespace is reserved for engine-held accounts.
//! - [`Amount`]: checked, non-negative integer token quantities serialized
//!   as decimal strings.
//! - [`Timestamp`]: UTC with second precision.
//! - [`CanonicalBytes`] and [`ContentDigest`]: deterministic JSON and the
//!   SHA-256 names derived from it, used for document references, proof
//!   blobs, and event fingerprints.
//!
//! ## Crate Policy
//!
//! - No `unsafe`.
//! - No `.unwrap()` outside tests.

pub mod amount;
pub mod canonical;
pub mod digest;
pub mod error;
pub mod hex;
pub mod identity;
pub mod temporal;

pub use amount::Amount;
pub use canonical::CanonicalBytes;
pub use digest::{sha256_digest, sha256_raw, ContentDigest};
pub use error::{CanonicalizationError, IsopepError, ValidationError};
pub use identity::{AgreementId, PartyId};
pub use temporal::Timestamp;
