//! # Identity Newtypes
//!
//! [`AgreementId`] addresses one agreement aggregate. [`PartyId`] names a
//! caller: a buyer, a supplier, the oracle, the arbitrator, or an internal
//! escrow account. The two are distinct types so a party can never be
//! passed where an agreement is expected.
//!
//! ## Validation
//!
//! Party identifiers are opaque strings chosen by the hosting runtime
//! (wallet addresses, account handles). They are restricted to a printable
//! ASCII subset so they are safe in URLs, headers, and journal lines.
//! The `escrow:` prefix is reserved: only [`PartyId::escrow_account`]
//! may produce it, so no external caller can impersonate an escrow account.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ValidationError;

/// Prefix reserved for escrow accounts held by the engine itself.
pub const ESCROW_ACCOUNT_PREFIX: &str = "escrow:";

/// Maximum length of a party identifier in bytes.
pub const MAX_PARTY_ID_LEN: usize = 128;

/// A unique identifier for a supply agreement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AgreementId(Uuid);

impl AgreementId {
    /// Create a new random agreement identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create an agreement identifier from an existing UUID.
    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    /// Parse an agreement identifier from its hyphenated UUID form.
    pub fn parse(s: &str) -> Result<Self, ValidationError> {
        Uuid::parse_str(s.trim())
            .map(Self)
            .map_err(|e| ValidationError::InvalidIdentifier {
                value: s.to_string(),
                reason: e.to_string(),
            })
    }

    /// Access the underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for AgreementId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for AgreementId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The identity of a caller or token holder.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PartyId(String);

impl PartyId {
    /// Validate an externally supplied party identifier.
    ///
    /// Rejects the reserved `escrow:` namespace in addition to the
    /// format rules applied by [`TryFrom<String>`].
    pub fn new(s: impl Into<String>) -> Result<Self, ValidationError> {
        let s = s.into();
        if s.starts_with(ESCROW_ACCOUNT_PREFIX) {
            return Err(ValidationError::InvalidPartyId {
                value: s,
                reason: format!("the {ESCROW_ACCOUNT_PREFIX:?} prefix is reserved"),
            });
        }
        Self::try_from(s)
    }

    /// Build a party id from a literal.
    ///
    /// # Panics
    ///
    /// Panics if `name` is not a valid party id. Use [`PartyId::new`] for
    /// anything that is not a compile-time constant.
    pub fn from_static(name: &'static str) -> Self {
        match Self::new(name) {
            Ok(party) => party,
            Err(e) => panic!("invalid static party id: {e}"),
        }
    }

    /// The escrow account that holds funds for the given agreement.
    pub fn escrow_account(agreement: &AgreementId) -> Self {
        Self(format!("{ESCROW_ACCOUNT_PREFIX}{agreement}"))
    }

    /// Whether this identity is an engine-held escrow account.
    pub fn is_escrow_account(&self) -> bool {
        self.0.starts_with(ESCROW_ACCOUNT_PREFIX)
    }

    /// Return the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for PartyId {
    type Error = ValidationError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        let reject = |reason: &str| ValidationError::InvalidPartyId {
            value: s.clone(),
            reason: reason.to_string(),
        };
        if s.is_empty() {
            return Err(reject("must not be empty"));
        }
        if s.len() > MAX_PARTY_ID_LEN {
            return Err(reject("longer than 128 bytes"));
        }
        if !s
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | ':' | '@'))
        {
            return Err(reject("only [A-Za-z0-9-_.:@] are allowed"));
        }
        Ok(Self(s))
    }
}

impl From<PartyId> for String {
    fn from(id: PartyId) -> Self {
        id.0
    }
}

impl std::str::FromStr for PartyId {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl std::fmt::Display for PartyId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
