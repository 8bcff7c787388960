//! # Error Types
//!
//! Errors raised while constructing core domain primitives. Higher crates
//! wrap these in their own error enums; nothing here knows about the
//! agreement lifecycle.

use thiserror::Error;

/// Top-level error type for the core crate.
#[derive(Error, Debug)]
pub enum IsopepError {
    /// A domain primitive rejected its input.
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Canonicalization failed.
    #[error("canonicalization error: {0}")]
    Canonicalization(#[from] CanonicalizationError),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// A domain primitive could not be constructed from the given input.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Party identifiers must be short, printable, and outside the reserved namespace.
    #[error("invalid party id {value:?}: {reason}")]
    InvalidPartyId {
        /// The rejected input.
        value: String,
        /// Why it was rejected.
        reason: String,
    },

    /// Amounts are non-negative integers in the smallest token unit.
    #[error("invalid amount {value:?}: {reason}")]
    InvalidAmount {
        /// The rejected input.
        value: String,
        /// Why it was rejected.
        reason: String,
    },

    /// Timestamps must be RFC 3339 with a `Z` suffix.
    #[error("invalid timestamp {value:?}: {reason}")]
    InvalidTimestamp {
        /// The rejected input.
        value: String,
        /// Why it was rejected.
        reason: String,
    },

    /// Digests are 64 lowercase hex characters, optionally prefixed `sha256:`.
    #[error("invalid digest {value:?}: {reason}")]
    InvalidDigest {
        /// The rejected input.
        value: String,
        /// Why it was rejected.
        reason: String,
    },

    /// An identifier string was not a UUID.
    #[error("invalid identifier {value:?}: {reason}")]
    InvalidIdentifier {
        /// The rejected input.
        value: String,
        /// Why it was rejected.
        reason: String,
    },
}

/// Error during canonical serialization.
#[derive(Error, Debug)]
pub enum CanonicalizationError {
    /// Floats have no deterministic canonical form; amounts travel as strings.
    #[error("float values are not permitted in canonical representations: {0}")]
    FloatRejected(f64),

    /// JSON serialization failed.
    #[error("serialization failed: {0}")]
    SerializationFailed(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_error_display_carries_value_and_reason() {
        let err = ValidationError::InvalidPartyId {
            value: "".into(),
            reason: "must not be empty".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("invalid party id"));
        assert!(msg.contains("must not be empty"));
    }

    #[test]
    fn top_level_wraps_validation() {
        let err: IsopepError = ValidationError::InvalidAmount {
            value: "-1".into(),
            reason: "not a non-negative integer".into(),
        }
        .into();
        assert!(err.to_string().starts_with("validation error:"));
    }

    #[test]
    fn float_rejected_display() {
        let err = CanonicalizationError::FloatRejected(1.5);
        assert!(err.to_string().contains("1.5"));
    }
}
