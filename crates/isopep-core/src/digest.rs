//! # Content Digests
//!
//! A [`ContentDigest`] names a document, event, or proof blob by the
//! SHA-256 of its bytes. Structured values are hashed through
//! [`CanonicalBytes`] so every party computes the same digest; opaque blobs
//! (uploaded files, proof payloads) are hashed as-is with [`sha256_raw`].
//!
//! The textual form is `sha256:<64 hex chars>`. This is what an agreement
//! stores as its document reference.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::canonical::CanonicalBytes;
use crate::error::ValidationError;
use crate::hex;

/// Textual prefix identifying the hash algorithm.
pub const SHA256_PREFIX: &str = "sha256:";

/// A SHA-256 content digest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ContentDigest([u8; 32]);

impl ContentDigest {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Lowercase hex without prefix.
    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }

    /// Parse `sha256:<hex>` or bare hex.
    pub fn parse(s: &str) -> Result<Self, ValidationError> {
        let t = s.trim();
        let hex_part = t.strip_prefix(SHA256_PREFIX).unwrap_or(t);
        let invalid = |reason: &str| ValidationError::InvalidDigest {
            value: s.to_string(),
            reason: reason.to_string(),
        };
        if hex_part.len() != 64 {
            return Err(invalid("expected 64 hex characters"));
        }
        let decoded = hex::decode(hex_part).map_err(|e| invalid(e.as_str()))?;
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&decoded);
        Ok(Self(bytes))
    }
}

impl std::fmt::Display for ContentDigest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{SHA256_PREFIX}{}", self.to_hex())
    }
}

impl TryFrom<String> for ContentDigest {
    type Error = ValidationError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<ContentDigest> for String {
    fn from(d: ContentDigest) -> Self {
        d.to_string()
    }
}

/// SHA-256 over canonical bytes.
pub fn sha256_digest(data: &CanonicalBytes) -> ContentDigest {
    sha256_raw(data.as_bytes())
}

/// SHA-256 over opaque bytes. Use [`sha256_digest`] for structured values.
pub fn sha256_raw(data: &[u8]) -> ContentDigest {
    let hash = Sha256::digest(data);
    let mut bytes = [0u8; 32];
    bytes.copy_from_slice(&hash);
    ContentDigest(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_vector_for_empty_object() {
        let cb = CanonicalBytes::new(&serde_json::json!({})).unwrap();
        assert_eq!(
            sha256_digest(&cb).to_hex(),
            "44136fa355b3678a1146ad16f7e8649e94fb4fc21fe77e8310c060f61caaff8a"
        );
    }

    #[test]
    fn known_vector_for_empty_blob() {
        assert_eq!(
            sha256_raw(b"").to_hex(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn field_order_does_not_change_digest() {
        let a: serde_json::Value = serde_json::from_str(r#"{"qty":1000,"price":"10"}"#).unwrap();
        let b: serde_json::Value = serde_json::from_str(r#"{"price":"10","qty":1000}"#).unwrap();
        let da = sha256_digest(&CanonicalBytes::new(&a).unwrap());
        let db = sha256_digest(&CanonicalBytes::new(&b).unwrap());
        assert_eq!(da, db);
    }

    #[test]
    fn display_and_parse_roundtrip() {
        let d = sha256_raw(b"QmHashIsopepTOPSIS2025");
        let s = d.to_string();
        assert!(s.starts_with("sha256:"));
        assert_eq!(s.len(), 7 + 64);
        assert_eq!(ContentDigest::parse(&s).unwrap(), d);
        assert_eq!(ContentDigest::parse(&d.to_hex()).unwrap(), d);
    }

    #[test]
    fn parse_rejects_bad_input() {
        assert!(ContentDigest::parse("sha256:abc").is_err());
        assert!(ContentDigest::parse(&"g".repeat(64)).is_err());
    }

    #[test]
    fn serde_uses_prefixed_string() {
        let d = sha256_raw(b"x");
        let json = serde_json::to_string(&d).unwrap();
        assert_eq!(json, format!("\"{d}\""));
        let back: ContentDigest = serde_json::from_str(&json).unwrap();
        assert_eq!(back, d);
    }
}
