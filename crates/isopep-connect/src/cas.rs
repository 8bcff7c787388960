//! # Content-Addressed Upload Service
//!
//! Produces the `documentRef` for a new agreement. Content is named by its
//! SHA-256 digest; JSON documents are canonicalized first so equal
//! documents get equal references regardless of key order or whitespace.
//!
//! ## Integrity
//!
//! Every read recomputes the digest of the returned bytes and compares it
//! to the requested digest in constant time. A mismatch is an error, never
//! silently returned content.

use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use subtle::ConstantTimeEq;

use isopep_core::{sha256_raw, CanonicalBytes, ContentDigest};

use crate::error::ConnectError;

/// `upload(bytes) -> contentHash`.
pub trait UploadService: Send + Sync {
    /// Store opaque bytes.
    fn upload(&self, bytes: &[u8]) -> Result<ContentDigest, ConnectError>;

    /// Canonicalize and store a JSON document.
    fn upload_json(&self, value: &serde_json::Value) -> Result<ContentDigest, ConnectError> {
        let canonical = CanonicalBytes::new(value)
            .map_err(|e| ConnectError::Cas(format!("canonicalization failed: {e}")))?;
        self.upload(canonical.as_bytes())
    }

    /// Integrity-checked read. `Ok(None)` when nothing is stored under `digest`.
    fn fetch(&self, digest: &ContentDigest) -> Result<Option<Vec<u8>>, ConnectError>;
}

fn verify(digest: &ContentDigest, bytes: &[u8], location: &str) -> Result<(), ConnectError> {
    let recomputed = sha256_raw(bytes);
    if !bool::from(recomputed.as_bytes().ct_eq(digest.as_bytes())) {
        return Err(ConnectError::Cas(format!(
            "integrity violation: {location} has digest {recomputed} but was stored as {digest}"
        )));
    }
    Ok(())
}

/// In-process store.
#[derive(Debug, Default)]
pub struct MemoryCas {
    blobs: RwLock<HashMap<ContentDigest, Vec<u8>>>,
}

impl MemoryCas {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.blobs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.read().is_empty()
    }
}

impl UploadService for MemoryCas {
    fn upload(&self, bytes: &[u8]) -> Result<ContentDigest, ConnectError> {
        let digest = sha256_raw(bytes);
        self.blobs
            .write()
            .entry(digest)
            .or_insert_with(|| bytes.to_vec());
        Ok(digest)
    }

    fn fetch(&self, digest: &ContentDigest) -> Result<Option<Vec<u8>>, ConnectError> {
        let blobs = self.blobs.read();
        match blobs.get(digest) {
            Some(bytes) => {
                verify(digest, bytes, "memory entry")?;
                Ok(Some(bytes.clone()))
            }
            None => Ok(None),
        }
    }
}

/// Filesystem store. JSON documents land at `{root}/{hex}.json`, other
/// uploads at `{root}/{hex}.bin`. Writes are create-if-absent.
#[derive(Debug, Clone)]
pub struct FsCas {
    root: PathBuf,
}

impl FsCas {
    /// The directory is created on first upload.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, digest: &ContentDigest, extension: &str) -> PathBuf {
        self.root.join(format!("{}.{extension}", digest.to_hex()))
    }

    fn write_once(&self, digest: &ContentDigest, extension: &str, bytes: &[u8]) -> Result<(), ConnectError> {
        fs::create_dir_all(&self.root)?;
        let path = self.path_for(digest, extension);
        match fs::OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(mut f) => {
                f.write_all(bytes)?;
                f.sync_all()?;
                tracing::debug!(path = %path.display(), size = bytes.len(), "stored CAS object");
            }
            // Same name, same content.
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {}
            Err(e) => return Err(e.into()),
        }
        Ok(())
    }
}

impl UploadService for FsCas {
    fn upload(&self, bytes: &[u8]) -> Result<ContentDigest, ConnectError> {
        let digest = sha256_raw(bytes);
        self.write_once(&digest, "bin", bytes)?;
        Ok(digest)
    }

    fn upload_json(&self, value: &serde_json::Value) -> Result<ContentDigest, ConnectError> {
        let canonical = CanonicalBytes::new(value)
            .map_err(|e| ConnectError::Cas(format!("canonicalization failed: {e}")))?;
        let digest = sha256_raw(canonical.as_bytes());
        self.write_once(&digest, "json", canonical.as_bytes())?;
        Ok(digest)
    }

    fn fetch(&self, digest: &ContentDigest) -> Result<Option<Vec<u8>>, ConnectError> {
        for extension in ["json", "bin"] {
            let path = self.path_for(digest, extension);
            match fs::read(&path) {
                Ok(bytes) => {
                    verify(digest, &bytes, &path.display().to_string())?;
                    return Ok(Some(bytes));
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn json_key_order_does_not_matter() {
        let cas = MemoryCas::new();
        let a = cas.upload_json(&json!({"supplier": "S3", "score": 7})).unwrap();
        let b = cas.upload_json(&json!({"score": 7, "supplier": "S3"})).unwrap();
        assert_eq!(a, b);
        assert_eq!(cas.len(), 1);
    }

    #[test]
    fn floats_are_rejected() {
        let cas = MemoryCas::new();
        assert!(matches!(
            cas.upload_json(&json!({"weight": 0.25})),
            Err(ConnectError::Cas(_))
        ));
    }

    #[test]
    fn memory_fetch_roundtrip() {
        let cas = MemoryCas::new();
        let d = cas.upload(b"TOPSIS ranking").unwrap();
        assert_eq!(cas.fetch(&d).unwrap().unwrap(), b"TOPSIS ranking");
        assert!(cas.fetch(&sha256_raw(b"other")).unwrap().is_none());
    }

    #[test]
    fn fs_upload_is_idempotent_and_named_by_digest() {
        let dir = tempfile::tempdir().unwrap();
        let cas = FsCas::new(dir.path().join("cas"));
        let doc = json!({"name": "supplier-allocation-metrics", "rank": [3, 1, 2]});
        let d1 = cas.upload_json(&doc).unwrap();
        let d2 = cas.upload_json(&doc).unwrap();
        assert_eq!(d1, d2);
        let path = cas.path_for(&d1, "json");
        assert!(path.exists());
        let stored: serde_json::Value =
            serde_json::from_slice(&cas.fetch(&d1).unwrap().unwrap()).unwrap();
        assert_eq!(stored, doc);
    }

    #[test]
    fn fs_detects_tampering() {
        let dir = tempfile::tempdir().unwrap();
        let cas = FsCas::new(dir.path());
        let d = cas.upload(b"original").unwrap();
        fs::write(cas.path_for(&d, "bin"), b"tampered").unwrap();
        assert!(matches!(cas.fetch(&d), Err(ConnectError::Cas(msg)) if msg.contains("integrity")));
    }
}
