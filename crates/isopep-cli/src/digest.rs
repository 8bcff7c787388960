//! # Digest Subcommand
//!
//! Computes the `documentRef` a JSON document would be pinned under.
//! Canonicalization makes the result independent of key order and
//! whitespace. `--raw` hashes the file bytes as-is.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use isopep_connect::{FsCas, UploadService};
use isopep_core::{sha256_digest, sha256_raw, CanonicalBytes, ContentDigest};

#[derive(Args, Debug)]
pub struct DigestArgs {
    /// Document to digest.
    #[arg(value_name = "FILE")]
    pub file: PathBuf,

    /// Hash the bytes without JSON canonicalization.
    #[arg(long)]
    pub raw: bool,

    /// Also pin the document into a filesystem CAS rooted here.
    #[arg(long, value_name = "DIR")]
    pub store: Option<PathBuf>,
}

/// Execute the digest subcommand.
pub fn run_digest(args: &DigestArgs) -> Result<u8> {
    let bytes = std::fs::read(&args.file)
        .with_context(|| format!("failed to read {}", args.file.display()))?;

    let digest = if args.raw {
        sha256_raw(&bytes)
    } else {
        json_digest(&bytes).with_context(|| format!("{}", args.file.display()))?
    };

    if let Some(root) = &args.store {
        let cas = FsCas::new(root);
        let stored = if args.raw {
            cas.upload(&bytes)?
        } else {
            let value: serde_json::Value = serde_json::from_slice(&bytes)?;
            cas.upload_json(&value)?
        };
        tracing::info!(digest = %stored, root = %root.display(), "pinned");
    }

    println!("{digest}");
    Ok(0)
}

/// Digest of the canonical form of a JSON document.
pub fn json_digest(bytes: &[u8]) -> Result<ContentDigest> {
    let value: serde_json::Value = serde_json::from_slice(bytes).context("not valid JSON")?;
    let canonical = CanonicalBytes::new(&value).context("canonicalization failed")?;
    Ok(sha256_digest(&canonical))
}
