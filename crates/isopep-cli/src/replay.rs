//! # Replay Subcommand
//!
//! Rebuilds engine state from a journal file and prints what recovery
//! found: committed, aborted, and discarded transactions, plus every
//! agreement as of the last commit.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;

use isopep_agreement::{AgreementEngine, AgreementView, Deployment, FileJournal, ReplayReport};
use isopep_core::PartyId;

#[derive(Args, Debug)]
pub struct ReplayArgs {
    /// Journal file to replay.
    #[arg(long, value_name = "PATH")]
    pub journal: PathBuf,

    /// Buyer identity the journal was written under.
    #[arg(long, default_value = "buyer")]
    pub buyer: String,

    #[arg(long, default_value = "oracle")]
    pub oracle: String,

    #[arg(long, default_value = "arbitrator")]
    pub arbitrator: String,

    /// Print the report and agreements as JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Serialize)]
pub struct Recovery {
    pub report: ReplayReport,
    pub agreements: Vec<AgreementView>,
}

/// Execute the replay subcommand.
pub fn run_replay(args: &ReplayArgs) -> Result<u8> {
    let recovery = recover(args)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&recovery)?);
        return Ok(0);
    }

    let r = &recovery.report;
    println!(
        "replayed {}: {} committed, {} aborted, {} discarded, {} acks",
        args.journal.display(),
        r.committed,
        r.aborted,
        r.discarded,
        r.acks
    );
    for a in &recovery.agreements {
        println!(
            "  {}  {:<22} escrow {:>8}  deposited {:>8}",
            a.id,
            a.state.as_str(),
            a.escrow_amount.to_string(),
            a.total_deposited.to_string()
        );
    }
    if r.discarded > 0 {
        println!("WARNING: {} incomplete transaction(s) discarded", r.discarded);
    }
    Ok(0)
}

pub fn recover(args: &ReplayArgs) -> Result<Recovery> {
    if !args.journal.exists() {
        anyhow::bail!("journal not found: {}", args.journal.display());
    }
    let deployment = Deployment {
        buyer: PartyId::new(args.buyer.as_str()).context("--buyer")?,
        oracle: PartyId::new(args.oracle.as_str()).context("--oracle")?,
        arbitrator: PartyId::new(args.arbitrator.as_str()).context("--arbitrator")?,
    };
    let journal = FileJournal::open(&args.journal)
        .with_context(|| format!("failed to open journal: {}", args.journal.display()))?;
    let engine = AgreementEngine::open(deployment, Box::new(journal))
        .with_context(|| format!("failed to replay {}", args.journal.display()))?;

    Ok(Recovery {
        report: engine.replay_report(),
        agreements: engine.agreements(),
    })
}
