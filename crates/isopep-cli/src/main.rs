//! # isopep CLI entry point
//!
//! Parses command-line arguments and dispatches to subcommand handlers.

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use isopep_cli::digest::{run_digest, DigestArgs};
use isopep_cli::replay::{run_replay, ReplayArgs};
use isopep_cli::simulate::{run_simulate, SimulateArgs};

/// isopep: supply agreements with token escrow, oracle-confirmed delivery,
/// and arbitrated disputes.
#[derive(Parser, Debug)]
#[command(name = "isopep", version, about, long_about = None)]
struct Cli {
    /// Enable verbose output. Repeat for more verbosity (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run one agreement end to end against a fresh engine.
    Simulate(SimulateArgs),

    /// Rebuild agreements from a journal file and report recovery.
    Replay(ReplayArgs),

    /// Compute the content reference of a JSON document.
    Digest(DigestArgs),
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => EnvFilter::new("warn"),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    tracing::debug!("isopep CLI v{} starting", env!("CARGO_PKG_VERSION"));

    let result = match cli.command {
        Commands::Simulate(args) => run_simulate(&args),
        Commands::Replay(args) => run_replay(&args),
        Commands::Digest(args) => run_digest(&args),
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            tracing::error!("{e:#}");
            ExitCode::from(1)
        }
    }
}
