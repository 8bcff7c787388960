//! # isopep CLI library
//!
//! Subcommand implementations for the `isopep` binary. Each module exposes
//! a clap `Args` struct and a `run_*` function returning the process exit
//! code.
//!
//! - [`simulate`]: run the reference agreement end to end.
//! - [`replay`]: rebuild agreements from a journal file.
//! - [`digest`]: compute the content reference of a JSON document.

pub mod digest;
pub mod replay;
pub mod simulate;
