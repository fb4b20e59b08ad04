//! `libfed`: federated library-availability search.
//!
//! The workspace's logic lives in the `crates/libfed-*` members; this root
//! crate only wires them together into a runnable CLI (spec §11
//! "`libfed-cli`"): registry/settings loading, adapter registry
//! construction, search execution, and logging/exit-code plumbing.

pub mod cli;
pub mod exit_codes;
pub mod logging;

pub use exit_codes::ExitCode;
