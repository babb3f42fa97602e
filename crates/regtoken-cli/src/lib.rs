//! # regtoken-cli: Scenario Tooling for the Compliance Ledger
//!
//! Provides the `regtoken` binary.
//!
//! ## Subcommands
//!
//! - `regtoken validate <file>`: parse a scenario and check its references.
//! - `regtoken run <file> [--json]`: deploy the scenario into a fresh engine,
//!   replay its steps and print outcomes plus the end state.
//!
//! ## Crate Policy
//!
//! - Argument parsing lives in `main.rs` and the `*Args` types.
//! - Handlers delegate to the ledger crates; no compliance logic here.

pub mod config;
pub mod replay;
pub mod run;
pub mod scenario;
pub mod validate;
