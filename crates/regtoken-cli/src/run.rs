//! # Run Subcommand
//!
//! Replays a scenario against a fresh engine and prints each step's
//! outcome followed by the end state.
//!
//! The clock starts at `REGTOKEN_NOW` when set, else at the scenario's
//! `start`, else at the current system time.

use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::Args;

use regtoken_core::Timestamp;

use crate::config::CliConfig;
use crate::replay::{Outcome, Replay, RunReport};
use crate::scenario::Scenario;

/// Arguments for the run subcommand.
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Scenario file (YAML).
    pub file: PathBuf,

    /// Print the full report as JSON instead of text.
    #[arg(long)]
    pub json: bool,
}

/// Execute the run subcommand. Exit code 0 when every expectation held,
/// 1 otherwise.
pub fn run_scenario(args: &RunArgs, config: &CliConfig) -> Result<u8> {
    let scenario = Scenario::load(&args.file)?;
    let issues = scenario.validate();
    if let Some(first) = issues.first() {
        bail!(
            "{} has {} structural issue(s), first: {first}",
            args.file.display(),
            issues.len()
        );
    }

    let start = config
        .now
        .or(scenario.start)
        .unwrap_or_else(|| Timestamp::now().epoch_secs());
    let report = Replay::deploy(&scenario, start)?.run(&scenario)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_text(&report);
    }
    Ok(if report.mismatches == 0 { 0 } else { 1 })
}

fn print_text(report: &RunReport) {
    for step in &report.steps {
        let flag = if step.matched { " " } else { "!" };
        let detail = match &step.outcome {
            Outcome::Committed { .. } => "committed".to_string(),
            Outcome::Pending { signatures, threshold } => format!("pending {signatures}/{threshold}"),
            Outcome::Rejected { kind, reason } => format!("rejected [{kind}] {reason}"),
        };
        println!("{flag} {:>3} {:<14} {detail}", step.index, step.action);
    }
    println!();
    for issuer in &report.issuers {
        println!(
            "issuer {} ({}): {} investor(s)",
            issuer.name, issuer.id, issuer.counters.total_investors
        );
        for token in &issuer.tokens {
            println!(
                "  {} supply={} treasury={}{}",
                token.info.symbol,
                token.info.total_supply,
                token.treasury_balance,
                if token.info.locked { " locked" } else { "" }
            );
            for (label, balance) in &token.holders {
                println!("    {label}: {balance}");
            }
        }
    }
    if report.mismatches > 0 {
        println!();
        println!("{} step(s) did not match their expectation", report.mismatches);
    }
}
