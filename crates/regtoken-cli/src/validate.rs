//! # Validate Subcommand
//!
//! Parses a scenario file and reports structural problems without running
//! anything.

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;

use crate::scenario::Scenario;

/// Arguments for the validate subcommand.
#[derive(Args, Debug)]
pub struct ValidateArgs {
    /// Scenario file (YAML).
    pub file: PathBuf,
}

/// Execute the validate subcommand. Exit code 0 when the scenario is
/// clean, 1 when it has issues.
pub fn run_validate(args: &ValidateArgs) -> Result<u8> {
    let scenario = Scenario::load(&args.file)?;
    let issues = scenario.validate();
    if issues.is_empty() {
        println!(
            "OK: {} ({} registrars, {} investors, {} issuers, {} steps)",
            args.file.display(),
            scenario.registrars.len(),
            scenario.investors.len(),
            scenario.issuers.len(),
            scenario.steps.len()
        );
        return Ok(0);
    }
    for issue in &issues {
        println!("  - {issue}");
    }
    println!("FAIL: {} issue(s) in {}", issues.len(), args.file.display());
    Ok(1)
}
