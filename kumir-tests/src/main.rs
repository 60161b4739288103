//! Main binary for running Kumir translator tests

use anyhow::{Context, Result};
use clap::error::ErrorKind;
use clap::Parser;
use log::error;
use std::process;

use kumir_tests::config::exit;
use kumir_tests::{KumirHarness, TestConfig};

fn main() {
    let config = match TestConfig::try_parse() {
        Ok(config) => config,
        Err(e) => {
            // Help is printed like any usage problem and does not count as a run
            let code = match e.kind() {
                ErrorKind::DisplayVersion => exit::SUCCESS,
                _ => exit::USAGE,
            };
            let _ = e.print();
            process::exit(code);
        }
    };

    init_logging(config.verbose);

    if let Err(issue) = config.validate() {
        eprintln!("Configuration error: {}", issue);
        process::exit(issue.exit_code());
    }

    match run(config) {
        Ok(code) => process::exit(code),
        Err(e) => {
            error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            process::exit(exit::INTERNAL);
        }
    }
}

fn run(config: TestConfig) -> Result<i32> {
    let harness = KumirHarness::new(config).context("Failed to create test harness")?;
    let outcome = harness.run().context("Test run failed")?;
    Ok(outcome.exit_code())
}

fn init_logging(verbose: bool) {
    let default_filter = if verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter)).init();
}
