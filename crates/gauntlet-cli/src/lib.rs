//! Command-line runner for tests registered with `gauntlet-core`.
//!
//! A test binary links its tests in with `test_case!` and hands control to
//! [`run_registered_tests`], which parses the command line, loads the
//! configuration, runs, and returns the process exit code.

pub mod args;
pub mod output;
pub mod runner;

use clap::Parser;
use color_eyre::Result;
use gauntlet_core::config::{DEFAULT_LOG_FILTER, LOG_ENV_VAR};
use gauntlet_core::{Config, TestRegistry};
use tracing_subscriber::EnvFilter;

pub use args::{Cli, ListMode};
pub use runner::{RunOutcome, Runner};

/// Log to stderr, filtered by `GAUNTLET_LOG`.
pub fn init_logging() {
    let filter = EnvFilter::try_from_env(LOG_ENV_VAR).unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Configuration from `--config`, or the default locations, with the flags
/// applied on top.
pub fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::load()?,
    };
    cli.apply_to(&mut config);
    config.validate()?;
    Ok(config)
}

/// Run `registry` as directed by `cli`, returning the exit code.
pub fn run_with_args(cli: Cli, mut registry: TestRegistry) -> Result<i32> {
    if cli.print_config {
        print!("{}", Config::default_config_string());
        return Ok(0);
    }
    let config = load_config(&cli)?;
    let outcome = Runner::new(config)
        .with_list_mode(cli.list_mode())
        .run(&mut registry)?;
    Ok(outcome.exit_code())
}

/// Parse the process arguments and run every statically registered test.
pub fn run_registered_tests() -> Result<i32> {
    run_with_args(Cli::parse(), TestRegistry::from_registered())
}
