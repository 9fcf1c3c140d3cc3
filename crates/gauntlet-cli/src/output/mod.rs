//! Renderers for test results.

mod console;
mod json;

pub use console::ConsoleOutput;
pub use json::JsonOutput;

use gauntlet_core::config::OutputConfig;
use gauntlet_core::{OutputFormat, TestOutput};

/// A fresh stdout renderer for one run.
pub fn make_output(config: &OutputConfig) -> Box<dyn TestOutput> {
    match config.format {
        OutputFormat::Console => Box::new(ConsoleOutput::stdout(
            config.verbose,
            config.color,
            config.dots_per_line,
        )),
        OutputFormat::Json => Box::new(JsonOutput::stdout()),
    }
}
