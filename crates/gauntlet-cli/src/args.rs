//! Command-line flags.

use std::path::PathBuf;

use clap::{ArgAction, Parser, ValueEnum};
use gauntlet_core::{Config, OutputFormat};

#[derive(Parser, Debug, Default)]
#[command(name = "gauntlet")]
#[command(about = "Run registered unit tests", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Print each test and its duration instead of progress dots
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,

    /// Colorize the summary
    #[arg(short, long)]
    pub color: bool,

    /// Run the selection N times
    #[arg(short, long, value_name = "N")]
    pub repeat: Option<usize>,

    /// Only run groups containing this text
    #[arg(short, long = "group", value_name = "GROUP")]
    pub groups: Vec<String>,

    /// Only run groups named exactly this
    #[arg(long = "strict-group", value_name = "GROUP")]
    pub strict_groups: Vec<String>,

    /// Skip groups containing this text
    #[arg(long = "exclude-group", value_name = "GROUP")]
    pub exclude_groups: Vec<String>,

    /// Only run tests whose name contains this text
    #[arg(short, long = "name", value_name = "NAME")]
    pub names: Vec<String>,

    /// Only run tests named exactly this
    #[arg(long = "strict-name", value_name = "NAME")]
    pub strict_names: Vec<String>,

    /// Skip tests whose name contains this text
    #[arg(long = "exclude-name", value_name = "NAME")]
    pub exclude_names: Vec<String>,

    /// Print the group names and exit
    #[arg(long)]
    pub list_groups: bool,

    /// Print group.name for every selected test and exit
    #[arg(long)]
    pub list_names: bool,

    /// Print group.name.file.line for every selected test and exit
    #[arg(long)]
    pub list_locations: bool,

    /// Run every test in its own child process
    #[arg(short = 'p', long)]
    pub separate_process: bool,

    /// Run tests in declaration order
    #[arg(short = 'b', long)]
    pub reverse: bool,

    /// Shuffle the tests, optionally with a fixed seed
    #[arg(short, long, value_name = "SEED", num_args = 0..=1)]
    pub shuffle: Option<Option<u64>>,

    /// Run tests declared as ignored
    #[arg(long)]
    pub run_ignored: bool,

    /// Crash at the first failure
    #[arg(short = 'f', long)]
    pub crash_on_fail: bool,

    /// Let unexpected panics escape the runner
    #[arg(short = 'e', long = "rethrow")]
    pub rethrow: bool,

    /// Output format
    #[arg(short, long, value_enum)]
    pub output: Option<OutputArg>,

    /// Read configuration from this file
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Print the default configuration and exit
    #[arg(long)]
    pub print_config: bool,

    /// Account every allocation and print a report after the run
    #[arg(long)]
    pub memory_report: bool,

    /// Do not fail tests that leak
    #[arg(long)]
    pub no_leak_detection: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputArg {
    Console,
    Json,
}

impl From<OutputArg> for OutputFormat {
    fn from(arg: OutputArg) -> Self {
        match arg {
            OutputArg::Console => OutputFormat::Console,
            OutputArg::Json => OutputFormat::Json,
        }
    }
}

/// What to list instead of running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListMode {
    Groups,
    Names,
    Locations,
}

impl Cli {
    pub fn list_mode(&self) -> Option<ListMode> {
        if self.list_groups {
            Some(ListMode::Groups)
        } else if self.list_names {
            Some(ListMode::Names)
        } else if self.list_locations {
            Some(ListMode::Locations)
        } else {
            None
        }
    }

    /// Fold the flags into `config`. Flags win over file and environment.
    pub fn apply_to(&self, config: &mut Config) {
        if self.verbose > 0 {
            config.output.verbose = true;
        }
        if self.color {
            config.output.color = true;
        }
        if let Some(repeat) = self.repeat {
            config.run.repeat = repeat.max(1);
        }
        if let Some(output) = self.output {
            config.output.format = output.into();
        }

        config.filter.groups.extend(self.groups.iter().cloned());
        config.filter.strict_groups.extend(self.strict_groups.iter().cloned());
        config.filter.exclude_groups.extend(self.exclude_groups.iter().cloned());
        config.filter.names.extend(self.names.iter().cloned());
        config.filter.strict_names.extend(self.strict_names.iter().cloned());
        config.filter.exclude_names.extend(self.exclude_names.iter().cloned());

        if self.separate_process {
            config.run.separate_process = true;
        }
        if self.reverse {
            config.run.reverse = true;
        }
        if let Some(seed) = self.shuffle {
            config.run.shuffle = true;
            if seed.is_some() {
                config.run.shuffle_seed = seed;
            }
        }
        if self.run_ignored {
            config.run.run_ignored = true;
        }
        if self.crash_on_fail {
            config.run.crash_on_fail = true;
        }
        if self.rethrow {
            config.run.rethrow_panics = true;
        }
        if self.memory_report {
            config.memory.accountant = true;
        }
        if self.no_leak_detection {
            config.memory.detect_leaks = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_filters_and_shuffle() {
        let cli = Cli::parse_from(["gauntlet", "-g", "Mock", "--strict-name", "init", "-s", "42", "-r", "3"]);
        assert_eq!(cli.groups, vec!["Mock"]);
        assert_eq!(cli.strict_names, vec!["init"]);
        assert_eq!(cli.shuffle, Some(Some(42)));
        assert_eq!(cli.repeat, Some(3));
    }

    #[test]
    fn test_shuffle_without_seed() {
        let cli = Cli::parse_from(["gauntlet", "--shuffle"]);
        let mut config = Config::default();
        cli.apply_to(&mut config);
        assert!(config.run.shuffle);
        assert_eq!(config.run.shuffle_seed, None);
    }

    #[test]
    fn test_shuffle_with_zero_seed_is_reproducible() {
        let cli = Cli::parse_from(["gauntlet", "-s", "0"]);
        assert_eq!(cli.shuffle, Some(Some(0)));
        let mut config = Config::default();
        cli.apply_to(&mut config);
        assert!(config.run.shuffle);
        assert_eq!(config.run.shuffle_seed, Some(0));
    }

    #[test]
    fn test_flags_override_config() {
        let cli = Cli::parse_from(["gauntlet", "-vv", "-o", "json", "-p", "--no-leak-detection"]);
        let mut config = Config::default();
        cli.apply_to(&mut config);
        assert_eq!(cli.verbose, 2);
        assert!(config.output.verbose);
        assert_eq!(config.output.format, OutputFormat::Json);
        assert!(config.run.separate_process);
        assert!(!config.memory.detect_leaks);
    }

    #[test]
    fn test_list_mode() {
        let cli = Cli::parse_from(["gauntlet", "--list-locations"]);
        assert_eq!(cli.list_mode(), Some(ListMode::Locations));
    }
}
