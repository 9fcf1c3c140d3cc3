//! Configuration management for Gauntlet.
//!
//! Configuration is loaded from multiple sources with the following priority:
//! 1. Environment variables (highest priority)
//! 2. Project-local `gauntlet.toml` file
//! 3. User config `~/.config/gauntlet/config.toml`
//! 4. Built-in defaults (lowest priority)
//!
//! Command line flags are applied on top of the loaded configuration by the
//! runner.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

use crate::filter::TestFilter;

mod defaults;

pub use defaults::*;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// How tests are run.
    pub run: RunConfig,

    /// Which tests are selected.
    pub filter: FilterConfig,

    /// How results are reported.
    pub output: OutputConfig,

    /// Allocation tracking.
    pub memory: MemoryConfig,
}

impl Config {
    /// Load configuration from default locations.
    ///
    /// Searches for config in order:
    /// 1. `./gauntlet.toml` (project local)
    /// 2. `~/.config/gauntlet/config.toml` (user config)
    /// 3. Falls back to defaults
    pub fn load() -> Result<Self, ConfigError> {
        if Path::new(CONFIG_FILE_NAME).exists() {
            return Self::from_file(CONFIG_FILE_NAME);
        }

        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join(USER_CONFIG_DIR).join(USER_CONFIG_FILE);
            if user_config.exists() {
                return Self::from_file(&user_config);
            }
        }

        let mut config = Self::default();
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load configuration from a specific file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&content)?;

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Check values that parse but make no sense.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.run.repeat == 0 {
            return Err(ConfigError::Invalid("run.repeat must be at least 1".to_string()));
        }
        if self.memory.cache_sizes.contains(&0) {
            return Err(ConfigError::Invalid(
                "memory.cache_sizes must not contain 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Apply environment variable overrides.
    fn apply_env_overrides(&mut self) {
        // Run overrides
        if let Ok(repeat) = std::env::var("GAUNTLET_REPEAT") {
            if let Ok(n) = repeat.parse() {
                self.run.repeat = n;
            }
        }
        if let Ok(seed) = std::env::var("GAUNTLET_SHUFFLE_SEED") {
            if let Ok(n) = seed.parse() {
                self.run.shuffle = true;
                self.run.shuffle_seed = Some(n);
            }
        }
        if let Some(flag) = env_flag("GAUNTLET_RUN_IGNORED") {
            self.run.run_ignored = flag;
        }
        if let Some(flag) = env_flag("GAUNTLET_SEPARATE_PROCESS") {
            self.run.separate_process = flag;
        }

        // Output overrides
        if let Ok(format) = std::env::var("GAUNTLET_OUTPUT") {
            match format.as_str() {
                "console" => self.output.format = OutputFormat::Console,
                "json" => self.output.format = OutputFormat::Json,
                _ => {}
            }
        }
        if let Some(flag) = env_flag("GAUNTLET_VERBOSE") {
            self.output.verbose = flag;
        }
        if let Some(flag) = env_flag("GAUNTLET_COLOR") {
            self.output.color = flag;
        }

        // Memory overrides
        if let Some(flag) = env_flag("GAUNTLET_DETECT_LEAKS") {
            self.memory.detect_leaks = flag;
        }
    }

    /// Create a default config file content as a string.
    pub fn default_config_string() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

fn env_flag(name: &str) -> Option<bool> {
    match std::env::var(name).ok()?.as_str() {
        "1" | "true" | "yes" => Some(true),
        "0" | "false" | "no" => Some(false),
        _ => None,
    }
}

/// How tests are run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Number of repetitions of the whole selection.
    pub repeat: usize,

    /// Shuffle test order before each repetition.
    pub shuffle: bool,

    /// Seed for shuffling. A random seed is drawn when unset.
    pub shuffle_seed: Option<u64>,

    /// Run tests in reverse registration order.
    pub reverse: bool,

    /// Run tests declared as ignored.
    pub run_ignored: bool,

    /// Fork a child process for each test (unix only).
    pub separate_process: bool,

    /// Call the crash hook on the first failure.
    pub crash_on_fail: bool,

    /// Re-raise panics after recording them instead of continuing.
    pub rethrow_panics: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            repeat: DEFAULT_REPEAT,
            shuffle: false,
            shuffle_seed: None,
            reverse: false,
            run_ignored: DEFAULT_RUN_IGNORED,
            separate_process: DEFAULT_SEPARATE_PROCESS,
            crash_on_fail: false,
            rethrow_panics: false,
        }
    }
}

/// Test selection.
///
/// Each list entry becomes one [`TestFilter`]. A test is selected when any
/// group filter and any name filter accept it; empty lists accept everything.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Substring group filters.
    pub groups: Vec<String>,

    /// Exact group filters.
    pub strict_groups: Vec<String>,

    /// Inverted group filters: groups containing these are skipped.
    pub exclude_groups: Vec<String>,

    /// Substring name filters.
    pub names: Vec<String>,

    /// Exact name filters.
    pub strict_names: Vec<String>,

    /// Inverted name filters.
    pub exclude_names: Vec<String>,
}

impl FilterConfig {
    /// Build the group filters described by this section.
    pub fn group_filters(&self) -> Vec<TestFilter> {
        build_filters(&self.groups, &self.strict_groups, &self.exclude_groups)
    }

    /// Build the name filters described by this section.
    pub fn name_filters(&self) -> Vec<TestFilter> {
        build_filters(&self.names, &self.strict_names, &self.exclude_names)
    }
}

fn build_filters(plain: &[String], strict: &[String], excluded: &[String]) -> Vec<TestFilter> {
    plain
        .iter()
        .map(TestFilter::new)
        .chain(strict.iter().map(|p| TestFilter::new(p).strict()))
        .chain(excluded.iter().map(|p| TestFilter::new(p).invert()))
        .collect()
}

/// Result reporting format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Console,
    Json,
}

/// How results are reported.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Output format.
    pub format: OutputFormat,

    /// Print each test name and timing.
    pub verbose: bool,

    /// Colorize the summary.
    pub color: bool,

    /// Progress dots per line.
    pub dots_per_line: usize,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            format: OutputFormat::default(),
            verbose: DEFAULT_VERBOSE,
            color: DEFAULT_COLOR,
            dots_per_line: DEFAULT_DOTS_PER_LINE,
        }
    }
}

/// Allocation tracking configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// Install the leak-detection plugin.
    pub detect_leaks: bool,

    /// Account every allocation made during the run and print a report.
    pub accountant: bool,

    /// Bucket sizes for the accountant report. Exact sizes when empty.
    pub cache_sizes: Vec<usize>,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            detect_leaks: DEFAULT_DETECT_LEAKS,
            accountant: false,
            cache_sizes: Vec::new(),
        }
    }
}
