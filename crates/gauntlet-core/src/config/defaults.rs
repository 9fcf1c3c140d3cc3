//! Default values for Gauntlet configuration.
//!
//! All hardcoded defaults are centralized here for easy maintenance.

// ============================================================================
// File Locations
// ============================================================================

/// Project-local configuration file.
pub const CONFIG_FILE_NAME: &str = "gauntlet.toml";

/// Directory under the user config dir that holds `config.toml`.
pub const USER_CONFIG_DIR: &str = "gauntlet";

/// User configuration file name.
pub const USER_CONFIG_FILE: &str = "config.toml";

// ============================================================================
// Run Defaults
// ============================================================================

/// How many times the selected tests are run.
pub const DEFAULT_REPEAT: usize = 1;

/// Run tests marked ignored.
pub const DEFAULT_RUN_IGNORED: bool = false;

/// Run each test in a forked child process.
pub const DEFAULT_SEPARATE_PROCESS: bool = false;

// ============================================================================
// Output Defaults
// ============================================================================

/// Print one line per test instead of progress dots.
pub const DEFAULT_VERBOSE: bool = false;

/// Colorize the summary line.
pub const DEFAULT_COLOR: bool = false;

/// Progress dots per line before wrapping.
pub const DEFAULT_DOTS_PER_LINE: usize = 50;

// ============================================================================
// Memory Defaults
// ============================================================================

/// Install the leak-detection plugin.
pub const DEFAULT_DETECT_LEAKS: bool = true;

// ============================================================================
// Mock Defaults
// ============================================================================

/// Tolerance used for double parameters when none is given.
pub const DEFAULT_DOUBLE_TOLERANCE: f64 = 0.005;

// ============================================================================
// Logging Defaults
// ============================================================================

/// Environment variable holding the log filter directive.
pub const LOG_ENV_VAR: &str = "GAUNTLET_LOG";

/// Filter used when [`LOG_ENV_VAR`] is unset.
pub const DEFAULT_LOG_FILTER: &str = "warn";
