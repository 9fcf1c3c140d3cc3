use std::io::Write;

use gauntlet_core::config::{DEFAULT_DETECT_LEAKS, DEFAULT_DOTS_PER_LINE, DEFAULT_REPEAT};
use gauntlet_core::{Config, ConfigError, OutputFormat};

fn write_config(content: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

#[test]
fn test_default_config() {
    let config = Config::default();
    assert_eq!(config.run.repeat, DEFAULT_REPEAT);
    assert!(!config.run.shuffle);
    assert_eq!(config.output.format, OutputFormat::Console);
    assert_eq!(config.output.dots_per_line, DEFAULT_DOTS_PER_LINE);
    assert_eq!(config.memory.detect_leaks, DEFAULT_DETECT_LEAKS);
}

#[test]
fn test_default_config_string_parses_back() {
    let text = Config::default_config_string();
    assert!(text.contains("[run]"));
    assert!(text.contains("[filter]"));
    assert!(text.contains("[output]"));
    assert!(text.contains("[memory]"));

    let parsed: Config = toml::from_str(&text).unwrap();
    assert_eq!(parsed.run.repeat, DEFAULT_REPEAT);
}

#[test]
fn test_from_file_with_partial_sections() {
    let file = write_config(
        r#"
[run]
reverse = true
shuffle_seed = 17

[filter]
groups = ["Mock"]
exclude_names = ["slow"]

[output]
format = "json"
"#,
    );
    let config = Config::from_file(file.path()).unwrap();
    assert!(config.run.reverse);
    assert_eq!(config.run.shuffle_seed, Some(17));
    assert_eq!(config.run.repeat, DEFAULT_REPEAT);
    assert_eq!(config.output.format, OutputFormat::Json);

    let groups = config.filter.group_filters();
    assert_eq!(groups.len(), 1);
    assert!(groups[0].matches("MockSupport"));

    let names = config.filter.name_filters();
    assert!(names[0].is_inverted());
    assert!(!names[0].matches("slow_test"));
}

#[test]
fn test_from_file_rejects_zero_cache_size() {
    let file = write_config("[memory]\ncache_sizes = [16, 0]\n");
    assert!(matches!(Config::from_file(file.path()), Err(ConfigError::Invalid(_))));
}

#[test]
fn test_from_file_reports_parse_errors() {
    let file = write_config("[run]\nrepeat = \"many\"\n");
    assert!(matches!(Config::from_file(file.path()), Err(ConfigError::ParseError(_))));
}

#[test]
fn test_missing_file_is_read_error() {
    let dir = tempfile::tempdir().unwrap();
    let result = Config::from_file(dir.path().join("absent.toml"));
    assert!(matches!(result, Err(ConfigError::ReadError(_))));
}
