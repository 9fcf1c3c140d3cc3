//! Group and name filters used to select tests.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A single filter on a group or test name.
///
/// By default a filter matches any name containing the pattern. A strict
/// filter requires the whole name to equal the pattern, and an inverted
/// filter negates the result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestFilter {
    pattern: String,
    strict: bool,
    inverted: bool,
}

impl TestFilter {
    pub fn new(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            strict: false,
            inverted: false,
        }
    }

    /// Require an exact match.
    pub fn strict(mut self) -> Self {
        self.strict = true;
        self
    }

    /// Negate the match.
    pub fn invert(mut self) -> Self {
        self.inverted = true;
        self
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn is_strict(&self) -> bool {
        self.strict
    }

    pub fn is_inverted(&self) -> bool {
        self.inverted
    }

    pub fn matches(&self, name: &str) -> bool {
        let hit = if self.strict {
            name == self.pattern
        } else {
            name.contains(&self.pattern)
        };
        hit != self.inverted
    }
}

impl fmt::Display for TestFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TestFilter: \"{}\"", self.pattern)?;
        match (self.strict, self.inverted) {
            (true, true) => write!(f, " with strict, invert matching"),
            (true, false) => write!(f, " with strict matching"),
            (false, true) => write!(f, " with invert matching"),
            (false, false) => Ok(()),
        }
    }
}

/// True when `filters` is empty or any filter accepts `name`.
pub fn matches_any(filters: &[TestFilter], name: &str) -> bool {
    filters.is_empty() || filters.iter().any(|filter| filter.matches(name))
}
