//! Machine-readable report, one JSON document per run.

use std::io::{self, Write};

use gauntlet_core::{RunSummary, TestFailure, TestIdentity, TestOutput, TestRecord};
use serde::Serialize;
use tracing::warn;

#[derive(Debug, Clone, Serialize)]
struct TestEntry {
    group: String,
    name: String,
    file: String,
    line: u32,
    ignored: bool,
    failed: bool,
    elapsed_ms: u64,
}

#[derive(Debug, Serialize)]
struct Report<'a> {
    run: Option<usize>,
    summary: &'a RunSummary,
    tests: &'a [TestEntry],
    failures: &'a [TestFailure],
}

/// Collects tests and failures, then writes them with the summary.
pub struct JsonOutput<W: Write> {
    out: W,
    run: Option<usize>,
    tests: Vec<TestEntry>,
    failures: Vec<TestFailure>,
    printed: String,
}

impl JsonOutput<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write> JsonOutput<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            run: None,
            tests: Vec::new(),
            failures: Vec::new(),
            printed: String::new(),
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    /// Text tests printed while running. Kept out of the JSON stream.
    pub fn printed(&self) -> &str {
        &self.printed
    }
}

impl<W: Write> TestOutput for JsonOutput<W> {
    fn tests_ended(&mut self, summary: &RunSummary) {
        let report = Report {
            run: self.run,
            summary,
            tests: &self.tests,
            failures: &self.failures,
        };
        if let Err(err) = serde_json::to_writer_pretty(&mut self.out, &report) {
            warn!(error = %err, "failed to write JSON report");
            return;
        }
        let _ = self.out.write_all(b"\n");
        let _ = self.out.flush();
    }

    fn test_ended(&mut self, test: &TestIdentity, record: &TestRecord) {
        self.tests.push(TestEntry {
            group: test.group.clone(),
            name: test.name.clone(),
            file: test.file.clone(),
            line: test.line,
            ignored: record.ignored,
            failed: record.failed,
            elapsed_ms: record.elapsed.as_millis() as u64,
        });
    }

    fn failure(&mut self, failure: &TestFailure) {
        self.failures.push(failure.clone());
    }

    fn print(&mut self, text: &str) {
        self.printed.push_str(text);
    }

    fn test_run_started(&mut self, number: usize, _total: usize) {
        self.run = Some(number);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::time::Duration;

    #[test]
    fn test_report_shape() {
        let mut output = JsonOutput::new(Vec::new());
        let test = TestIdentity::new("Group", "name", "file.rs", 7);
        output.test_ended(
            &test,
            &TestRecord {
                ignored: false,
                failed: true,
                elapsed: Duration::from_millis(2),
            },
        );
        output.failure(&TestFailure::fail(&test, "file.rs", 8, "boom"));
        output.tests_ended(&RunSummary {
            tests: 1,
            ran: 1,
            checks: 0,
            ignored: 0,
            failures: 1,
            elapsed_ms: 2,
            started_at: Utc::now(),
        });

        let text = String::from_utf8(output.into_inner()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["summary"]["failures"], 1);
        assert_eq!(value["tests"][0]["name"], "name");
        assert_eq!(value["tests"][0]["failed"], true);
        assert_eq!(value["failures"][0]["line"], 8);
        assert!(value["run"].is_null());
    }
}
