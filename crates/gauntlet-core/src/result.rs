//! Counters and failures accumulated over one run.

use std::fmt;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::failure::TestFailure;
use crate::output::TestOutput;
use crate::shell::TestIdentity;

/// Per-test information handed to [`TestOutput::test_ended`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TestRecord {
    /// The test was skipped because it is ignored.
    pub ignored: bool,
    /// At least one failure was recorded while the test ran.
    pub failed: bool,
    pub elapsed: Duration,
}

/// Snapshot of the counters at the end of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub tests: usize,
    pub ran: usize,
    pub checks: usize,
    pub ignored: usize,
    pub failures: usize,
    pub elapsed_ms: u64,
    pub started_at: DateTime<Utc>,
}

impl RunSummary {
    /// A run fails when anything failed or nothing ran at all.
    pub fn is_failure(&self) -> bool {
        self.failures > 0 || self.ran + self.ignored == 0
    }

    /// The counters without the leading `OK`/`Errors` word.
    pub fn counts(&self) -> String {
        let mut counts = String::new();
        if self.failures > 0 {
            counts.push_str(&format!("{} failures, ", self.failures));
        }
        counts.push_str(&format!(
            "{} tests, {} ran, {} checks, {} ignored, {} ms",
            self.tests, self.ran, self.checks, self.ignored, self.elapsed_ms
        ));
        counts
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let word = if self.is_failure() { "Errors" } else { "OK" };
        write!(f, "{} ({})", word, self.counts())
    }
}

/// Accumulates what happens during a run and forwards it to an output.
pub struct TestResult {
    output: Box<dyn TestOutput>,
    test_count: usize,
    run_count: usize,
    check_count: usize,
    failure_count: usize,
    ignored_count: usize,
    failures: Vec<TestFailure>,
    failures_at_test_start: usize,
    current_group: Option<String>,
    current_test: Option<TestIdentity>,
    started_at: DateTime<Utc>,
    run_start: Instant,
    group_start: Instant,
    test_start: Instant,
    total_elapsed: Duration,
}

impl TestResult {
    pub fn new(output: impl TestOutput + 'static) -> Self {
        Self::with_output(Box::new(output))
    }

    pub fn with_output(output: Box<dyn TestOutput>) -> Self {
        let now = Instant::now();
        Self {
            output,
            test_count: 0,
            run_count: 0,
            check_count: 0,
            failure_count: 0,
            ignored_count: 0,
            failures: Vec::new(),
            failures_at_test_start: 0,
            current_group: None,
            current_test: None,
            started_at: Utc::now(),
            run_start: now,
            group_start: now,
            test_start: now,
            total_elapsed: Duration::ZERO,
        }
    }

    /// Give back the output, e.g. to flush or inspect it.
    pub fn into_output(self) -> Box<dyn TestOutput> {
        self.output
    }

    pub fn output_mut(&mut self) -> &mut dyn TestOutput {
        self.output.as_mut()
    }

    pub fn tests_started(&mut self) {
        self.started_at = Utc::now();
        self.run_start = Instant::now();
        self.output.tests_started();
    }

    pub fn tests_ended(&mut self) {
        self.total_elapsed = self.run_start.elapsed();
        let summary = self.summary();
        self.output.tests_ended(&summary);
    }

    pub fn current_group_started(&mut self, group: &str) {
        self.current_group = Some(group.to_string());
        self.group_start = Instant::now();
        self.output.group_started(group);
    }

    pub fn current_group_ended(&mut self, group: &str) {
        let elapsed = self.group_start.elapsed();
        self.output.group_ended(group, elapsed);
        self.current_group = None;
    }

    pub fn current_test_started(&mut self, test: &TestIdentity) {
        self.current_test = Some(test.clone());
        self.failures_at_test_start = self.failure_count;
        self.test_start = Instant::now();
        self.output.test_started(test);
    }

    pub fn current_test_ended(&mut self, test: &TestIdentity, ignored: bool) {
        let record = TestRecord {
            ignored,
            failed: self.current_test_failed(),
            elapsed: self.test_start.elapsed(),
        };
        self.output.test_ended(test, &record);
        self.current_test = None;
    }

    pub fn add_failure(&mut self, failure: TestFailure) {
        self.output.failure(&failure);
        self.failure_count += 1;
        self.failures.push(failure);
    }

    pub fn print(&mut self, text: &str) {
        self.output.print(text);
    }

    pub fn test_run_started(&mut self, number: usize, total: usize) {
        self.output.test_run_started(number, total);
    }

    pub fn count_test(&mut self) {
        self.test_count += 1;
    }

    pub fn count_run(&mut self) {
        self.run_count += 1;
    }

    pub fn count_check(&mut self) {
        self.check_count += 1;
    }

    pub fn count_ignored(&mut self) {
        self.ignored_count += 1;
    }

    pub fn test_count(&self) -> usize {
        self.test_count
    }

    pub fn run_count(&self) -> usize {
        self.run_count
    }

    pub fn check_count(&self) -> usize {
        self.check_count
    }

    pub fn failure_count(&self) -> usize {
        self.failure_count
    }

    pub fn ignored_count(&self) -> usize {
        self.ignored_count
    }

    pub fn failures(&self) -> &[TestFailure] {
        &self.failures
    }

    pub fn current_group(&self) -> Option<&str> {
        self.current_group.as_deref()
    }

    pub fn current_test(&self) -> Option<&TestIdentity> {
        self.current_test.as_ref()
    }

    /// True once the running test has recorded any failure.
    pub fn current_test_failed(&self) -> bool {
        self.failure_count > self.failures_at_test_start
    }

    /// True when anything failed or nothing ran.
    pub fn is_failure(&self) -> bool {
        self.failure_count > 0 || self.run_count + self.ignored_count == 0
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn total_elapsed(&self) -> Duration {
        self.total_elapsed
    }

    pub fn summary(&self) -> RunSummary {
        RunSummary {
            tests: self.test_count,
            ran: self.run_count,
            checks: self.check_count,
            ignored: self.ignored_count,
            failures: self.failure_count,
            elapsed_ms: self.total_elapsed.as_millis() as u64,
            started_at: self.started_at,
        }
    }
}

impl fmt::Debug for TestResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestResult")
            .field("tests", &self.test_count)
            .field("ran", &self.run_count)
            .field("checks", &self.check_count)
            .field("ignored", &self.ignored_count)
            .field("failures", &self.failure_count)
            .finish()
    }
}
