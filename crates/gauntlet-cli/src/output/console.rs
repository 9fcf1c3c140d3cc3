//! Human-readable progress and summary on stdout.

use std::io::{self, Write};
use std::time::Duration;

use crossterm::style::Stylize;
use gauntlet_core::{RunSummary, TestFailure, TestIdentity, TestOutput, TestRecord};

/// Dots while running, failures as they happen, a summary at the end.
///
/// In verbose mode every test gets its own line with its duration.
pub struct ConsoleOutput<W: Write> {
    out: W,
    verbose: bool,
    color: bool,
    dots_per_line: usize,
    dots: usize,
}

impl ConsoleOutput<io::Stdout> {
    pub fn stdout(verbose: bool, color: bool, dots_per_line: usize) -> Self {
        Self::new(io::stdout(), verbose, color, dots_per_line)
    }
}

impl<W: Write> ConsoleOutput<W> {
    pub fn new(out: W, verbose: bool, color: bool, dots_per_line: usize) -> Self {
        Self {
            out,
            verbose,
            color,
            dots_per_line: dots_per_line.max(1),
            dots: 0,
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn write(&mut self, text: &str) {
        let _ = self.out.write_all(text.as_bytes());
        let _ = self.out.flush();
    }

    fn progress(&mut self, mark: &str) {
        self.write(mark);
        self.dots += 1;
        if self.dots % self.dots_per_line == 0 {
            self.write("\n");
        }
    }
}

impl<W: Write> TestOutput for ConsoleOutput<W> {
    fn tests_ended(&mut self, summary: &RunSummary) {
        let line = summary.to_string();
        let line = match (self.color, summary.is_failure()) {
            (false, _) => line,
            (true, false) => line.green().to_string(),
            (true, true) => line.red().to_string(),
        };
        let empty = if summary.ran + summary.ignored == 0 {
            "\nNote: test run failed because no tests were run or ignored. Assuming something went wrong. This often happens because of linking errors or typos in test filter."
        } else {
            ""
        };
        self.write(&format!("\n\n{line}{empty}\n\n"));
    }

    fn test_started(&mut self, test: &TestIdentity) {
        if self.verbose {
            self.write(&test.to_string());
        }
    }

    fn test_ended(&mut self, _test: &TestIdentity, record: &TestRecord) {
        if self.verbose {
            self.write(&format!(" - {} ms\n", record.elapsed.as_millis()));
        } else {
            self.progress(if record.ignored { "!" } else { "." });
        }
    }

    fn group_ended(&mut self, _group: &str, _elapsed: Duration) {}

    fn failure(&mut self, failure: &TestFailure) {
        self.write(&format!("\n{failure}\n\n"));
    }

    fn print(&mut self, text: &str) {
        self.write(text);
    }

    fn test_run_started(&mut self, number: usize, total: usize) {
        if total > 1 {
            self.write(&format!("Test run {number} of {total}\n"));
        }
    }
}
