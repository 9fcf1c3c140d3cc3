//! Observers of a test run.
//!
//! A [`TestOutput`] receives every lifecycle event the [`TestResult`] sees.
//! Formatting for terminals or files lives with the binary; this module
//! only carries the trait and two in-memory implementations.
//!
//! [`TestResult`]: crate::TestResult

use std::cell::RefCell;
use std::fmt::Write;
use std::rc::Rc;
use std::time::Duration;

use crate::failure::TestFailure;
use crate::result::{RunSummary, TestRecord};
use crate::shell::TestIdentity;

/// Receives run events. Every method defaults to doing nothing.
pub trait TestOutput {
    /// Called once before the first test of a repetition.
    fn tests_started(&mut self) {}

    /// Called once after the last test of a repetition.
    fn tests_ended(&mut self, _summary: &RunSummary) {}

    fn group_started(&mut self, _group: &str) {}

    fn group_ended(&mut self, _group: &str, _elapsed: Duration) {}

    fn test_started(&mut self, _test: &TestIdentity) {}

    fn test_ended(&mut self, _test: &TestIdentity, _record: &TestRecord) {}

    fn failure(&mut self, _failure: &TestFailure) {}

    /// Free-form text printed by tests or plugins.
    fn print(&mut self, _text: &str) {}

    /// Announces repetition `number` (1-based) of `total`.
    fn test_run_started(&mut self, _number: usize, _total: usize) {}
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullOutput;

impl TestOutput for NullOutput {}

/// Writes a compact transcript into a shared buffer.
///
/// Clones share the same buffer, so a test can keep one handle and give the
/// other to a [`TestResult`](crate::TestResult).
#[derive(Debug, Default, Clone)]
pub struct StringBufferOutput {
    buffer: Rc<RefCell<String>>,
    events: Rc<RefCell<Vec<String>>>,
}

impl StringBufferOutput {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything written so far.
    pub fn contents(&self) -> String {
        self.buffer.borrow().clone()
    }

    /// The sequence of events seen, one short tag per event.
    pub fn events(&self) -> Vec<String> {
        self.events.borrow().clone()
    }

    pub fn clear(&self) {
        self.buffer.borrow_mut().clear();
        self.events.borrow_mut().clear();
    }

    fn event(&self, tag: String) {
        self.events.borrow_mut().push(tag);
    }
}

impl TestOutput for StringBufferOutput {
    fn tests_started(&mut self) {
        self.event("tests_started".to_string());
    }

    fn tests_ended(&mut self, summary: &RunSummary) {
        self.event("tests_ended".to_string());
        let _ = write!(self.buffer.borrow_mut(), "\n{summary}\n");
    }

    fn group_started(&mut self, group: &str) {
        self.event(format!("group_started:{group}"));
    }

    fn group_ended(&mut self, group: &str, _elapsed: Duration) {
        self.event(format!("group_ended:{group}"));
    }

    fn test_started(&mut self, test: &TestIdentity) {
        self.event(format!("test_started:{test}"));
    }

    fn test_ended(&mut self, test: &TestIdentity, record: &TestRecord) {
        self.event(format!("test_ended:{test}"));
        self.buffer
            .borrow_mut()
            .push_str(if record.ignored { "!" } else { "." });
    }

    fn failure(&mut self, failure: &TestFailure) {
        self.event(format!("failure:{}", failure.test()));
        let _ = write!(self.buffer.borrow_mut(), "\n{failure}\n\n");
    }

    fn print(&mut self, text: &str) {
        self.buffer.borrow_mut().push_str(text);
    }

    fn test_run_started(&mut self, number: usize, total: usize) {
        self.event(format!("test_run_started:{number}/{total}"));
    }
}
