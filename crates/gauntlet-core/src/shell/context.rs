//! The handle a running test uses to make assertions.

use std::fmt;
use std::panic::{self, Location};

use tracing::trace;

use crate::failure::{doubles_equal, TestFailure};
use crate::memory::{self, AllocationKind, MemoryBlock};
use crate::plugin::set_pointer::{self, Overridable};
use crate::result::TestResult;
use crate::shell::containment::{self, Abort, FrameGuard, Outcome, PhaseEnd};
use crate::shell::TestIdentity;

/// Passed to every test phase.
///
/// Each assertion counts one check. A failed assertion records a
/// [`TestFailure`] and returns `Err(Abort::Failed)`, so `?` ends the phase.
pub struct TestContext<'a> {
    identity: &'a TestIdentity,
    result: &'a mut TestResult,
}

impl<'a> TestContext<'a> {
    pub(crate) fn new(identity: &'a TestIdentity, result: &'a mut TestResult) -> Self {
        Self { identity, result }
    }

    pub fn identity(&self) -> &TestIdentity {
        self.identity
    }

    /// True once this test has recorded a failure.
    pub fn has_failed(&self) -> bool {
        self.result.current_test_failed()
    }

    /// Write text to the run's output.
    pub fn print(&mut self, text: &str) {
        self.result.print(text);
    }

    /// Direct access to the result, for tests that drive nested runs.
    pub fn result(&mut self) -> &mut TestResult {
        self.result
    }

    /// Run one phase, containing aborts and panics. Returns whether the phase
    /// completed without stopping early.
    pub(crate) fn run_phase<F>(&mut self, frame: &FrameGuard, phase: F) -> bool
    where
        F: FnOnce(&mut TestContext<'a>) -> Outcome,
    {
        frame.begin_phase();
        let end = containment::run_protected(|| phase(self));

        for failure in frame.take_pending() {
            self.result.add_failure(failure);
        }

        match end {
            PhaseEnd::Completed => true,
            PhaseEnd::Abandoned(abort) => {
                trace!(test = %self.identity, ?abort, "phase stopped early");
                false
            }
            PhaseEnd::Panicked(payload) => {
                let (file, line) = containment::take_panic_location()
                    .unwrap_or_else(|| (self.identity.file.clone(), self.identity.line));
                let message = containment::panic_message(payload.as_ref());
                self.result.add_failure(TestFailure::unexpected_panic(
                    self.identity,
                    &file,
                    line,
                    message.as_deref(),
                ));
                containment::on_failure();
                if containment::rethrow_panics() {
                    panic::resume_unwind(payload);
                }
                false
            }
        }
    }

    fn count_check(&mut self) -> Outcome {
        if containment::abandon_requested() {
            return Err(Abort::Failed);
        }
        self.result.count_check();
        Ok(())
    }

    fn record(&mut self, failure: TestFailure) -> Abort {
        self.result.add_failure(failure);
        containment::on_failure();
        Abort::Failed
    }

    fn fail_with(&mut self, failure: TestFailure) -> Outcome {
        Err(self.record(failure))
    }

    #[track_caller]
    pub fn check(&mut self, condition: bool, condition_text: &str) -> Outcome {
        self.assert_true(condition, "CHECK", condition_text, None)
    }

    #[track_caller]
    pub fn check_text(&mut self, condition: bool, condition_text: &str, text: &str) -> Outcome {
        self.assert_true(condition, "CHECK", condition_text, Some(text))
    }

    #[track_caller]
    pub fn check_false(&mut self, condition: bool, condition_text: &str) -> Outcome {
        self.assert_true(!condition, "CHECK_FALSE", condition_text, None)
    }

    #[track_caller]
    fn assert_true(
        &mut self,
        condition: bool,
        check_name: &str,
        condition_text: &str,
        text: Option<&str>,
    ) -> Outcome {
        self.count_check()?;
        if condition {
            return Ok(());
        }
        let location = Location::caller();
        self.fail_with(TestFailure::check(
            self.identity,
            location.file(),
            location.line(),
            check_name,
            condition_text,
            text,
        ))
    }

    /// Equality of any two debuggable values.
    #[track_caller]
    pub fn check_equal<T>(&mut self, expected: &T, actual: &T) -> Outcome
    where
        T: PartialEq + fmt::Debug + ?Sized,
    {
        self.count_check()?;
        if expected == actual {
            return Ok(());
        }
        let location = Location::caller();
        self.fail_with(TestFailure::check_equal(
            self.identity,
            location.file(),
            location.line(),
            &format!("{expected:?}"),
            &format!("{actual:?}"),
            None,
        ))
    }

    #[track_caller]
    pub fn strcmp_equal(&mut self, expected: &str, actual: &str) -> Outcome {
        self.count_check()?;
        if expected == actual {
            return Ok(());
        }
        let location = Location::caller();
        self.fail_with(TestFailure::string_equal(
            self.identity,
            location.file(),
            location.line(),
            expected,
            actual,
            None,
        ))
    }

    #[track_caller]
    pub fn strcmp_nocase_equal(&mut self, expected: &str, actual: &str) -> Outcome {
        self.count_check()?;
        if expected.to_lowercase() == actual.to_lowercase() {
            return Ok(());
        }
        let location = Location::caller();
        self.fail_with(TestFailure::string_equal_no_case(
            self.identity,
            location.file(),
            location.line(),
            expected,
            actual,
            None,
        ))
    }

    #[track_caller]
    pub fn strcmp_contains(&mut self, expected: &str, actual: &str) -> Outcome {
        self.count_check()?;
        if actual.contains(expected) {
            return Ok(());
        }
        let location = Location::caller();
        self.fail_with(TestFailure::contains(
            self.identity,
            location.file(),
            location.line(),
            expected,
            actual,
            None,
        ))
    }

    #[track_caller]
    pub fn longs_equal(&mut self, expected: i64, actual: i64) -> Outcome {
        self.count_check()?;
        if expected == actual {
            return Ok(());
        }
        let location = Location::caller();
        self.fail_with(TestFailure::longs_equal(
            self.identity,
            location.file(),
            location.line(),
            expected,
            actual,
            None,
        ))
    }

    #[track_caller]
    pub fn unsigned_longs_equal(&mut self, expected: u64, actual: u64) -> Outcome {
        self.count_check()?;
        if expected == actual {
            return Ok(());
        }
        let location = Location::caller();
        self.fail_with(TestFailure::unsigned_longs_equal(
            self.identity,
            location.file(),
            location.line(),
            expected,
            actual,
            None,
        ))
    }

    #[track_caller]
    pub fn doubles_equal(&mut self, expected: f64, actual: f64, threshold: f64) -> Outcome {
        self.count_check()?;
        if doubles_equal(expected, actual, threshold) {
            return Ok(());
        }
        let location = Location::caller();
        self.fail_with(TestFailure::doubles_equal(
            self.identity,
            location.file(),
            location.line(),
            expected,
            actual,
            threshold,
            None,
        ))
    }

    #[track_caller]
    pub fn pointers_equal<T: ?Sized>(&mut self, expected: *const T, actual: *const T) -> Outcome {
        self.count_check()?;
        let expected = expected.cast::<()>() as usize;
        let actual = actual.cast::<()>() as usize;
        if expected == actual {
            return Ok(());
        }
        let location = Location::caller();
        self.fail_with(TestFailure::equals(
            self.identity,
            location.file(),
            location.line(),
            &format!("0x{expected:x}"),
            &format!("0x{actual:x}"),
            None,
        ))
    }

    #[track_caller]
    pub fn memcmp_equal(&mut self, expected: &[u8], actual: &[u8]) -> Outcome {
        self.count_check()?;
        if expected == actual {
            return Ok(());
        }
        let location = Location::caller();
        self.fail_with(TestFailure::binary_equal(
            self.identity,
            location.file(),
            location.line(),
            expected,
            actual,
            None,
        ))
    }

    /// Compare only the bits selected by `mask` over `byte_count` bytes.
    #[track_caller]
    pub fn bits_equal(&mut self, expected: u64, actual: u64, mask: u64, byte_count: usize) -> Outcome {
        self.count_check()?;
        if expected & mask == actual & mask {
            return Ok(());
        }
        let location = Location::caller();
        self.fail_with(TestFailure::bits_equal(
            self.identity,
            location.file(),
            location.line(),
            expected,
            actual,
            mask,
            byte_count,
            None,
        ))
    }

    /// Fail unconditionally.
    #[track_caller]
    pub fn fail(&mut self, text: &str) -> Outcome {
        self.count_check()?;
        let location = Location::caller();
        self.fail_with(TestFailure::fail(
            self.identity,
            location.file(),
            location.line(),
            text,
        ))
    }

    /// Stop the test here without failing it.
    pub fn exit_test(&self) -> Outcome {
        Err(Abort::Exit)
    }

    /// Replace the value in `slot` until the end of this test.
    #[track_caller]
    pub fn set_pointer<T: Copy + 'static>(
        &mut self,
        slot: &'static Overridable<T>,
        value: T,
    ) -> Outcome {
        match set_pointer::override_value(slot, value) {
            Ok(()) => Ok(()),
            Err(err) => {
                let location = Location::caller();
                self.fail_with(TestFailure::fail(
                    self.identity,
                    location.file(),
                    location.line(),
                    &err.to_string(),
                ))
            }
        }
    }

    /// Allocate through the current allocator of `kind`.
    #[track_caller]
    pub fn allocate(&mut self, kind: AllocationKind, size: usize) -> Result<MemoryBlock, Abort> {
        let location = Location::caller();
        memory::current_allocator(kind)
            .alloc_memory(size, location.file(), location.line())
            .map_err(|err| {
                self.record(TestFailure::fail(
                    self.identity,
                    location.file(),
                    location.line(),
                    &err.to_string(),
                ))
            })
    }

    #[track_caller]
    pub fn malloc(&mut self, size: usize) -> Result<MemoryBlock, Abort> {
        self.allocate(AllocationKind::Malloc, size)
    }

    /// Release a block through the current allocator of `kind`.
    #[track_caller]
    pub fn release(&mut self, kind: AllocationKind, block: MemoryBlock) {
        let location = Location::caller();
        memory::current_allocator(kind).free_memory(block, location.file(), location.line());
    }

    #[track_caller]
    pub fn free(&mut self, block: MemoryBlock) {
        self.release(AllocationKind::Malloc, block);
    }
}

impl fmt::Debug for TestContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestContext")
            .field("test", self.identity)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::NullOutput;
    use crate::shell::TestCase;
    use crate::plugin::PluginChain;

    fn run(body: crate::shell::TestFn) -> TestResult {
        let mut result = TestResult::new(NullOutput);
        let mut plugins = PluginChain::new();
        TestCase::new("Context", "test", body).run_one_test(&mut plugins, &mut result, false);
        result
    }

    #[test]
    fn test_failed_assertion_stops_body() {
        let result = run(|t| {
            t.check(false, "false")?;
            t.fail("unreachable")
        });
        assert_eq!(result.failure_count(), 1);
        assert_eq!(result.failures()[0].message(), "CHECK(false) failed");
        assert_eq!(result.check_count(), 1);
    }

    #[test]
    fn test_failure_location_is_the_assertion() {
        let result = run(|t| t.longs_equal(1, 2));
        let failure = &result.failures()[0];
        assert!(failure.file().ends_with("context.rs"));
        assert_ne!(failure.line(), 0);
    }

    #[test]
    fn test_exit_test_is_not_a_failure() {
        let result = run(|t| {
            t.check(true, "true")?;
            t.exit_test()?;
            t.fail("unreachable")
        });
        assert_eq!(result.failure_count(), 0);
        assert_eq!(result.check_count(), 1);
    }

    #[test]
    fn test_unexpected_panic_is_recorded() {
        let result = run(|_t| panic!("boom"));
        assert_eq!(result.failure_count(), 1);
        assert_eq!(result.failures()[0].message(), "Unexpected panic was raised: boom");
    }

    #[test]
    fn test_assertions_pass_and_count() {
        let result = run(|t| {
            t.strcmp_equal("a", "a")?;
            t.strcmp_nocase_equal("ABC", "abc")?;
            t.strcmp_contains("ell", "hello")?;
            t.unsigned_longs_equal(3, 3)?;
            t.doubles_equal(1.0, 1.001, 0.01)?;
            t.memcmp_equal(&[1, 2], &[1, 2])?;
            t.bits_equal(0x0F, 0xFF, 0x0F, 1)?;
            t.check_equal("x", "x")
        });
        assert_eq!(result.failure_count(), 0);
        assert_eq!(result.check_count(), 8);
    }
}
