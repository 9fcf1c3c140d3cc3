use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

use gauntlet_core::shell::{reset_crash_method, set_crash_method, set_crash_on_fail, set_rethrow_panics};
use gauntlet_core::{FailureKind, NullOutput, Outcome, TestCase, TestContext, TestRegistry, TestResult};

/// Crash and rethrow switches are process-wide.
static PROCESS_FLAGS: Mutex<()> = Mutex::new(());

static CRASHES: AtomicUsize = AtomicUsize::new(0);

fn lock_flags() -> MutexGuard<'static, ()> {
    PROCESS_FLAGS.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn counting_crash() {
    CRASHES.fetch_add(1, Ordering::SeqCst);
}

fn passing(t: &mut TestContext<'_>) -> Outcome {
    t.check(true, "true")
}

fn failing(t: &mut TestContext<'_>) -> Outcome {
    t.longs_equal(1, 2)
}

fn panics(_t: &mut TestContext<'_>) -> Outcome {
    panic!("boom");
}

#[test]
fn test_crash_on_fail_calls_hook_once_per_failure() {
    let _guard = lock_flags();
    CRASHES.store(0, Ordering::SeqCst);
    set_crash_method(counting_crash);
    set_crash_on_fail(true);

    let mut registry = TestRegistry::new();
    registry.add_test(TestCase::new("Crash", "fails", failing));
    registry.add_test(TestCase::new("Crash", "passes", passing));
    let mut result = TestResult::new(NullOutput);
    registry.run_all_tests(&mut result);

    set_crash_on_fail(false);
    reset_crash_method();
    assert_eq!(result.failure_count(), 1);
    assert_eq!(CRASHES.load(Ordering::SeqCst), 1);
}

#[test]
fn test_crash_hook_is_not_called_when_disabled() {
    let _guard = lock_flags();
    CRASHES.store(0, Ordering::SeqCst);
    set_crash_method(counting_crash);

    let mut registry = TestRegistry::new();
    registry.add_test(TestCase::new("Crash", "fails", failing));
    let mut result = TestResult::new(NullOutput);
    registry.run_all_tests(&mut result);

    reset_crash_method();
    assert_eq!(result.failure_count(), 1);
    assert_eq!(CRASHES.load(Ordering::SeqCst), 0);
}

#[test]
fn test_rethrow_records_panic_then_resumes_it() {
    let _guard = lock_flags();
    set_rethrow_panics(true);

    let mut registry = TestRegistry::new();
    registry.add_test(TestCase::new("Rethrow", "panics", panics));
    let mut result = TestResult::new(NullOutput);
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| registry.run_all_tests(&mut result)));

    set_rethrow_panics(false);
    let payload = outcome.expect_err("panic should escape the runner");
    assert_eq!(payload.downcast_ref::<&str>(), Some(&"boom"));
    assert_eq!(result.failure_count(), 1);
    assert_eq!(result.failures()[0].kind(), FailureKind::UnexpectedException);
}

#[test]
fn test_panic_is_contained_without_rethrow() {
    let _guard = lock_flags();

    let mut registry = TestRegistry::new();
    registry.add_test(TestCase::new("Rethrow", "panics", panics));
    let mut result = TestResult::new(NullOutput);
    registry.run_all_tests(&mut result);

    assert_eq!(result.failure_count(), 1);
    assert_eq!(result.run_count(), 1);
}
