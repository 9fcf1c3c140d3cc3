//! Failure containment.
//!
//! Assertions made through a [`TestContext`](super::TestContext) stop a phase
//! by returning [`Abort`]. Failures raised where no context is at hand (mock
//! verification, allocators) are pushed onto the innermost [`RunFrame`] and
//! the phase is unwound with an [`Abort`] payload, which the runner catches.
//! Nested runs get their own frame, so an inner abort never escapes past the
//! run that started it.

use std::any::Any;
use std::cell::RefCell;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use tracing::debug;

use crate::failure::TestFailure;
use crate::shell::TestIdentity;

/// Why a test phase stopped early.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Abort {
    /// A failure was recorded.
    Failed,
    /// The test asked to stop without failing.
    Exit,
}

/// Result of a test phase or a single assertion.
pub type Outcome = Result<(), Abort>;

struct RunFrame {
    identity: TestIdentity,
    pending: Vec<TestFailure>,
    abandoned: bool,
}

thread_local! {
    static RUN_FRAMES: RefCell<Vec<RunFrame>> = const { RefCell::new(Vec::new()) };
    static PANIC_LOCATION: RefCell<Option<(String, u32)>> = const { RefCell::new(None) };
}

static CRASH_ON_FAIL: AtomicBool = AtomicBool::new(false);
static RETHROW_PANICS: AtomicBool = AtomicBool::new(false);
static CRASH_METHOD: Mutex<fn()> = parking_lot::const_mutex(default_crash as fn());

fn default_crash() {
    std::process::abort();
}

/// Keeps a run frame on this thread's stack for as long as it lives.
pub(crate) struct FrameGuard {
    depth: usize,
}

impl FrameGuard {
    pub(crate) fn enter(identity: &TestIdentity) -> Self {
        RUN_FRAMES.with(|frames| {
            let mut frames = frames.borrow_mut();
            frames.push(RunFrame {
                identity: identity.clone(),
                pending: Vec::new(),
                abandoned: false,
            });
            Self {
                depth: frames.len() - 1,
            }
        })
    }

    /// Clears the abandoned flag before the next phase starts.
    pub(crate) fn begin_phase(&self) {
        self.with_frame(|frame| frame.abandoned = false);
    }

    /// Failures raised out of band since the last call.
    pub(crate) fn take_pending(&self) -> Vec<TestFailure> {
        self.with_frame(|frame| std::mem::take(&mut frame.pending))
            .unwrap_or_default()
    }

    fn with_frame<R>(&self, f: impl FnOnce(&mut RunFrame) -> R) -> Option<R> {
        RUN_FRAMES.with(|frames| frames.borrow_mut().get_mut(self.depth).map(f))
    }
}

impl Drop for FrameGuard {
    fn drop(&mut self) {
        RUN_FRAMES.with(|frames| {
            if let Ok(mut frames) = frames.try_borrow_mut() {
                frames.truncate(self.depth);
            }
        });
    }
}

/// Identity of the test running on this thread, if any.
pub fn current_test() -> Option<TestIdentity> {
    RUN_FRAMES.with(|frames| {
        frames
            .try_borrow()
            .ok()
            .and_then(|frames| frames.last().map(|frame| frame.identity.clone()))
    })
}

/// Number of nested runs active on this thread.
pub fn run_depth() -> usize {
    RUN_FRAMES.with(|frames| frames.try_borrow().map(|frames| frames.len()).unwrap_or(0))
}

/// True when the current phase has already been failed out of band.
pub(crate) fn abandon_requested() -> bool {
    RUN_FRAMES.with(|frames| {
        frames
            .try_borrow()
            .ok()
            .and_then(|frames| frames.last().map(|frame| frame.abandoned))
            .unwrap_or(false)
    })
}

/// Fail the running test from anywhere on its thread.
///
/// The failure is built from the current test's identity, recorded, and the
/// phase is abandoned. Outside of a run this panics with the message, so it
/// still fails under a plain `#[test]`.
pub fn fail_current_test<F>(make: F)
where
    F: FnOnce(&TestIdentity) -> TestFailure,
{
    let orphan = RUN_FRAMES.with(|frames| {
        let mut frames = frames.borrow_mut();
        match frames.last_mut() {
            Some(frame) => {
                let failure = make(&frame.identity);
                debug!(test = %frame.identity, "failure raised out of band");
                frame.pending.push(failure);
                frame.abandoned = true;
                None
            }
            None => Some(make(&TestIdentity::outside_of_test())),
        }
    });

    if let Some(failure) = orphan {
        panic!("{}", failure.message());
    }

    on_failure();
    abandon(Abort::Failed);
}

/// Stop the running test without recording a failure.
pub fn exit_current_test() {
    abandon(Abort::Exit);
}

fn abandon(abort: Abort) {
    #[cfg(panic = "unwind")]
    panic::resume_unwind(Box::new(abort));

    #[cfg(not(panic = "unwind"))]
    let _ = abort;
}

/// Crash instead of continuing when a failure is recorded.
pub fn set_crash_on_fail(enabled: bool) {
    CRASH_ON_FAIL.store(enabled, Ordering::SeqCst);
}

pub fn crash_on_fail() -> bool {
    CRASH_ON_FAIL.load(Ordering::SeqCst)
}

/// Replace what "crash" means. Defaults to aborting the process.
pub fn set_crash_method(method: fn()) {
    *CRASH_METHOD.lock() = method;
}

pub fn reset_crash_method() {
    *CRASH_METHOD.lock() = default_crash as fn();
}

/// Invoke the crash hook.
pub fn crash() {
    let method = *CRASH_METHOD.lock();
    method();
}

pub(crate) fn on_failure() {
    if crash_on_fail() {
        debug!("crashing on failure");
        crash();
    }
}

/// Re-raise non-framework panics after recording them.
pub fn set_rethrow_panics(enabled: bool) {
    RETHROW_PANICS.store(enabled, Ordering::SeqCst);
}

pub fn rethrow_panics() -> bool {
    RETHROW_PANICS.load(Ordering::SeqCst)
}

/// Install a panic hook that keeps test panics quiet.
///
/// Panics raised inside a running test are logged at debug level and their
/// location is kept for the failure report. Panics elsewhere go to the
/// previously installed hook.
pub fn install_panic_hook() {
    let previous = panic::take_hook();
    panic::set_hook(Box::new(move |info| {
        if run_depth() == 0 {
            previous(info);
            return;
        }
        if info.payload().downcast_ref::<Abort>().is_some() {
            return;
        }
        if let Some(location) = info.location() {
            PANIC_LOCATION.with(|slot| {
                *slot.borrow_mut() = Some((location.file().to_string(), location.line()));
            });
        }
        debug!(%info, "panic inside a running test");
    }));
}

pub(crate) fn take_panic_location() -> Option<(String, u32)> {
    PANIC_LOCATION.with(|slot| slot.borrow_mut().take())
}

/// Text of a panic payload, when it carries one.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> Option<String> {
    if let Some(s) = payload.downcast_ref::<&str>() {
        Some(s.to_string())
    } else {
        payload.downcast_ref::<String>().cloned()
    }
}

/// How a protected phase ended.
pub(crate) enum PhaseEnd {
    Completed,
    Abandoned(Abort),
    Panicked(Box<dyn Any + Send>),
}

/// Run `phase`, turning framework aborts and foreign panics into values.
pub(crate) fn run_protected<F>(phase: F) -> PhaseEnd
where
    F: FnOnce() -> Outcome,
{
    match panic::catch_unwind(AssertUnwindSafe(phase)) {
        Ok(Ok(())) => PhaseEnd::Completed,
        Ok(Err(abort)) => PhaseEnd::Abandoned(abort),
        Err(payload) => match payload.downcast_ref::<Abort>() {
            Some(abort) => PhaseEnd::Abandoned(*abort),
            None => PhaseEnd::Panicked(payload),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity() -> TestIdentity {
        TestIdentity::new("Containment", "frame", "containment.rs", 1)
    }

    #[test]
    fn test_frames_nest_and_unwind() {
        assert_eq!(run_depth(), 0);
        let outer = FrameGuard::enter(&identity());
        {
            let _inner = FrameGuard::enter(&TestIdentity::new("Inner", "t", "f", 2));
            assert_eq!(run_depth(), 2);
            assert_eq!(current_test().map(|t| t.group), Some("Inner".to_string()));
        }
        assert_eq!(run_depth(), 1);
        drop(outer);
        assert_eq!(run_depth(), 0);
    }

    #[test]
    fn test_out_of_band_failure_is_contained() {
        let frame = FrameGuard::enter(&identity());
        let end = run_protected(|| {
            fail_current_test(|id| TestFailure::at_test(id, "from afar"));
            Ok(())
        });
        assert!(matches!(end, PhaseEnd::Abandoned(Abort::Failed)));
        let pending = frame.take_pending();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].message(), "from afar");
    }

    #[test]
    fn test_foreign_panic_is_reported() {
        let end = run_protected(|| panic!("plain panic"));
        match end {
            PhaseEnd::Panicked(payload) => {
                assert_eq!(panic_message(payload.as_ref()).as_deref(), Some("plain panic"));
            }
            _ => panic!("expected a foreign panic"),
        }
    }

    #[test]
    #[should_panic(expected = "outside")]
    fn test_failure_outside_of_run_panics() {
        fail_current_test(|id| TestFailure::at_test(id, "outside"));
    }

    #[test]
    fn test_crash_method_is_replaceable() {
        use std::sync::atomic::AtomicUsize;
        static CRASHES: AtomicUsize = AtomicUsize::new(0);
        fn counting_crash() {
            CRASHES.fetch_add(1, Ordering::SeqCst);
        }

        set_crash_method(counting_crash);
        crash();
        reset_crash_method();
        assert_eq!(CRASHES.load(Ordering::SeqCst), 1);
    }
}
