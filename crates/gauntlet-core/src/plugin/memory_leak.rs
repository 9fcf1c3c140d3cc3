//! Fails tests that leave allocations behind.

use std::sync::Arc;

use tracing::debug;

use crate::failure::TestFailure;
use crate::memory::{self, AllocationKind, LeakTrackingAllocator, TestMemoryAllocator};
use crate::plugin::TestPlugin;
use crate::result::TestResult;
use crate::shell::TestCase;

pub const MEMORY_LEAK_PLUGIN_NAME: &str = "MemoryLeakPlugin";

type Tracked = (AllocationKind, Arc<dyn TestMemoryAllocator>, Arc<LeakTrackingAllocator>);

/// Wraps every allocator kind in a leak tracker for the duration of a test.
///
/// A leak is only reported when the test has not already failed, since a
/// failed test usually skips its own cleanup.
#[derive(Default)]
pub struct MemoryLeakPlugin {
    tracked: Vec<Tracked>,
    leaking_tests: usize,
}

impl MemoryLeakPlugin {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tests reported as leaking so far.
    pub fn leaking_tests(&self) -> usize {
        self.leaking_tests
    }
}

impl TestPlugin for MemoryLeakPlugin {
    fn name(&self) -> &str {
        MEMORY_LEAK_PLUGIN_NAME
    }

    fn pre_test_action(&mut self, _test: &TestCase, _result: &mut TestResult) {
        for kind in AllocationKind::ALL {
            let original = memory::current_allocator(kind);
            let tracker = Arc::new(LeakTrackingAllocator::new(Arc::clone(&original)));
            memory::set_current_allocator(kind, tracker.clone());
            self.tracked.push((kind, original, tracker));
        }
    }

    fn post_test_action(&mut self, test: &TestCase, result: &mut TestResult) {
        let mut leaks = 0;
        let mut report = String::from("Memory leak(s) found.\n");
        for (kind, original, tracker) in self.tracked.drain(..) {
            memory::set_current_allocator(kind, original);
            let count = tracker.leak_count();
            if count > 0 {
                leaks += count;
                report.push_str(&tracker.leak_report());
                report.push('\n');
            }
        }

        if leaks == 0 {
            return;
        }
        debug!(test = %test.identity(), leaks, "leaks detected");
        if !result.current_test_failed() {
            self.leaking_tests += 1;
            result.add_failure(TestFailure::memory_leak(test.identity(), report.trim_end()));
        }
    }
}

impl std::fmt::Debug for MemoryLeakPlugin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryLeakPlugin")
            .field("leaking_tests", &self.leaking_tests)
            .finish_non_exhaustive()
    }
}
