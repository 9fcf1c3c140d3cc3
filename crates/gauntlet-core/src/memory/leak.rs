//! Leak detection by tracking every live block.

use std::fmt::Write;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::warn;

use crate::failure::TestFailure;
use crate::memory::{MemoryBlock, MemoryError, TestMemoryAllocator};
use crate::shell;

/// A block that was allocated and not yet freed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedAllocation {
    pub block_id: u64,
    /// 1-based allocation number within this tracker.
    pub number: usize,
    pub size: usize,
    pub file: String,
    pub line: u32,
    pub alloc_name: String,
}

#[derive(Debug, Default)]
struct LeakState {
    live: Vec<TrackedAllocation>,
    allocations: usize,
}

/// Wraps another allocator and remembers what is still allocated.
pub struct LeakTrackingAllocator {
    inner: Arc<dyn TestMemoryAllocator>,
    state: Mutex<LeakState>,
}

impl LeakTrackingAllocator {
    pub fn new(inner: Arc<dyn TestMemoryAllocator>) -> Self {
        Self {
            inner,
            state: Mutex::new(LeakState::default()),
        }
    }

    pub fn inner(&self) -> &Arc<dyn TestMemoryAllocator> {
        &self.inner
    }

    /// Blocks allocated and not freed, oldest first.
    pub fn leaks(&self) -> Vec<TrackedAllocation> {
        self.state.lock().live.clone()
    }

    pub fn leak_count(&self) -> usize {
        self.state.lock().live.len()
    }

    pub fn total_allocations(&self) -> usize {
        self.state.lock().allocations
    }

    /// One line per leak, then the total.
    pub fn leak_report(&self) -> String {
        let state = self.state.lock();
        let mut report = String::new();
        for leak in &state.live {
            let _ = writeln!(
                report,
                "Alloc num ({}) Leak size: {} Allocated at: {} and line: {}. Type: \"{}\"",
                leak.number, leak.size, leak.file, leak.line, leak.alloc_name
            );
        }
        let _ = write!(report, "Total number of leaks: {}", state.live.len());
        report
    }
}

impl TestMemoryAllocator for LeakTrackingAllocator {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn alloc_name(&self) -> &str {
        self.inner.alloc_name()
    }

    fn free_name(&self) -> &str {
        self.inner.free_name()
    }

    fn alloc_memory(&self, size: usize, file: &str, line: u32) -> Result<MemoryBlock, MemoryError> {
        let block = self.inner.alloc_memory(size, file, line)?;
        let mut state = self.state.lock();
        state.allocations += 1;
        let number = state.allocations;
        state.live.push(TrackedAllocation {
            block_id: block.id(),
            number,
            size,
            file: file.to_string(),
            line,
            alloc_name: self.inner.alloc_name().to_string(),
        });
        Ok(block)
    }

    fn free_memory(&self, block: MemoryBlock, file: &str, line: u32) {
        let known = {
            let mut state = self.state.lock();
            match state.live.iter().position(|a| a.block_id == block.id()) {
                Some(index) => {
                    state.live.remove(index);
                    true
                }
                None => false,
            }
        };

        if !known {
            let message = format!(
                "Deallocating non-allocated memory\n   allocated at file: <unknown> line: 0\n   deallocated at file: {file} line: {line}"
            );
            if shell::current_test().is_some() {
                let location = (file.to_string(), line);
                shell::fail_current_test(move |test| {
                    TestFailure::new(test, &location.0, location.1, message)
                });
            } else {
                warn!(file, line, "{message}");
            }
        }

        self.inner.free_memory(block, file, line);
    }
}
