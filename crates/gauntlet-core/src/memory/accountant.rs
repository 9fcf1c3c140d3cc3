//! Allocation statistics per size.

use std::collections::HashMap;
use std::fmt::Write;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::memory::{self, AllocationKind, MemoryBlock, MemoryError, TestMemoryAllocator};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct AllocationBucket {
    /// Upper bound with cache sizes, exact size otherwise. 0 marks the
    /// catch-all bucket when cache sizes are in use.
    size: usize,
    allocations: usize,
    deallocations: usize,
    current: usize,
    max_at_once: usize,
}

impl AllocationBucket {
    fn new(size: usize) -> Self {
        Self {
            size,
            ..Self::default()
        }
    }
}

/// Counts allocations and deallocations per size.
///
/// Without cache sizes every distinct size gets its own row, sorted. With
/// cache sizes each allocation lands in the first bucket that fits, or in a
/// final catch-all bucket.
#[derive(Debug, Default)]
pub struct MemoryAccountant {
    buckets: Vec<AllocationBucket>,
    use_cache_sizes: bool,
}

impl MemoryAccountant {
    pub fn new() -> Self {
        Self::default()
    }

    /// Switch to cache-size buckets. Only allowed before anything is counted.
    pub fn use_cache_sizes(&mut self, sizes: &[usize]) -> Result<(), MemoryError> {
        if !self.buckets.is_empty() {
            return Err(MemoryError::CacheSizesAfterAllocations);
        }
        let mut sizes = sizes.to_vec();
        sizes.sort_unstable();
        sizes.dedup();
        self.buckets = sizes.into_iter().map(AllocationBucket::new).collect();
        self.buckets.push(AllocationBucket::new(0));
        self.use_cache_sizes = true;
        Ok(())
    }

    pub fn clear(&mut self) {
        self.buckets.clear();
        self.use_cache_sizes = false;
    }

    pub fn alloc(&mut self, size: usize) {
        let index = self.find_or_create(size);
        let bucket = &mut self.buckets[index];
        bucket.allocations += 1;
        bucket.current += 1;
        bucket.max_at_once = bucket.max_at_once.max(bucket.current);
    }

    pub fn dealloc(&mut self, size: usize) {
        let index = self.find_or_create(size);
        let bucket = &mut self.buckets[index];
        bucket.deallocations += 1;
        bucket.current = bucket.current.saturating_sub(1);
    }

    pub fn total_allocations_of_size(&self, size: usize) -> usize {
        self.find(size).map_or(0, |i| self.buckets[i].allocations)
    }

    pub fn total_deallocations_of_size(&self, size: usize) -> usize {
        self.find(size).map_or(0, |i| self.buckets[i].deallocations)
    }

    pub fn maximum_allocation_at_a_time_of_size(&self, size: usize) -> usize {
        self.find(size).map_or(0, |i| self.buckets[i].max_at_once)
    }

    pub fn total_allocations(&self) -> usize {
        self.buckets.iter().map(|b| b.allocations).sum()
    }

    pub fn total_deallocations(&self) -> usize {
        self.buckets.iter().map(|b| b.deallocations).sum()
    }

    /// A table of every bucket.
    pub fn report(&self) -> String {
        if self.total_allocations() == 0 && self.total_deallocations() == 0 {
            return "Gauntlet Memory Accountant has not noticed any allocations or deallocations. Sorry\n"
                .to_string();
        }

        let mut report = String::new();
        if self.use_cache_sizes {
            report.push_str("Gauntlet Memory Accountant report (with cache sizes):\n");
            report.push_str("Cache size          # allocations    # deallocations   max # allocations at one time\n");
        } else {
            report.push_str("Gauntlet Memory Accountant report:\n");
            report.push_str("Allocation size     # allocations    # deallocations   max # allocations at one time\n");
        }

        for bucket in &self.buckets {
            let size = if self.use_cache_sizes && bucket.size == 0 {
                "other".to_string()
            } else if self.use_cache_sizes {
                format!("<{:>5}", bucket.size)
            } else {
                format!("{:>5}", bucket.size)
            };
            let _ = writeln!(
                report,
                "{}               {:>5}            {:>5}             {:>5}",
                size, bucket.allocations, bucket.deallocations, bucket.max_at_once
            );
        }
        report.push_str("   Thank you for your business\n");
        report
    }

    fn find(&self, size: usize) -> Option<usize> {
        if self.use_cache_sizes {
            self.buckets
                .iter()
                .position(|b| b.size != 0 && size <= b.size)
                .or_else(|| self.buckets.len().checked_sub(1))
        } else {
            self.buckets.binary_search_by_key(&size, |b| b.size).ok()
        }
    }

    fn find_or_create(&mut self, size: usize) -> usize {
        if let Some(index) = self.find(size) {
            return index;
        }
        match self.buckets.binary_search_by_key(&size, |b| b.size) {
            Ok(index) => index,
            Err(index) => {
                self.buckets.insert(index, AllocationBucket::new(size));
                index
            }
        }
    }
}

/// Feeds every allocation and free into a shared [`MemoryAccountant`].
pub struct AccountingAllocator {
    accountant: Arc<Mutex<MemoryAccountant>>,
    original: Arc<dyn TestMemoryAllocator>,
    sizes: Mutex<HashMap<u64, usize>>,
}

impl AccountingAllocator {
    pub fn new(
        accountant: Arc<Mutex<MemoryAccountant>>,
        original: Arc<dyn TestMemoryAllocator>,
    ) -> Self {
        Self {
            accountant,
            original,
            sizes: Mutex::new(HashMap::new()),
        }
    }

    pub fn original_allocator(&self) -> &Arc<dyn TestMemoryAllocator> {
        &self.original
    }
}

impl TestMemoryAllocator for AccountingAllocator {
    fn name(&self) -> &str {
        "Accounting Allocator"
    }

    fn alloc_name(&self) -> &str {
        self.original.alloc_name()
    }

    fn free_name(&self) -> &str {
        self.original.free_name()
    }

    fn alloc_memory(&self, size: usize, file: &str, line: u32) -> Result<MemoryBlock, MemoryError> {
        self.accountant.lock().alloc(size);
        let block = self.original.alloc_memory(size, file, line)?;
        self.sizes.lock().insert(block.id(), size);
        Ok(block)
    }

    /// Unknown blocks are counted as size 0.
    fn free_memory(&self, block: MemoryBlock, file: &str, line: u32) {
        let size = self.sizes.lock().remove(&block.id()).unwrap_or(0);
        self.accountant.lock().dealloc(size);
        self.original.free_memory(block, file, line);
    }
}

type InstalledAccounting = (AllocationKind, Arc<dyn TestMemoryAllocator>, Arc<AccountingAllocator>);

/// Accounts every allocation of every kind between [`start`] and [`stop`].
///
/// [`start`]: GlobalMemoryAccountant::start
/// [`stop`]: GlobalMemoryAccountant::stop
#[derive(Default)]
pub struct GlobalMemoryAccountant {
    accountant: Arc<Mutex<MemoryAccountant>>,
    installed: Vec<InstalledAccounting>,
}

impl GlobalMemoryAccountant {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn use_cache_sizes(&self, sizes: &[usize]) -> Result<(), MemoryError> {
        self.accountant.lock().use_cache_sizes(sizes)
    }

    pub fn is_running(&self) -> bool {
        !self.installed.is_empty()
    }

    pub fn start(&mut self) -> Result<(), MemoryError> {
        if self.is_running() {
            return Err(MemoryError::AlreadyStarted);
        }
        for kind in AllocationKind::ALL {
            let original = memory::current_allocator(kind);
            let accounting = Arc::new(AccountingAllocator::new(
                Arc::clone(&self.accountant),
                Arc::clone(&original),
            ));
            memory::set_current_allocator(kind, accounting.clone());
            self.installed.push((kind, original, accounting));
        }
        debug!("global memory accountant started");
        Ok(())
    }

    /// Restore the original allocators. Fails if someone replaced ours in
    /// the meantime; the originals are restored regardless.
    pub fn stop(&mut self) -> Result<(), MemoryError> {
        if !self.is_running() {
            return Err(MemoryError::NotStarted);
        }
        let mut changed = None;
        for (kind, original, accounting) in self.installed.drain(..) {
            let current = memory::current_allocator(kind);
            if Arc::as_ptr(&current).cast::<()>() != Arc::as_ptr(&accounting).cast::<()>() {
                changed.get_or_insert(kind);
            }
            memory::set_current_allocator(kind, original);
        }
        debug!("global memory accountant stopped");
        match changed {
            Some(kind) => Err(MemoryError::AllocatorChanged(kind)),
            None => Ok(()),
        }
    }

    pub fn report(&self) -> String {
        self.accountant.lock().report()
    }

    pub fn accountant(&self) -> Arc<Mutex<MemoryAccountant>> {
        Arc::clone(&self.accountant)
    }
}

impl Drop for GlobalMemoryAccountant {
    fn drop(&mut self) {
        if self.is_running() {
            let _ = self.stop();
        }
    }
}
