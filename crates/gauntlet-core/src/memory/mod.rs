//! Swappable allocators that test code allocates through.
//!
//! Each [`AllocationKind`] has a current allocator. Plugins wrap the current
//! allocator for the duration of a test (to find leaks, or to account for
//! every allocation) and put the original back afterwards.

mod accountant;
mod leak;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use accountant::{AccountingAllocator, GlobalMemoryAccountant, MemoryAccountant};
pub use leak::{LeakTrackingAllocator, TrackedAllocation};

/// Allocation families, each with its own allocator slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AllocationKind {
    Malloc,
    New,
    NewArray,
}

impl AllocationKind {
    pub const ALL: [AllocationKind; 3] = [Self::Malloc, Self::New, Self::NewArray];

    fn index(self) -> usize {
        match self {
            Self::Malloc => 0,
            Self::New => 1,
            Self::NewArray => 2,
        }
    }

    pub fn alloc_name(&self) -> &'static str {
        match self {
            Self::Malloc => "malloc",
            Self::New => "new",
            Self::NewArray => "new []",
        }
    }

    pub fn free_name(&self) -> &'static str {
        match self {
            Self::Malloc => "free",
            Self::New => "delete",
            Self::NewArray => "delete []",
        }
    }
}

/// Allocation errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MemoryError {
    #[error("{alloc_name} returned null pointer (allocator: {allocator}, size: {size})")]
    AllocationFailed {
        allocator: String,
        alloc_name: String,
        size: usize,
    },

    #[error("Cache sizes must be set before any allocation is accounted")]
    CacheSizesAfterAllocations,

    #[error("Global memory accountant already started")]
    AlreadyStarted,

    #[error("Global memory accountant was not started")]
    NotStarted,

    #[error("Allocator for {0:?} was changed while the global memory accountant was running")]
    AllocatorChanged(AllocationKind),
}

static NEXT_BLOCK_ID: AtomicU64 = AtomicU64::new(1);

/// A zeroed allocation handed out by a [`TestMemoryAllocator`].
#[derive(Debug, PartialEq, Eq)]
pub struct MemoryBlock {
    id: u64,
    data: Box<[u8]>,
}

impl MemoryBlock {
    /// Process-unique id, used to match frees against allocations.
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.data
    }
}

/// Allocate a zeroed block, or `None` if the memory is not available.
pub(crate) fn allocate_block(size: usize) -> Option<MemoryBlock> {
    let mut data = Vec::new();
    data.try_reserve_exact(size).ok()?;
    data.resize(size, 0u8);
    Some(MemoryBlock {
        id: NEXT_BLOCK_ID.fetch_add(1, Ordering::Relaxed),
        data: data.into_boxed_slice(),
    })
}

/// Something test code allocates through.
pub trait TestMemoryAllocator: Send + Sync {
    fn name(&self) -> &str;

    fn alloc_name(&self) -> &str;

    fn free_name(&self) -> &str;

    fn alloc_memory(&self, size: usize, file: &str, line: u32) -> Result<MemoryBlock, MemoryError>;

    fn free_memory(&self, block: MemoryBlock, file: &str, line: u32);

    fn is_of_equal_type(&self, other: &dyn TestMemoryAllocator) -> bool {
        self.name() == other.name()
    }
}

/// The allocator every slot starts with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StandardAllocator {
    kind: AllocationKind,
}

impl StandardAllocator {
    pub const fn for_kind(kind: AllocationKind) -> Self {
        Self { kind }
    }

    pub const fn malloc() -> Self {
        Self::for_kind(AllocationKind::Malloc)
    }

    pub const fn new_allocator() -> Self {
        Self::for_kind(AllocationKind::New)
    }

    pub const fn new_array_allocator() -> Self {
        Self::for_kind(AllocationKind::NewArray)
    }
}

impl TestMemoryAllocator for StandardAllocator {
    fn name(&self) -> &str {
        match self.kind {
            AllocationKind::Malloc => "Standard Malloc Allocator",
            AllocationKind::New => "Standard New Allocator",
            AllocationKind::NewArray => "Standard New [] Allocator",
        }
    }

    fn alloc_name(&self) -> &str {
        self.kind.alloc_name()
    }

    fn free_name(&self) -> &str {
        self.kind.free_name()
    }

    fn alloc_memory(&self, size: usize, _file: &str, _line: u32) -> Result<MemoryBlock, MemoryError> {
        allocate_block(size).ok_or_else(|| MemoryError::AllocationFailed {
            allocator: self.name().to_string(),
            alloc_name: self.alloc_name().to_string(),
            size,
        })
    }

    fn free_memory(&self, block: MemoryBlock, _file: &str, _line: u32) {
        drop(block);
    }
}

type AllocatorSlot = Mutex<Option<Arc<dyn TestMemoryAllocator>>>;

static CURRENT_ALLOCATORS: [AllocatorSlot; 3] = [
    parking_lot::const_mutex(None),
    parking_lot::const_mutex(None),
    parking_lot::const_mutex(None),
];

/// A fresh standard allocator for `kind`.
pub fn default_allocator(kind: AllocationKind) -> Arc<dyn TestMemoryAllocator> {
    Arc::new(StandardAllocator::for_kind(kind))
}

/// The allocator currently installed for `kind`.
pub fn current_allocator(kind: AllocationKind) -> Arc<dyn TestMemoryAllocator> {
    let mut slot = CURRENT_ALLOCATORS[kind.index()].lock();
    Arc::clone(slot.get_or_insert_with(|| default_allocator(kind)))
}

/// Install `allocator` for `kind`, returning the one it replaces.
pub fn set_current_allocator(
    kind: AllocationKind,
    allocator: Arc<dyn TestMemoryAllocator>,
) -> Arc<dyn TestMemoryAllocator> {
    let mut slot = CURRENT_ALLOCATORS[kind.index()].lock();
    slot.replace(allocator)
        .unwrap_or_else(|| default_allocator(kind))
}

/// Put the standard allocator back for `kind`.
pub fn reset_current_allocator(kind: AllocationKind) {
    *CURRENT_ALLOCATORS[kind.index()].lock() = None;
}

/// Allocate from the current malloc allocator.
#[track_caller]
pub fn malloc(size: usize) -> Result<MemoryBlock, MemoryError> {
    let location = std::panic::Location::caller();
    current_allocator(AllocationKind::Malloc).alloc_memory(size, location.file(), location.line())
}

/// Free through the current malloc allocator.
#[track_caller]
pub fn free(block: MemoryBlock) {
    let location = std::panic::Location::caller();
    current_allocator(AllocationKind::Malloc).free_memory(block, location.file(), location.line());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_allocator_names() {
        let malloc = StandardAllocator::malloc();
        assert_eq!(malloc.name(), "Standard Malloc Allocator");
        assert_eq!(malloc.alloc_name(), "malloc");
        assert_eq!(malloc.free_name(), "free");

        let array = StandardAllocator::new_array_allocator();
        assert_eq!(array.name(), "Standard New [] Allocator");
        assert_eq!(array.alloc_name(), "new []");
        assert_eq!(array.free_name(), "delete []");
    }

    #[test]
    fn test_blocks_are_zeroed_and_unique() {
        let a = allocate_block(8).unwrap();
        let b = allocate_block(8).unwrap();
        assert_eq!(a.as_slice(), &[0u8; 8]);
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_huge_allocation_fails() {
        let result = StandardAllocator::malloc().alloc_memory(usize::MAX, "file", 1);
        assert!(matches!(result, Err(MemoryError::AllocationFailed { .. })));
    }
}
