//! Allocation counters for the runtime sampler.
//!
//! [`CountingAllocator`] wraps the system allocator and keeps running totals
//! in process-wide atomics. It only counts when a binary installs it:
//!
//! ```ignore
//! #[global_allocator]
//! static GLOBAL: CountingAllocator = CountingAllocator;
//! ```

use std::alloc::{GlobalAlloc, Layout, System};
use std::sync::atomic::{AtomicU64, Ordering};

static MALLOCS: AtomicU64 = AtomicU64::new(0);
static FREES: AtomicU64 = AtomicU64::new(0);
static TOTAL_ALLOC: AtomicU64 = AtomicU64::new(0);
static TOTAL_FREED: AtomicU64 = AtomicU64::new(0);

pub struct CountingAllocator;

unsafe impl GlobalAlloc for CountingAllocator {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        let ptr = unsafe { System.alloc(layout) };
        if !ptr.is_null() {
            record_alloc(layout.size());
        }
        ptr
    }

    unsafe fn alloc_zeroed(&self, layout: Layout) -> *mut u8 {
        let ptr = unsafe { System.alloc_zeroed(layout) };
        if !ptr.is_null() {
            record_alloc(layout.size());
        }
        ptr
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        unsafe { System.dealloc(ptr, layout) };
        record_free(layout.size());
    }

    unsafe fn realloc(&self, ptr: *mut u8, layout: Layout, new_size: usize) -> *mut u8 {
        let new_ptr = unsafe { System.realloc(ptr, layout, new_size) };
        if !new_ptr.is_null() {
            record_free(layout.size());
            record_alloc(new_size);
        }
        new_ptr
    }
}

fn record_alloc(size: usize) {
    MALLOCS.fetch_add(1, Ordering::Relaxed);
    TOTAL_ALLOC.fetch_add(size as u64, Ordering::Relaxed);
}

fn record_free(size: usize) {
    FREES.fetch_add(1, Ordering::Relaxed);
    TOTAL_FREED.fetch_add(size as u64, Ordering::Relaxed);
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AllocStats {
    /// Allocations performed
    pub mallocs: u64,
    /// Deallocations performed
    pub frees: u64,
    /// Bytes ever allocated
    pub total_alloc: u64,
    /// Bytes currently live
    pub heap_alloc: u64,
}

impl AllocStats {
    pub fn live_objects(&self) -> u64 {
        self.mallocs.saturating_sub(self.frees)
    }
}

pub fn snapshot() -> AllocStats {
    let total_alloc = TOTAL_ALLOC.load(Ordering::Relaxed);
    let total_freed = TOTAL_FREED.load(Ordering::Relaxed);
    AllocStats {
        mallocs: MALLOCS.load(Ordering::Relaxed),
        frees: FREES.load(Ordering::Relaxed),
        total_alloc,
        heap_alloc: total_alloc.saturating_sub(total_freed),
    }
}
