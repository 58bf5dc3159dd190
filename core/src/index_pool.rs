//! Mutex-guarded allocator for small integer indices.
//!
//! Descriptor heaps and bindless tables address their slots by index. An
//! [`IndexPool`] hands those indices out and takes them back, reusing freed
//! slots before growing. It may be shared by several recording threads.

use parking_lot::Mutex;

#[derive(Debug, Default)]
struct IndexPoolState {
    next: u32,
    free: Vec<u32>,
    allocated: u32,
}

/// Thread-safe index allocator with free-list reuse.
#[derive(Debug, Default)]
pub struct IndexPool {
    state: Mutex<IndexPoolState>,
}

impl IndexPool {
    /// Create an empty pool whose first allocation returns `0`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate an index, reusing the most recently freed one if any.
    pub fn allocate(&self) -> u32 {
        let mut state = self.state.lock();
        state.allocated += 1;
        if let Some(index) = state.free.pop() {
            return index;
        }
        let index = state.next;
        state.next += 1;
        index
    }

    /// Return an index to the pool.
    ///
    /// # Panics
    ///
    /// Panics if the index was never handed out by this pool.
    pub fn free(&self, index: u32) {
        let mut state = self.state.lock();
        assert!(index < state.next, "Index {index} was not allocated by this pool");
        debug_assert!(!state.free.contains(&index), "Index {index} freed twice");
        state.allocated -= 1;
        state.free.push(index);
    }

    /// Number of indices currently in use.
    pub fn allocated_count(&self) -> u32 {
        self.state.lock().allocated
    }

    /// Highest index ever allocated plus one.
    pub fn high_water_mark(&self) -> u32 {
        self.state.lock().next
    }
}
