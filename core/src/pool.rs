//! Object pooling utilities for allocation reuse.
//!
//! This module provides [`RecyclePool<T>`], a thread-safe free list of values
//! that keep their allocations between uses. Instead of dropping a value
//! (which deallocates), callers hand it back to the pool, where it is reset
//! but its underlying memory (e.g., `Vec` capacity) is retained.
//!
//! # Motivation
//!
//! Command recording state (tracked resources, pending barriers, barrier
//! batches) is rebuilt for every submission. Recycling it through a pool
//! avoids reallocating those containers on every frame.
//!
//! # Example
//!
//! ```
//! use cinder_core::pool::{Poolable, RecyclePool};
//!
//! #[derive(Debug, Default)]
//! struct Scratch {
//!     data: Vec<u8>,
//! }
//!
//! impl Poolable for Scratch {
//!     fn new_empty() -> Self {
//!         Self::default()
//!     }
//!     fn reset(&mut self) {
//!         self.data.clear();
//!     }
//! }
//!
//! let pool = RecyclePool::<Scratch>::new();
//! let mut scratch = pool.acquire();
//! scratch.data.extend_from_slice(&[1, 2, 3]);
//!
//! // Release back to pool: clears data but keeps Vec capacity
//! pool.release(scratch);
//! let reused = pool.acquire();
//! assert!(reused.data.is_empty());
//! assert!(reused.data.capacity() >= 3);
//! ```

use parking_lot::Mutex;

/// Trait for types that can be pooled and reused.
///
/// Implementors must be able to create an empty instance and clear their
/// contents while preserving allocated capacity.
pub trait Poolable {
    /// Create a new empty instance for pool initialization.
    fn new_empty() -> Self;

    /// Reset the value to an empty state, preserving allocated capacity.
    ///
    /// For example, call `Vec::clear()` rather than replacing with a new `Vec`.
    fn reset(&mut self);
}

/// A mutex-guarded free list of [`Poolable`] values.
///
/// Acquiring from an empty pool creates a fresh value on demand, so the pool
/// never fails; it only grows to the peak number of values in flight.
#[derive(Debug)]
pub struct RecyclePool<T: Poolable> {
    free: Mutex<Vec<T>>,
}

impl<T: Poolable> RecyclePool<T> {
    /// Create an empty pool.
    pub fn new() -> Self {
        Self {
            free: Mutex::new(Vec::new()),
        }
    }

    /// Take a value from the pool, creating one if none is free.
    pub fn acquire(&self) -> T {
        match self.free.lock().pop() {
            Some(value) => value,
            None => {
                log::trace!("RecyclePool: growing pool");
                T::new_empty()
            }
        }
    }

    /// Reset a value and return it to the pool.
    pub fn release(&self, mut value: T) {
        value.reset();
        self.free.lock().push(value);
    }

    /// Number of values currently available for reuse.
    pub fn free_count(&self) -> usize {
        self.free.lock().len()
    }
}

impl<T: Poolable> Default for RecyclePool<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Default, PartialEq)]
    struct TestBuffer {
        data: Vec<u32>,
    }

    impl Poolable for TestBuffer {
        fn new_empty() -> Self {
            Self::default()
        }
        fn reset(&mut self) {
            self.data.clear();
        }
    }

    #[test]
    fn test_acquire_from_empty_pool_creates_value() {
        let pool = RecyclePool::<TestBuffer>::new();
        assert_eq!(pool.free_count(), 0);
        let value = pool.acquire();
        assert!(value.data.is_empty());
    }

    #[test]
    fn test_release_resets_and_keeps_capacity() {
        let pool = RecyclePool::<TestBuffer>::new();
        let mut value = pool.acquire();
        value.data.extend(0..64);
        pool.release(value);
        assert_eq!(pool.free_count(), 1);

        let reused = pool.acquire();
        assert!(reused.data.is_empty());
        assert!(reused.data.capacity() >= 64);
        assert_eq!(pool.free_count(), 0);
    }

    #[test]
    fn test_pool_grows_to_peak_usage() {
        let pool = RecyclePool::<TestBuffer>::new();
        let a = pool.acquire();
        let b = pool.acquire();
        let c = pool.acquire();
        pool.release(a);
        pool.release(b);
        pool.release(c);
        assert_eq!(pool.free_count(), 3);
    }

    #[test]
    fn test_pool_shared_between_threads() {
        let pool = std::sync::Arc::new(RecyclePool::<TestBuffer>::new());
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let pool = pool.clone();
                std::thread::spawn(move || {
                    let mut value = pool.acquire();
                    value.data.push(i);
                    pool.release(value);
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert!(pool.free_count() >= 1);
        assert!(pool.free_count() <= 4);
    }
}
