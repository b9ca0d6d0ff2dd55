//! # Shared Allocator
//!
//! Lock-wrapped allocator for the few places where one instance is used from
//! several threads. The allocators themselves stay unsynchronized; this is
//! the single place the locking discipline lives.

use std::ptr::NonNull;

use parking_lot::{Mutex, MutexGuard};

use super::traits::{Allocator, AllocatorStats};

/// An allocator behind a `parking_lot` mutex.
///
/// Pointers returned through the wrapper are plain addresses; moving them
/// between threads is the caller's business.
///
/// # Example
///
/// ```rust
/// use cinder_core::memory::{Arena, PoolAllocator, SharedAllocator};
///
/// let arena = Arena::new(64 * 1024).expect("reservation");
/// let shared = SharedAllocator::new(PoolAllocator::new(&arena, 64, 128).expect("section"));
///
/// std::thread::scope(|s| {
///     for _ in 0..4 {
///         s.spawn(|| {
///             let ptr = shared.alloc(32).expect("block");
///             shared.free(ptr);
///         });
///     }
/// });
/// assert_eq!(shared.stats().live_allocations, 0);
/// ```
#[derive(Debug)]
pub struct SharedAllocator<A> {
    inner: Mutex<A>,
}

impl<A: Allocator> SharedAllocator<A> {
    /// Wraps `allocator`.
    #[must_use]
    pub fn new(allocator: A) -> Self {
        Self {
            inner: Mutex::new(allocator),
        }
    }

    /// Locks the allocator for a sequence of operations.
    #[inline]
    pub fn lock(&self) -> MutexGuard<'_, A> {
        self.inner.lock()
    }

    /// Allocates `size` bytes under the lock.
    #[inline]
    pub fn alloc(&self, size: usize) -> Option<NonNull<u8>> {
        self.inner.lock().alloc(size)
    }

    /// Frees `ptr` under the lock.
    #[inline]
    pub fn free(&self, ptr: NonNull<u8>) {
        self.inner.lock().free(ptr);
    }

    /// Resizes `ptr` under the lock.
    #[inline]
    pub fn realloc(&self, ptr: NonNull<u8>, new_size: usize) -> Option<NonNull<u8>> {
        self.inner.lock().realloc(ptr, new_size)
    }

    /// Resets the allocator under the lock.
    pub fn reset(&self) {
        self.inner.lock().reset();
    }

    /// Current usage.
    #[must_use]
    pub fn stats(&self) -> AllocatorStats {
        self.inner.lock().stats()
    }

    /// Unwraps the allocator.
    #[must_use]
    pub fn into_inner(self) -> A {
        self.inner.into_inner()
    }
}
