//! # Linear Allocator
//!
//! Bump allocation inside one arena section.
//!
//! Allocation advances an offset; there is no per-allocation free. The whole
//! section is reclaimed at once by [`LinearAllocator::reset`], which makes it
//! the natural home for one frame's transient data.
//!
//! No alignment padding is inserted: the k-th allocation after a reset starts
//! exactly at `base + sum(previous sizes)`. Callers storing over-aligned types
//! round their sizes up themselves.

use std::ptr::NonNull;

use crate::error::MemoryResult;

use super::arena::Arena;
use super::region::Region;
use super::traits::{contract_violation, Allocator, AllocatorKind, AllocatorStats};

/// A bump allocator with bulk reset.
///
/// # Example
///
/// ```rust
/// use cinder_core::memory::{Arena, LinearAllocator};
///
/// let arena = Arena::new(1024).expect("reservation");
/// let mut frame = LinearAllocator::new(&arena, 256).expect("section");
///
/// let a = frame.alloc(100).expect("fits");
/// let b = frame.alloc(100).expect("fits");
/// assert_eq!(b.as_ptr() as usize - a.as_ptr() as usize, 100);
/// assert!(frame.alloc(100).is_none());
///
/// frame.reset();
/// assert_eq!(frame.alloc(8), Some(a));
/// ```
#[derive(Debug)]
pub struct LinearAllocator<'a> {
    /// Backing section.
    region: Region<'a>,
    /// Bytes handed out since the last reset.
    offset: usize,
    /// Allocations handed out since the last reset.
    allocations: usize,
}

impl<'a> LinearAllocator<'a> {
    /// Carves `size` bytes from `arena`.
    ///
    /// # Errors
    ///
    /// Returns the arena's carve error if the section does not fit.
    pub fn new(arena: &'a Arena, size: usize) -> MemoryResult<Self> {
        let region = arena.carve(size, AllocatorKind::Linear)?;
        tracing::debug!(
            offset = region.arena_offset(),
            size,
            "linear allocator initialized"
        );
        Ok(Self {
            region,
            offset: 0,
            allocations: 0,
        })
    }

    /// Bumps `size` bytes off the section.
    ///
    /// Returns `None`, leaving the offset unchanged, if the request does not
    /// fit in what is left.
    #[inline]
    pub fn alloc(&mut self, size: usize) -> Option<NonNull<u8>> {
        let end = self.offset.checked_add(size)?;
        if end > self.region.len() {
            return None;
        }
        let ptr = self.region.ptr_at(self.offset);
        self.offset = end;
        self.allocations += 1;
        Some(ptr)
    }

    /// Rewinds to the start of the section.
    ///
    /// Every pointer handed out so far becomes invalid at once.
    #[inline]
    pub fn reset(&mut self) {
        tracing::trace!(
            used = self.offset,
            allocations = self.allocations,
            "linear allocator reset"
        );
        self.offset = 0;
        self.allocations = 0;
    }

    /// Bytes handed out since the last reset.
    #[inline]
    #[must_use]
    pub const fn used(&self) -> usize {
        self.offset
    }

    /// Bytes still available.
    #[inline]
    #[must_use]
    pub const fn remaining(&self) -> usize {
        self.region.len() - self.offset
    }

    /// Size of the section.
    #[inline]
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.region.len()
    }
}

impl Allocator for LinearAllocator<'_> {
    fn kind(&self) -> AllocatorKind {
        AllocatorKind::Linear
    }

    fn alloc(&mut self, size: usize) -> Option<NonNull<u8>> {
        LinearAllocator::alloc(self, size)
    }

    /// Individual blocks cannot be freed; storage comes back on `reset`.
    fn free(&mut self, ptr: NonNull<u8>) {
        if !self.region.contains(ptr) {
            contract_violation(AllocatorKind::Linear, "free of a foreign pointer");
        }
    }

    fn realloc(&mut self, _ptr: NonNull<u8>, _new_size: usize) -> Option<NonNull<u8>> {
        None
    }

    fn reset(&mut self) {
        LinearAllocator::reset(self);
    }

    fn owns(&self, ptr: NonNull<u8>) -> bool {
        self.region.contains(ptr)
    }

    fn stats(&self) -> AllocatorStats {
        AllocatorStats {
            kind: AllocatorKind::Linear,
            capacity: self.capacity(),
            used: self.offset,
            live_allocations: self.allocations,
        }
    }

    fn bytes(&self, ptr: NonNull<u8>, len: usize) -> Option<&[u8]> {
        let offset = self.region.offset_of(ptr)?;
        if offset.checked_add(len)? > self.offset {
            return None;
        }
        self.region.bytes(offset, len)
    }

    fn bytes_mut(&mut self, ptr: NonNull<u8>, len: usize) -> Option<&mut [u8]> {
        let offset = self.region.offset_of(ptr)?;
        if offset.checked_add(len)? > self.offset {
            return None;
        }
        self.region.bytes_mut(offset, len)
    }
}
