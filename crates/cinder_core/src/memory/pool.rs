//! # Pool Allocator
//!
//! Fixed-size block allocator for objects that are frequently allocated and freed.

use std::ptr::NonNull;

use serde::Deserialize;

use crate::error::MemoryResult;

use super::arena::Arena;
use super::slot_table::{SegmentStats, SlotTable};
use super::traits::{Allocator, AllocatorKind, AllocatorStats};

/// One pool region declaration.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
pub struct PoolRegion {
    /// Size of every block in the region, in bytes.
    pub block_size: usize,
    /// Number of blocks in the region.
    pub count: usize,
}

impl PoolRegion {
    /// Creates a region declaration.
    #[must_use]
    pub const fn new(block_size: usize, count: usize) -> Self {
        Self { block_size, count }
    }
}

/// A pool allocator over one or more fixed-size block regions.
///
/// Requests bind to the first declared region whose block size can hold
/// them; a full region does not spill into a larger one. Freed blocks are
/// reused LIFO, so the most recently freed block comes back first.
///
/// # Thread Safety
///
/// This pool is NOT thread-safe. Use one pool per thread or wrap it in a
/// [`SharedAllocator`](super::SharedAllocator).
///
/// # Example
///
/// ```rust
/// use cinder_core::memory::{Arena, PoolAllocator, PoolRegion};
///
/// let arena = Arena::new(64 * 1024).expect("reservation");
/// let mut pool = PoolAllocator::with_regions(
///     &arena,
///     &[PoolRegion::new(128, 100), PoolRegion::new(256, 100)],
/// )
/// .expect("section");
///
/// // Allocate - O(log regions), no system allocator call
/// let a = pool.alloc(100).expect("block");
///
/// // Free - O(1)
/// pool.free(a);
/// assert_eq!(pool.alloc(128), Some(a));
/// ```
#[derive(Debug)]
pub struct PoolAllocator<'a> {
    /// Segmented block storage.
    slots: SlotTable<'a>,
}

impl<'a> PoolAllocator<'a> {
    /// Creates a single-region pool of `count` blocks of `block_size` bytes.
    ///
    /// # Arguments
    ///
    /// * `arena` - Arena to carve `block_size * count` bytes from
    /// * `block_size` - Size of every block, at least one machine word
    /// * `count` - Number of blocks
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError::InvalidConfig`](crate::error::MemoryError::InvalidConfig)
    /// for a block size below one machine word or a zero count, and the
    /// arena's carve error if the section does not fit.
    pub fn new(arena: &'a Arena, block_size: usize, count: usize) -> MemoryResult<Self> {
        Self::with_regions(arena, &[PoolRegion::new(block_size, count)])
    }

    /// Creates a pool with several regions carved as one contiguous section.
    ///
    /// Regions must be declared in ascending block-size order.
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError::InvalidConfig`](crate::error::MemoryError::InvalidConfig)
    /// for an empty or unordered declaration list, and the arena's carve
    /// error if the section does not fit.
    pub fn with_regions(arena: &'a Arena, regions: &[PoolRegion]) -> MemoryResult<Self> {
        let classes: Vec<(usize, usize)> = regions.iter().map(|r| (r.block_size, r.count)).collect();
        Ok(Self {
            slots: SlotTable::new(arena, &classes, AllocatorKind::Pool)?,
        })
    }

    /// Allocates a block able to hold `size` bytes.
    ///
    /// This is a **O(log regions)** operation that never touches the system
    /// allocator.
    ///
    /// # Returns
    ///
    /// `None` if no region's block size can hold `size`, or the region it
    /// binds to is full.
    #[inline]
    pub fn alloc(&mut self, size: usize) -> Option<NonNull<u8>> {
        let region = self.slots.first_fit(size)?;
        self.slots.pop(region)
    }

    /// Returns a block to the region that owns it.
    ///
    /// This is a **O(log regions)** operation; the block is reused first.
    #[inline]
    pub fn free(&mut self, ptr: NonNull<u8>) {
        if let Some(slot) = self.slots.locate_live(ptr, "free") {
            self.slots.push(slot);
        }
    }

    /// Resizes a block.
    ///
    /// If `new_size` still fits the current block the same pointer comes
    /// back. Otherwise the data moves to the first region that can hold
    /// `new_size`.
    ///
    /// # Returns
    ///
    /// `None`, with the original block untouched, if no region can hold
    /// `new_size` or that region is full.
    pub fn realloc(&mut self, ptr: NonNull<u8>, new_size: usize) -> Option<NonNull<u8>> {
        let slot = self.slots.locate_live(ptr, "realloc")?;
        let current = self.slots.block_size(slot.segment);
        if new_size <= current {
            return Some(ptr);
        }
        let target = self.slots.first_fit(new_size)?;
        self.slots.relocate(slot, target, current)
    }

    /// Returns every block to its region's free list.
    pub fn reset(&mut self) {
        self.slots.reset();
    }

    /// Per-region usage, in declaration order.
    #[must_use]
    pub fn segments(&self) -> Vec<SegmentStats> {
        (0..self.slots.len()).map(|i| self.slots.segment_stats(i)).collect()
    }

    /// Free blocks of `region` in the order they will be handed out.
    ///
    /// # Panics
    ///
    /// Panics if `region` is out of range.
    #[must_use]
    pub fn free_slots(&self, region: usize) -> Vec<NonNull<u8>> {
        self.slots.free_slots(region)
    }

    /// Block size of the region owning `ptr`.
    #[must_use]
    pub fn block_size_of(&self, ptr: NonNull<u8>) -> Option<usize> {
        let slot = self.slots.locate(ptr)?;
        Some(self.slots.block_size(slot.segment))
    }
}

impl Allocator for PoolAllocator<'_> {
    fn kind(&self) -> AllocatorKind {
        AllocatorKind::Pool
    }

    fn alloc(&mut self, size: usize) -> Option<NonNull<u8>> {
        PoolAllocator::alloc(self, size)
    }

    fn free(&mut self, ptr: NonNull<u8>) {
        PoolAllocator::free(self, ptr);
    }

    fn realloc(&mut self, ptr: NonNull<u8>, new_size: usize) -> Option<NonNull<u8>> {
        PoolAllocator::realloc(self, ptr, new_size)
    }

    fn reset(&mut self) {
        PoolAllocator::reset(self);
    }

    fn owns(&self, ptr: NonNull<u8>) -> bool {
        self.slots.owns(ptr)
    }

    fn stats(&self) -> AllocatorStats {
        self.slots.stats()
    }

    fn bytes(&self, ptr: NonNull<u8>, len: usize) -> Option<&[u8]> {
        self.slots.bytes(ptr, len)
    }

    fn bytes_mut(&mut self, ptr: NonNull<u8>, len: usize) -> Option<&mut [u8]> {
        self.slots.bytes_mut(ptr, len)
    }
}
