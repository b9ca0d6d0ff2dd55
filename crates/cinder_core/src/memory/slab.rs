//! # Slab Allocator
//!
//! Size-class allocator: each slab serves one block size with its own free
//! list, and requests go to the smallest class that can hold them.
//!
//! Slabs are carved contiguously in ascending block-size order. A pointer is mapped
//! back to its slab and slot purely from its address, so blocks carry no
//! header.

use std::ptr::NonNull;

use serde::Deserialize;

use crate::error::MemoryResult;

use super::arena::Arena;
use super::slot_table::{SegmentStats, SlotTable};
use super::traits::{Allocator, AllocatorKind, AllocatorStats};

/// One slab declaration.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
pub struct SlabDeclaration {
    /// Block size served by the slab, in bytes.
    pub block_size: usize,
    /// Number of blocks in the slab.
    pub count: usize,
}

impl SlabDeclaration {
    /// Creates a slab declaration.
    #[must_use]
    pub const fn new(block_size: usize, count: usize) -> Self {
        Self { block_size, count }
    }
}

/// A multi-class fixed-block allocator.
///
/// # Example
///
/// ```rust
/// use cinder_core::memory::{Arena, SlabAllocator, SlabDeclaration};
///
/// let arena = Arena::new(64 * 1024).expect("reservation");
/// let mut slab = SlabAllocator::new(
///     &arena,
///     &[SlabDeclaration::new(64, 10), SlabDeclaration::new(128, 10)],
/// )
/// .expect("section");
///
/// let a = slab.alloc(64).expect("block");
/// let b = slab.alloc(64).expect("block");
/// assert_eq!(b.as_ptr() as usize - a.as_ptr() as usize, 64);
///
/// // Growing past the 64-byte class moves the block.
/// let moved = slab.realloc(a, 65).expect("128-byte class");
/// assert_eq!(slab.size_of(moved), Some(128));
/// ```
#[derive(Debug)]
pub struct SlabAllocator<'a> {
    /// Segmented block storage, one segment per slab.
    slots: SlotTable<'a>,
}

impl<'a> SlabAllocator<'a> {
    /// Creates one slab per declaration.
    ///
    /// Declarations may come in any order; slabs are laid out by ascending
    /// block size, ties keeping their declared order.
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError::InvalidConfig`](crate::error::MemoryError::InvalidConfig)
    /// for an empty or degenerate declaration list, and the arena's carve
    /// error if the section does not fit.
    pub fn new(arena: &'a Arena, declarations: &[SlabDeclaration]) -> MemoryResult<Self> {
        let mut classes: Vec<(usize, usize)> = declarations
            .iter()
            .map(|d| (d.block_size, d.count))
            .collect();
        classes.sort_by_key(|&(block_size, _)| block_size);
        Ok(Self {
            slots: SlotTable::new(arena, &classes, AllocatorKind::Slab)?,
        })
    }

    /// Allocates from the smallest slab whose block size can hold `size`.
    ///
    /// Returns `None` if no slab is large enough or that slab is exhausted;
    /// an exhausted slab does not overflow into the next larger one.
    #[inline]
    pub fn alloc(&mut self, size: usize) -> Option<NonNull<u8>> {
        let slab = self.slots.first_fit(size)?;
        self.slots.pop(slab)
    }

    /// Returns a block to its slab. The next allocation of that class gets it back.
    #[inline]
    pub fn free(&mut self, ptr: NonNull<u8>) {
        if let Some(slot) = self.slots.locate_live(ptr, "free") {
            self.slots.push(slot);
        }
    }

    /// Moves a block to the tightest slab for `new_size`.
    ///
    /// The same pointer comes back when the current slab already is the
    /// tightest fit, or when shrinking and the smaller slab is exhausted.
    /// Returns `None`, leaving the block untouched, when `new_size` exceeds
    /// every slab or a larger target slab is exhausted.
    pub fn realloc(&mut self, ptr: NonNull<u8>, new_size: usize) -> Option<NonNull<u8>> {
        let slot = self.slots.locate_live(ptr, "realloc")?;
        let current = self.slots.block_size(slot.segment);
        let target = self.slots.first_fit(new_size)?;
        let target_size = self.slots.block_size(target);
        if target_size == current {
            return Some(ptr);
        }

        let shrinking = target_size < current;
        match self.slots.relocate(slot, target, current.min(new_size)) {
            Some(moved) => Some(moved),
            None if shrinking => Some(ptr),
            None => None,
        }
    }

    /// Returns every block to its slab.
    pub fn reset(&mut self) {
        self.slots.reset();
    }

    /// Block size of the slab owning `ptr`.
    #[must_use]
    pub fn size_of(&self, ptr: NonNull<u8>) -> Option<usize> {
        let slot = self.slots.locate(ptr)?;
        Some(self.slots.block_size(slot.segment))
    }

    /// Per-slab usage, in ascending block-size order.
    #[must_use]
    pub fn slabs(&self) -> Vec<SegmentStats> {
        (0..self.slots.len()).map(|i| self.slots.segment_stats(i)).collect()
    }
}

impl Allocator for SlabAllocator<'_> {
    fn kind(&self) -> AllocatorKind {
        AllocatorKind::Slab
    }

    fn alloc(&mut self, size: usize) -> Option<NonNull<u8>> {
        SlabAllocator::alloc(self, size)
    }

    fn free(&mut self, ptr: NonNull<u8>) {
        SlabAllocator::free(self, ptr);
    }

    fn realloc(&mut self, ptr: NonNull<u8>, new_size: usize) -> Option<NonNull<u8>> {
        SlabAllocator::realloc(self, ptr, new_size)
    }

    fn reset(&mut self) {
        SlabAllocator::reset(self);
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::units::megabytes;

    fn classes() -> [SlabDeclaration; 4] {
        [
            SlabDeclaration::new(64, 10),
            SlabDeclaration::new(128, 10),
            SlabDeclaration::new(256, 10),
            SlabDeclaration::new(512, 10),
        ]
    }

    #[test]
    fn test_slab_contiguous_bump_and_reuse() {
        let arena = Arena::new(megabytes(1)).unwrap();
        let mut slab = SlabAllocator::new(&arena, &classes()).unwrap();

        let a = slab.alloc(64).unwrap();
        let b = slab.alloc(64).unwrap();
        assert_eq!(b.as_ptr() as usize - a.as_ptr() as usize, 64);

        slab.free(a);
        assert_eq!(slab.alloc(64), Some(a));
    }

    #[test]
    fn test_slab_picks_smallest_class() {
        let arena = Arena::new(megabytes(1)).unwrap();
        let mut slab = SlabAllocator::new(&arena, &classes()).unwrap();

        let p = slab.alloc(200).unwrap();
        assert_eq!(slab.size_of(p), Some(256));
        assert!(slab.alloc(513).is_none());
        assert_eq!(slab.slabs()[2].live_count(), 1);
    }

    #[test]
    fn test_slab_exhaustion_does_not_overflow() {
        let arena = Arena::new(megabytes(1)).unwrap();
        let mut slab = SlabAllocator::new(&arena, &classes()).unwrap();

        for _ in 0..10 {
            slab.alloc(64).unwrap();
        }
        assert!(slab.alloc(64).is_none());
        assert_eq!(slab.slabs()[1].live_count(), 0);
    }

    #[test]
    fn test_slab_realloc_moves_between_classes() {
        let arena = Arena::new(megabytes(1)).unwrap();
        let mut slab = SlabAllocator::new(&arena, &classes()).unwrap();

        let ptr = slab.alloc(64).unwrap();
        slab.bytes_mut(ptr, 64).unwrap().fill(7);

        let grown = slab.realloc(ptr, 65).unwrap();
        assert_ne!(grown, ptr);
        assert_eq!(slab.size_of(grown), Some(128));
        assert!(slab.bytes(grown, 64).unwrap().iter().all(|&b| b == 7));

        // Still the tightest class: stays put.
        assert_eq!(slab.realloc(grown, 66), Some(grown));

        let shrunk = slab.realloc(grown, 64).unwrap();
        assert_ne!(shrunk, grown);
        assert_eq!(slab.size_of(shrunk), Some(64));
        assert!(slab.bytes(shrunk, 64).unwrap().iter().all(|&b| b == 7));
        assert_eq!(slab.stats().live_allocations, 1);
    }

    #[test]
    fn test_slab_realloc_edges() {
        let arena = Arena::new(megabytes(1)).unwrap();
        let mut slab = SlabAllocator::new(
            &arena,
            &[SlabDeclaration::new(32, 1), SlabDeclaration::new(64, 1)],
        )
        .unwrap();

        let small = slab.alloc(32).unwrap();
        let large = slab.alloc(64).unwrap();

        // Beyond every slab.
        assert!(slab.realloc(large, 65).is_none());
        // Shrink target exhausted: keep the larger block.
        assert_eq!(slab.realloc(large, 16), Some(large));
        // Grow target exhausted.
        assert!(slab.realloc(small, 64).is_none());
        assert_eq!(slab.size_of(small), Some(32));
    }

    #[test]
    fn test_slab_sorts_declarations() {
        let arena = Arena::new(megabytes(1)).unwrap();
        let mut slab = SlabAllocator::new(
            &arena,
            &[
                SlabDeclaration::new(256, 2),
                SlabDeclaration::new(64, 4),
                SlabDeclaration::new(128, 3),
            ],
        )
        .unwrap();

        let sizes: Vec<_> = slab.slabs().iter().map(|s| s.block_size).collect();
        assert_eq!(sizes, [64, 128, 256]);
        assert_eq!(slab.slabs()[1].offset, 64 * 4);

        let p = slab.alloc(100).unwrap();
        assert_eq!(slab.size_of(p), Some(128));
        assert_eq!(slab.alloc(10).map(|q| slab.size_of(q)), Some(Some(64)));
    }

    #[test]
    fn test_slab_freed_block_bytes_withheld() {
        let arena = Arena::new(megabytes(1)).unwrap();
        let mut slab = SlabAllocator::new(&arena, &classes()).unwrap();

        let ptr = slab.alloc(100).unwrap();
        slab.bytes_mut(ptr, 8).unwrap().fill(0xAA);
        slab.free(ptr);

        assert!(slab.bytes(ptr, 8).is_none());
        assert!(slab.bytes_mut(ptr, 8).is_none());
        assert!(slab.read_pod::<u64>(ptr).is_none());
        assert!(!slab.write_pod(ptr, &0xAAAA_AAAA_u64));

        // The free list is intact: both blocks of the class come back in order.
        assert_eq!(slab.alloc(100), Some(ptr));
        assert!(slab.alloc(100).is_some());
    }

    #[test]
    #[cfg(not(debug_assertions))]
    fn test_slab_bad_pointers_ignored_in_release() {
        let arena = Arena::new(megabytes(1)).unwrap();
        let other = Arena::new(4096).unwrap();
        let mut foreign_pool = crate::memory::PoolAllocator::new(&other, 64, 1).unwrap();
        let foreign = foreign_pool.alloc(64).unwrap();
        let mut slab = SlabAllocator::new(&arena, &classes()).unwrap();

        let ptr = slab.alloc(64).unwrap();
        slab.free(foreign);
        assert!(slab.realloc(foreign, 128).is_none());
        assert_eq!(slab.stats().live_allocations, 1);

        slab.free(ptr);
        slab.free(ptr);
        assert!(slab.realloc(ptr, 128).is_none());
        assert_eq!(slab.slabs()[0].free_count, 10);
        assert_eq!(slab.alloc(64), Some(ptr));
    }

    #[test]
    fn test_slab_reset() {
        let arena = Arena::new(megabytes(1)).unwrap();
        let mut slab = SlabAllocator::new(&arena, &classes()).unwrap();

        let first = slab.alloc(64).unwrap();
        slab.alloc(300).unwrap();
        slab.reset();

        assert_eq!(slab.stats().used, 0);
        assert_eq!(slab.alloc(64), Some(first));
    }
}
