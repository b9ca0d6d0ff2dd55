//! # Arena
//!
//! One fixed-size, contiguous reservation that allocators are carved from.

// SAFETY: This module owns the raw reservation and hands out disjoint views of it.
// All unsafe blocks are documented at the call site.
#![allow(unsafe_code)]
//!
//! ## Layout
//!
//! ```text
//! base                                                   base + capacity
//! ┌──────────────┬─────────────┬──────────────────┬ ─ ─ ─ ─ ─ ─ ─ ─ ┐
//! │ Section 0    │ Section 1   │ Section 2        │    remaining
//! │ (Linear)     │ (Pool)      │ (FreeList)       │
//! └──────────────┴─────────────┴──────────────────┴ ─ ─ ─ ─ ─ ─ ─ ─ ┘
//!                                                 ▲
//!                                               cursor
//! ```
//!
//! Sections are handed out by a bump cursor and never given back. The whole
//! reservation is released at once when the arena is dropped.
//!
//! ## Lifetimes
//!
//! Every [`Region`] borrows the arena it was carved from, so an arena cannot
//! be destroyed while any allocator built on it is still alive.

use std::alloc::{alloc_zeroed, dealloc, Layout};
use std::cell::{Cell, RefCell};
use std::ptr::NonNull;

use crate::error::{MemoryError, MemoryResult};

use super::region::Region;
use super::traits::AllocatorKind;

/// Default alignment of the arena base address.
pub const DEFAULT_ALIGNMENT: usize = 16;

/// Maximum number of allocator sections one arena can host.
pub const MAX_SECTIONS: usize = 16;

/// A carved-out section of an arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Section {
    /// Kind of allocator that owns the section.
    pub kind: AllocatorKind,
    /// Byte offset of the section from the arena base.
    pub offset: usize,
    /// Size of the section in bytes.
    pub size: usize,
}

impl Section {
    /// One past the last byte offset of the section.
    #[inline]
    #[must_use]
    pub const fn end(&self) -> usize {
        self.offset + self.size
    }
}

/// A fixed-capacity backing reservation.
///
/// # Thread Safety
///
/// The arena is NOT thread-safe. It is created once at start-up, carved by
/// allocator constructors, and then only read for diagnostics.
///
/// # Example
///
/// ```rust
/// use cinder_core::memory::{Arena, LinearAllocator};
/// use cinder_core::memory::units::kilobytes;
///
/// let arena = Arena::new(kilobytes(64)).expect("reservation");
/// let mut frame = LinearAllocator::new(&arena, kilobytes(16)).expect("section");
/// assert!(frame.alloc(256).is_some());
/// assert_eq!(arena.remaining(), kilobytes(48));
/// ```
pub struct Arena {
    /// Start of the reservation.
    base: NonNull<u8>,
    /// Layout used for the reservation (needed to release it).
    layout: Layout,
    /// Bytes consumed by carve-outs.
    cursor: Cell<usize>,
    /// Sections carved so far, in address order.
    sections: RefCell<Vec<Section>>,
}

impl Arena {
    /// Reserves `capacity` bytes aligned to [`DEFAULT_ALIGNMENT`].
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError::ReservationFailed`] if the reservation cannot
    /// be obtained.
    pub fn new(capacity: usize) -> MemoryResult<Self> {
        Self::with_alignment(capacity, DEFAULT_ALIGNMENT)
    }

    /// Reserves `capacity` bytes with the base aligned to `alignment`.
    ///
    /// The reservation is zero-initialized.
    ///
    /// # Errors
    ///
    /// - [`MemoryError::InvalidAlignment`] if `alignment` is not a power of two.
    /// - [`MemoryError::ReservationFailed`] if `capacity` is zero, does not
    ///   form a valid layout, or the system refuses the reservation.
    pub fn with_alignment(capacity: usize, alignment: usize) -> MemoryResult<Self> {
        if !alignment.is_power_of_two() {
            return Err(MemoryError::InvalidAlignment(alignment));
        }
        let failed = MemoryError::ReservationFailed {
            requested: capacity,
        };
        if capacity == 0 {
            return Err(failed);
        }
        let layout = Layout::from_size_align(capacity, alignment).map_err(|_| failed.clone())?;

        // SAFETY: layout has a non-zero size (checked above).
        let ptr = unsafe { alloc_zeroed(layout) };
        let base = NonNull::new(ptr).ok_or(failed)?;

        tracing::debug!(capacity, alignment, "arena reserved");

        Ok(Self {
            base,
            layout,
            cursor: Cell::new(0),
            sections: RefCell::new(Vec::with_capacity(MAX_SECTIONS)),
        })
    }

    /// Returns the total capacity in bytes.
    #[inline]
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.layout.size()
    }

    /// Returns the alignment of the base address.
    #[inline]
    #[must_use]
    pub const fn alignment(&self) -> usize {
        self.layout.align()
    }

    /// Returns the bytes consumed by carve-outs.
    #[inline]
    #[must_use]
    pub fn used(&self) -> usize {
        self.cursor.get()
    }

    /// Returns the bytes still available for carve-outs.
    #[inline]
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.capacity() - self.used()
    }

    /// Returns a snapshot of every section carved so far.
    #[must_use]
    pub fn sections(&self) -> Vec<Section> {
        self.sections.borrow().clone()
    }

    /// Finds the section that owns `ptr`, if any.
    #[must_use]
    pub fn section_of(&self, ptr: NonNull<u8>) -> Option<Section> {
        let offset = (ptr.as_ptr() as usize).checked_sub(self.base.as_ptr() as usize)?;
        if offset >= self.used() {
            return None;
        }
        let sections = self.sections.borrow();
        let index = sections.partition_point(|section| section.end() <= offset);
        sections
            .get(index)
            .filter(|section| section.offset <= offset)
            .copied()
    }

    /// Carves a section of `size` bytes for an allocator of `kind`.
    ///
    /// Called exactly once per allocator construction.
    ///
    /// # Errors
    ///
    /// - [`MemoryError::TooManySections`] if the arena already hosts
    ///   [`MAX_SECTIONS`] sections.
    /// - [`MemoryError::OutOfSpace`] if `size` exceeds the remaining capacity.
    pub fn carve(&self, size: usize, kind: AllocatorKind) -> MemoryResult<Region<'_>> {
        let mut sections = self.sections.borrow_mut();
        if sections.len() >= MAX_SECTIONS {
            return Err(MemoryError::TooManySections {
                limit: MAX_SECTIONS,
            });
        }

        let remaining = self.remaining();
        if size > remaining {
            return Err(MemoryError::OutOfSpace {
                requested: size,
                remaining,
            });
        }

        let offset = self.cursor.get();
        self.cursor.set(offset + size);
        sections.push(Section { kind, offset, size });

        tracing::trace!(?kind, offset, size, "arena section carved");

        // SAFETY: `offset + size <= capacity`, so the range lies inside the
        // reservation. The cursor only moves forward, so this range is
        // disjoint from every other region handed out. The region borrows
        // `self`, so the reservation outlives it.
        Ok(unsafe { Region::from_raw_parts(self.base.as_ptr().add(offset), offset, size) })
    }

    /// Releases the reservation.
    ///
    /// Equivalent to dropping the arena; the borrow checker guarantees no
    /// allocator carved from it is still alive.
    pub fn destroy(self) {
        drop(self);
    }
}

impl Drop for Arena {
    fn drop(&mut self) {
        tracing::debug!(
            capacity = self.capacity(),
            used = self.used(),
            "arena released"
        );
        // SAFETY: `base` was returned by `alloc_zeroed` with exactly this layout.
        unsafe {
            dealloc(self.base.as_ptr(), self.layout);
        }
    }
}

impl std::fmt::Debug for Arena {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Arena")
            .field("capacity", &self.capacity())
            .field("used", &self.used())
            .field("sections", &self.sections.borrow().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::units::{kilobytes, megabytes};

    #[test]
    fn test_arena_creation() {
        let arena = Arena::new(megabytes(1)).unwrap();
        assert_eq!(arena.capacity(), megabytes(1));
        assert_eq!(arena.used(), 0);
        assert_eq!(arena.alignment(), DEFAULT_ALIGNMENT);
    }

    #[test]
    fn test_arena_reservation_failure() {
        assert_eq!(
            Arena::new(usize::MAX).unwrap_err(),
            MemoryError::ReservationFailed {
                requested: usize::MAX
            }
        );
        assert!(Arena::new(0).is_err());
        assert_eq!(
            Arena::with_alignment(1024, 3).unwrap_err(),
            MemoryError::InvalidAlignment(3)
        );
    }

    #[test]
    fn test_arena_carve_and_exhaustion() {
        let arena = Arena::new(kilobytes(4)).unwrap();

        let first = arena.carve(kilobytes(1), AllocatorKind::Linear).unwrap();
        let second = arena.carve(kilobytes(3), AllocatorKind::Pool).unwrap();
        assert_eq!(first.arena_offset(), 0);
        assert_eq!(second.arena_offset(), kilobytes(1));
        assert_eq!(arena.remaining(), 0);

        let err = arena.carve(1, AllocatorKind::Linear).unwrap_err();
        assert_eq!(
            err,
            MemoryError::OutOfSpace {
                requested: 1,
                remaining: 0
            }
        );
        // A failed carve leaves the cursor untouched.
        assert_eq!(arena.used(), kilobytes(4));
    }

    #[test]
    fn test_arena_section_limit() {
        let arena = Arena::new(kilobytes(4)).unwrap();
        let regions: Vec<_> = (0..MAX_SECTIONS)
            .map(|_| arena.carve(8, AllocatorKind::Linear).unwrap())
            .collect();
        assert_eq!(regions.len(), MAX_SECTIONS);
        assert_eq!(
            arena.carve(8, AllocatorKind::Linear).unwrap_err(),
            MemoryError::TooManySections {
                limit: MAX_SECTIONS
            }
        );
    }

    #[test]
    fn test_arena_section_lookup() {
        let arena = Arena::new(kilobytes(4)).unwrap();
        let linear = arena.carve(kilobytes(1), AllocatorKind::Linear).unwrap();
        let pool = arena.carve(kilobytes(1), AllocatorKind::Pool).unwrap();

        let found = arena.section_of(pool.ptr_at(10)).unwrap();
        assert_eq!(found.kind, AllocatorKind::Pool);
        assert_eq!(found.offset, kilobytes(1));

        let found = arena.section_of(linear.ptr_at(0)).unwrap();
        assert_eq!(found.kind, AllocatorKind::Linear);

        // Past the cursor nothing is owned.
        assert!(arena.section_of(pool.ptr_at(pool.len())).is_none());
        assert_eq!(arena.sections().len(), 2);
    }
}
