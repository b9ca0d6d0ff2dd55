//! # Region
//!
//! Bounds-checked view over one arena section.

// SAFETY: This is the only place allocator bookkeeping touches raw memory.
// Every access is checked against the region bounds before it happens.
#![allow(unsafe_code)]
//!
//! Allocators never reinterpret their memory as typed structs. Free-list
//! links, slot links and block headers are plain machine words read and
//! written at byte offsets through this type:
//!
//! ```text
//! Region (offsets relative to the section start)
//! ┌────────┬────────┬────────┬─────────────────────────┐
//! │ word @0│ word @8│ ...    │ caller bytes            │
//! └────────┴────────┴────────┴─────────────────────────┘
//!   read_word / write_word      bytes / bytes_mut
//! ```

use std::marker::PhantomData;
use std::ptr::{self, NonNull};

use super::arena::Arena;

/// Size of one bookkeeping word in bytes.
pub const WORD: usize = std::mem::size_of::<usize>();

/// Exclusive view over a carved arena section.
pub struct Region<'a> {
    /// First byte of the section.
    base: NonNull<u8>,
    /// Offset of the section inside its arena.
    arena_offset: usize,
    /// Section length in bytes.
    len: usize,
    /// Ties the view to the arena that owns the memory.
    _arena: PhantomData<&'a Arena>,
}

// SAFETY: a region is the sole handle to its byte range and carries no
// reference to the arena's interior state, so moving it to another thread
// cannot race with anything. The lifetime keeps the reservation alive.
unsafe impl Send for Region<'_> {}

impl<'a> Region<'a> {
    /// Builds a region from raw parts.
    ///
    /// # Safety
    ///
    /// `base..base + len` must be valid for reads and writes for `'a`, and no
    /// other live region may overlap it.
    pub(crate) unsafe fn from_raw_parts(base: *mut u8, arena_offset: usize, len: usize) -> Self {
        Self {
            // SAFETY: caller guarantees `base` points into a live reservation.
            base: NonNull::new_unchecked(base),
            arena_offset,
            len,
            _arena: PhantomData,
        }
    }

    /// Returns the region length in bytes.
    #[inline]
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if the region is empty.
    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns the offset of the region inside its arena.
    #[inline]
    #[must_use]
    pub const fn arena_offset(&self) -> usize {
        self.arena_offset
    }

    /// Returns the absolute address of the first byte.
    #[inline]
    #[must_use]
    pub fn base_addr(&self) -> usize {
        self.base.as_ptr() as usize
    }

    /// Returns a pointer `offset` bytes into the region.
    ///
    /// `offset == len()` yields the one-past-the-end pointer.
    ///
    /// # Panics
    ///
    /// Panics if `offset > len()`.
    #[inline]
    #[must_use]
    pub fn ptr_at(&self, offset: usize) -> NonNull<u8> {
        assert!(offset <= self.len, "region offset {offset} out of bounds");
        // SAFETY: offset is within the region (or one past its end), so the
        // result stays inside the same allocation and is non-null.
        unsafe { NonNull::new_unchecked(self.base.as_ptr().add(offset)) }
    }

    /// Maps `ptr` back to its offset, if it lies inside the region.
    #[inline]
    #[must_use]
    pub fn offset_of(&self, ptr: NonNull<u8>) -> Option<usize> {
        let offset = (ptr.as_ptr() as usize).checked_sub(self.base_addr())?;
        (offset < self.len).then_some(offset)
    }

    /// Returns `true` if `ptr` lies inside the region.
    #[inline]
    #[must_use]
    pub fn contains(&self, ptr: NonNull<u8>) -> bool {
        self.offset_of(ptr).is_some()
    }

    /// Checks that `offset..offset + len` lies inside the region.
    #[inline]
    fn check_range(&self, offset: usize, len: usize) -> bool {
        offset.checked_add(len).is_some_and(|end| end <= self.len)
    }

    /// Reads the bookkeeping word stored at `offset`.
    ///
    /// # Panics
    ///
    /// Panics if the word does not fit inside the region.
    #[inline]
    #[must_use]
    pub fn read_word(&self, offset: usize) -> usize {
        assert!(
            self.check_range(offset, WORD),
            "word read at {offset} out of bounds"
        );
        // SAFETY: the word lies inside the region (checked above). Unaligned
        // reads are used because caller offsets carry no alignment promise.
        unsafe { ptr::read_unaligned(self.base.as_ptr().add(offset).cast::<usize>()) }
    }

    /// Writes a bookkeeping word at `offset`.
    ///
    /// # Panics
    ///
    /// Panics if the word does not fit inside the region.
    #[inline]
    pub fn write_word(&mut self, offset: usize, value: usize) {
        assert!(
            self.check_range(offset, WORD),
            "word write at {offset} out of bounds"
        );
        // SAFETY: the word lies inside the region (checked above) and the
        // region is borrowed mutably.
        unsafe { ptr::write_unaligned(self.base.as_ptr().add(offset).cast::<usize>(), value) }
    }

    /// Copies `len` bytes from `src` to `dst`; the ranges may overlap.
    ///
    /// # Panics
    ///
    /// Panics if either range leaves the region.
    #[inline]
    pub fn copy_within(&mut self, src: usize, dst: usize, len: usize) {
        assert!(
            self.check_range(src, len) && self.check_range(dst, len),
            "copy of {len} bytes from {src} to {dst} out of bounds"
        );
        // SAFETY: both ranges lie inside the region (checked above);
        // `ptr::copy` tolerates overlap.
        unsafe {
            let base = self.base.as_ptr();
            ptr::copy(base.add(src), base.add(dst), len);
        }
    }

    /// Borrows `len` bytes starting at `offset`.
    #[inline]
    #[must_use]
    pub fn bytes(&self, offset: usize, len: usize) -> Option<&[u8]> {
        if !self.check_range(offset, len) {
            return None;
        }
        // SAFETY: the range lies inside the region and `self` is borrowed
        // for the lifetime of the slice.
        Some(unsafe { std::slice::from_raw_parts(self.base.as_ptr().add(offset), len) })
    }

    /// Mutably borrows `len` bytes starting at `offset`.
    #[inline]
    pub fn bytes_mut(&mut self, offset: usize, len: usize) -> Option<&mut [u8]> {
        if !self.check_range(offset, len) {
            return None;
        }
        // SAFETY: the range lies inside the region and `self` is borrowed
        // mutably for the lifetime of the slice.
        Some(unsafe { std::slice::from_raw_parts_mut(self.base.as_ptr().add(offset), len) })
    }
}

impl std::fmt::Debug for Region<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Region")
            .field("arena_offset", &self.arena_offset)
            .field("len", &self.len)
            .finish()
    }
}
