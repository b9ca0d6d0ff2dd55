//! # Free-List Allocator
//!
//! General-purpose variable-size allocation over one arena section.
//!
//! ## Block layout
//!
//! Every block starts with a one-word header holding its span (header
//! included) and two flag bits. Spans are multiples of the allocator's
//! alignment, so the low bits are always free for flags.
//!
//! ```text
//! live block                          free block
//! ┌────────┬──────────────────────┐   ┌────────┬──────┬──────┬─────┬────────┐
//! │ header │ payload ...          │   │ header │ prev │ next │ ... │ footer │
//! └────────┴──────────────────────┘   └────────┴──────┴──────┴─────┴────────┘
//!  span | PREV_FREE                    span | FREE                  span
//! ```
//!
//! Free blocks are linked into a doubly-linked list through the words after
//! their header and repeat their span in a footer, so the block after a free
//! block can find its start. `PREV_FREE` on a header says whether that footer
//! exists.
//!
//! ## Policy
//!
//! - `alloc` is first fit. A block is split when the rest can host a free
//!   block, otherwise it is handed out whole.
//! - `free` coalesces with both physical neighbours at once, so no two free
//!   blocks are ever adjacent.
//! - `realloc` keeps the pointer when the block already fits (returning a
//!   large enough tail to the free list), then tries to absorb the following
//!   free block, and only then moves. A free block *before* the current one
//!   is never absorbed: if only a backward merge could satisfy the request,
//!   `realloc` moves or returns `None`.

use std::ptr::NonNull;

use crate::error::{MemoryError, MemoryResult};

use super::arena::Arena;
use super::region::{Region, WORD};
use super::traits::{contract_violation, Allocator, AllocatorKind, AllocatorStats};

/// Size of a live block header.
pub const HEADER: usize = WORD;

const FREE: usize = 0b01;
const PREV_FREE: usize = 0b10;
const FLAGS: usize = FREE | PREV_FREE;
const NIL: usize = usize::MAX;

/// Offsets of the list links inside a free block.
const PREV_LINK: usize = WORD;
const NEXT_LINK: usize = 2 * WORD;

#[inline]
fn align_up(value: usize, align: usize) -> Option<usize> {
    Some(value.checked_add(align - 1)? & !(align - 1))
}

#[inline]
const fn span_of(word: usize) -> usize {
    word & !FLAGS
}

/// A first-fit allocator with splitting and coalescing.
///
/// # Example
///
/// ```rust
/// use cinder_core::memory::{Arena, FreeListAllocator};
///
/// let arena = Arena::new(16 * 1024).expect("reservation");
/// let mut general = FreeListAllocator::new(&arena, 8 * 1024, 16).expect("section");
///
/// let ptr = general.alloc(100).expect("block");
/// assert_eq!(ptr.as_ptr() as usize % 16, 0);
///
/// // Nothing follows the block, so it grows where it is.
/// assert_eq!(general.realloc(ptr, 2000), Some(ptr));
/// general.free(ptr);
/// assert_eq!(general.free_block_count(), 1);
/// ```
#[derive(Debug)]
pub struct FreeListAllocator<'a> {
    /// Backing section.
    region: Region<'a>,
    /// Payload alignment; every span is a multiple of it.
    align: usize,
    /// Smallest span able to hold a free block.
    min_span: usize,
    /// Offset of the first block header.
    heap_start: usize,
    /// One past the last block.
    heap_end: usize,
    /// First free block, or `NIL`.
    free_head: usize,
    /// Sum of live spans.
    used: usize,
    /// Number of live blocks.
    live: usize,
}

impl<'a> FreeListAllocator<'a> {
    /// Carves `size` bytes from `arena`, aligning every payload to
    /// `min_alignment`.
    ///
    /// The section starts as one free block. A few bytes at either end may be
    /// lost to alignment.
    ///
    /// # Errors
    ///
    /// - [`MemoryError::InvalidAlignment`] if `min_alignment` is not a power
    ///   of two or is below one machine word.
    /// - [`MemoryError::InvalidConfig`] if `size` cannot host a single block.
    /// - The arena's carve error if the section does not fit.
    pub fn new(arena: &'a Arena, size: usize, min_alignment: usize) -> MemoryResult<Self> {
        if !min_alignment.is_power_of_two() || min_alignment < WORD {
            return Err(MemoryError::InvalidAlignment(min_alignment));
        }
        let min_span =
            align_up(4 * WORD, min_alignment).ok_or(MemoryError::InvalidAlignment(min_alignment))?;
        if size < min_span.saturating_add(min_alignment) {
            return Err(MemoryError::InvalidConfig(format!(
                "free-list section of {size} bytes cannot host a block aligned to {min_alignment}"
            )));
        }

        let region = arena.carve(size, AllocatorKind::FreeList)?;
        let misalignment = (region.base_addr() + HEADER) % min_alignment;
        let heap_start = (min_alignment - misalignment) % min_alignment;
        let heap_end = heap_start + (size - heap_start) / min_alignment * min_alignment;

        let mut allocator = Self {
            region,
            align: min_alignment,
            min_span,
            heap_start,
            heap_end,
            free_head: NIL,
            used: 0,
            live: 0,
        };
        allocator.reset();

        tracing::debug!(
            offset = allocator.region.arena_offset(),
            size,
            alignment = min_alignment,
            heap = heap_end - heap_start,
            "free-list allocator initialized"
        );
        Ok(allocator)
    }

    /// Allocates `size` bytes from the first free block large enough.
    ///
    /// Returns `None` if no free block can hold the request.
    pub fn alloc(&mut self, size: usize) -> Option<NonNull<u8>> {
        let need = self.span_for(size)?;
        let mut cursor = self.free_head;
        while cursor != NIL {
            let span = span_of(self.region.read_word(cursor));
            if span >= need {
                let ptr = self.take(cursor, span, need);
                self.debug_check();
                return Some(ptr);
            }
            cursor = self.region.read_word(cursor + NEXT_LINK);
        }
        None
    }

    /// Frees a block and merges it with any free neighbour.
    pub fn free(&mut self, ptr: NonNull<u8>) {
        let Some((header, span)) = self.live_block(ptr, "free") else {
            return;
        };
        self.used -= span;
        self.live -= 1;
        self.release(header, span);
        self.debug_check();
    }

    /// Resizes a block.
    ///
    /// 1. Fits already: same pointer; a tail large enough for a free block is
    ///    returned to the free list.
    /// 2. The next block is free and large enough: absorb it, same pointer.
    /// 3. Otherwise allocate, copy `min(old capacity, new_size)` bytes, free
    ///    the old block.
    ///
    /// Returns `None`, leaving the block untouched, if step 3 cannot find room.
    pub fn realloc(&mut self, ptr: NonNull<u8>, new_size: usize) -> Option<NonNull<u8>> {
        let (header, span) = self.live_block(ptr, "realloc")?;
        let need = self.span_for(new_size)?;
        let flags = self.region.read_word(header) & PREV_FREE;

        if need <= span {
            let tail = span - need;
            if tail >= self.min_span {
                self.region.write_word(header, need | flags);
                self.region.write_word(header + need, tail);
                self.used -= tail;
                self.release(header + need, tail);
                self.debug_check();
            }
            return Some(ptr);
        }

        let next = header + span;
        if next < self.heap_end {
            let word = self.region.read_word(next);
            let combined = span + span_of(word);
            if word & FREE != 0 && combined >= need {
                self.unlink(next);
                if combined - need >= self.min_span {
                    self.region.write_word(header, need | flags);
                    let rest = header + need;
                    self.write_free(rest, combined - need);
                    self.link_front(rest);
                    self.used += need - span;
                } else {
                    self.region.write_word(header, combined | flags);
                    self.set_prev_free(header + combined, false);
                    self.used += combined - span;
                }
                self.debug_check();
                return Some(ptr);
            }
        }

        let moved = self.alloc(new_size)?;
        let dst = self.region.offset_of(moved)?;
        let len = (span - HEADER).min(new_size);
        self.region.copy_within(header + HEADER, dst, len);
        self.free(ptr);
        Some(moved)
    }

    /// Turns the whole section back into one free block.
    pub fn reset(&mut self) {
        let span = self.heap_end - self.heap_start;
        self.free_head = NIL;
        self.write_free(self.heap_start, span);
        self.link_front(self.heap_start);
        self.used = 0;
        self.live = 0;
    }

    /// Number of blocks on the free list.
    #[must_use]
    pub fn free_block_count(&self) -> usize {
        self.free_spans().count()
    }

    /// Largest request a single `alloc` could satisfy right now.
    #[must_use]
    pub fn largest_free_block(&self) -> usize {
        self.free_spans().max().map_or(0, |span| span - HEADER)
    }

    /// Payload capacity of the live block at `ptr`.
    #[must_use]
    pub fn usable_size(&self, ptr: NonNull<u8>) -> Option<usize> {
        self.block_of(ptr).ok().map(|(_, span)| span - HEADER)
    }

    /// Checks every structural invariant of the block chain and free list.
    ///
    /// Runs after every mutation when debug assertions are enabled.
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError::Corrupted`] describing the first inconsistency.
    pub fn validate(&self) -> MemoryResult<()> {
        let corrupted = |what: String| Err(MemoryError::Corrupted(what));

        let mut cursor = self.heap_start;
        let mut prev_free = false;
        let mut free_blocks = 0;
        let mut live_blocks = 0;
        let mut used = 0;
        while cursor < self.heap_end {
            let word = self.region.read_word(cursor);
            let span = span_of(word);
            if span < self.min_span || span % self.align != 0 || span > self.heap_end - cursor {
                return corrupted(format!("block at {cursor} has span {span}"));
            }
            if ((word & PREV_FREE) != 0) != prev_free {
                return corrupted(format!("block at {cursor} has a stale PREV_FREE bit"));
            }
            let free = (word & FREE) != 0;
            if free {
                if prev_free {
                    return corrupted(format!("free blocks adjacent at {cursor}"));
                }
                if self.region.read_word(cursor + span - WORD) != span {
                    return corrupted(format!("free block at {cursor} has a bad footer"));
                }
                free_blocks += 1;
            } else {
                live_blocks += 1;
                used += span;
            }
            prev_free = free;
            cursor += span;
        }
        if live_blocks != self.live || used != self.used {
            return corrupted(format!(
                "counters say {} live / {} used, blocks say {live_blocks} / {used}",
                self.live, self.used
            ));
        }

        let mut listed = 0;
        let mut prev = NIL;
        let mut node = self.free_head;
        while node != NIL {
            if listed == free_blocks {
                return corrupted("free list longer than the free blocks".into());
            }
            if node < self.heap_start || node > self.heap_end.saturating_sub(self.min_span) {
                return corrupted(format!("free list node {node} out of bounds"));
            }
            if (self.region.read_word(node) & FREE) == 0 {
                return corrupted(format!("free list node {node} is live"));
            }
            if self.region.read_word(node + PREV_LINK) != prev {
                return corrupted(format!("free list node {node} has a bad back link"));
            }
            prev = node;
            node = self.region.read_word(node + NEXT_LINK);
            listed += 1;
        }
        if listed != free_blocks {
            return corrupted(format!("{free_blocks} free blocks but {listed} listed"));
        }
        Ok(())
    }

    #[inline]
    fn debug_check(&self) {
        if cfg!(debug_assertions) {
            if let Err(err) = self.validate() {
                panic!("{err}");
            }
        }
    }

    /// Span needed to serve a `size`-byte request.
    #[inline]
    fn span_for(&self, size: usize) -> Option<usize> {
        Some(align_up(size.checked_add(HEADER)?, self.align)?.max(self.min_span))
    }

    /// Hands out `need` bytes of the free block at `header`.
    fn take(&mut self, header: usize, span: usize, need: usize) -> NonNull<u8> {
        if span - need >= self.min_span {
            let rest = header + need;
            self.replace(header, rest);
            self.write_free(rest, span - need);
            self.region.write_word(header, need);
            self.used += need;
        } else {
            self.unlink(header);
            self.region.write_word(header, span);
            self.set_prev_free(header + span, false);
            self.used += span;
        }
        self.live += 1;
        self.region.ptr_at(header + HEADER)
    }

    /// Frees the block at `header` and merges it with free neighbours.
    fn release(&mut self, header: usize, span: usize) {
        let mut start = header;
        let mut total = span;

        let next = header + span;
        if next < self.heap_end {
            let word = self.region.read_word(next);
            if word & FREE != 0 {
                self.unlink(next);
                total += span_of(word);
            }
        }
        if self.region.read_word(header) & PREV_FREE != 0 {
            let prev_span = self.region.read_word(header - WORD);
            start = header - prev_span;
            self.unlink(start);
            total += prev_span;
        }

        self.write_free(start, total);
        self.link_front(start);
        self.set_prev_free(start + total, true);
    }

    /// Resolves a payload pointer to its live block.
    fn block_of(&self, ptr: NonNull<u8>) -> Result<(usize, usize), &'static str> {
        let offset = self.region.offset_of(ptr).ok_or("foreign pointer")?;
        if offset < self.heap_start + HEADER
            || offset >= self.heap_end
            || (offset - HEADER - self.heap_start) % self.align != 0
        {
            return Err("pointer that is not a block start");
        }
        let header = offset - HEADER;
        let word = self.region.read_word(header);
        if word & FREE != 0 {
            return Err("block that is not live");
        }
        if cfg!(debug_assertions) && !self.is_block_start(header) {
            return Err("pointer that is not a block start");
        }
        Ok((header, span_of(word)))
    }

    fn live_block(&self, ptr: NonNull<u8>, op: &str) -> Option<(usize, usize)> {
        match self.block_of(ptr) {
            Ok(block) => Some(block),
            Err(what) => {
                contract_violation(AllocatorKind::FreeList, &format!("{op} of a {what}"));
                None
            }
        }
    }

    fn is_block_start(&self, header: usize) -> bool {
        let mut cursor = self.heap_start;
        while cursor < header {
            let span = span_of(self.region.read_word(cursor));
            if span == 0 {
                return false;
            }
            cursor += span;
        }
        cursor == header
    }

    fn free_spans(&self) -> impl Iterator<Item = usize> + '_ {
        let mut node = self.free_head;
        std::iter::from_fn(move || {
            if node == NIL {
                return None;
            }
            let span = span_of(self.region.read_word(node));
            node = self.region.read_word(node + NEXT_LINK);
            Some(span)
        })
    }

    fn write_free(&mut self, header: usize, span: usize) {
        self.region.write_word(header, span | FREE);
        self.region.write_word(header + span - WORD, span);
    }

    fn set_prev_free(&mut self, header: usize, prev_free: bool) {
        if header >= self.heap_end {
            return;
        }
        let word = self.region.read_word(header);
        let word = if prev_free { word | PREV_FREE } else { word & !PREV_FREE };
        self.region.write_word(header, word);
    }

    fn link_front(&mut self, node: usize) {
        let head = self.free_head;
        self.region.write_word(node + PREV_LINK, NIL);
        self.region.write_word(node + NEXT_LINK, head);
        if head != NIL {
            self.region.write_word(head + PREV_LINK, node);
        }
        self.free_head = node;
    }

    fn unlink(&mut self, node: usize) {
        let prev = self.region.read_word(node + PREV_LINK);
        let next = self.region.read_word(node + NEXT_LINK);
        if prev == NIL {
            self.free_head = next;
        } else {
            self.region.write_word(prev + NEXT_LINK, next);
        }
        if next != NIL {
            self.region.write_word(next + PREV_LINK, prev);
        }
    }

    /// Puts `new` in `old`'s place on the free list.
    fn replace(&mut self, old: usize, new: usize) {
        let prev = self.region.read_word(old + PREV_LINK);
        let next = self.region.read_word(old + NEXT_LINK);
        self.region.write_word(new + PREV_LINK, prev);
        self.region.write_word(new + NEXT_LINK, next);
        if prev == NIL {
            self.free_head = new;
        } else {
            self.region.write_word(prev + NEXT_LINK, new);
        }
        if next != NIL {
            self.region.write_word(next + PREV_LINK, new);
        }
    }
}

impl Allocator for FreeListAllocator<'_> {
    fn kind(&self) -> AllocatorKind {
        AllocatorKind::FreeList
    }

    fn alloc(&mut self, size: usize) -> Option<NonNull<u8>> {
        FreeListAllocator::alloc(self, size)
    }

    fn free(&mut self, ptr: NonNull<u8>) {
        FreeListAllocator::free(self, ptr);
    }

    fn realloc(&mut self, ptr: NonNull<u8>, new_size: usize) -> Option<NonNull<u8>> {
        FreeListAllocator::realloc(self, ptr, new_size)
    }

    fn reset(&mut self) {
        FreeListAllocator::reset(self);
    }

    fn owns(&self, ptr: NonNull<u8>) -> bool {
        self.region.contains(ptr)
    }

    fn stats(&self) -> AllocatorStats {
        AllocatorStats {
            kind: AllocatorKind::FreeList,
            capacity: self.region.len(),
            used: self.used,
            live_allocations: self.live,
        }
    }

    /// Borrows payload bytes; `ptr` must be a live block's start.
    fn bytes(&self, ptr: NonNull<u8>, len: usize) -> Option<&[u8]> {
        let (header, span) = self.block_of(ptr).ok()?;
        if len > span - HEADER {
            return None;
        }
        self.region.bytes(header + HEADER, len)
    }

    /// Mutably borrows payload bytes; `ptr` must be a live block's start.
    fn bytes_mut(&mut self, ptr: NonNull<u8>, len: usize) -> Option<&mut [u8]> {
        let (header, span) = self.block_of(ptr).ok()?;
        if len > span - HEADER {
            return None;
        }
        self.region.bytes_mut(header + HEADER, len)
    }
}
