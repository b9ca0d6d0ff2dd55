//! # Slot Table
//!
//! Fixed-size block bookkeeping shared by the pool and slab allocators.
//!
//! One arena section is split into consecutive segments, one per declared
//! block class. Each segment keeps an intrusive LIFO free list: a free slot's
//! first word holds the section offset of the next free slot.
//!
//! ```text
//! section
//! ┌──────────── segment 0 (64 B) ────────────┬──── segment 1 (256 B) ────┐
//! │ slot 0 │ slot 1 │ slot 2 │ ... │ slot n  │ slot 0 │ slot 1 │ ...      │
//! └──────────────────────────────────────────┴───────────────────────────┘
//!   free_head ─► slot 0 ─► slot 1 ─► ... ─► NIL
//! ```
//!
//! Slots are threaded in address order, so a fresh segment hands out
//! contiguous addresses. Ownership of a pointer is resolved by binary search
//! over the segment bounds; no per-allocation header exists. A bitmap kept
//! outside the section records which slots are live, so double frees are
//! caught without touching caller memory.

use std::ptr::NonNull;

use crate::error::{MemoryError, MemoryResult};

use super::arena::Arena;
use super::region::{Region, WORD};
use super::traits::{contract_violation, AllocatorKind, AllocatorStats};

/// End-of-list marker.
const NIL: usize = usize::MAX;

/// Bits per bitmap word.
const BITS: usize = u64::BITS as usize;

/// Usage of one block class.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SegmentStats {
    /// Offset of the segment inside the allocator's section.
    pub offset: usize,
    /// Size of every block in the segment.
    pub block_size: usize,
    /// Number of blocks in the segment.
    pub block_count: usize,
    /// Number of blocks currently free.
    pub free_count: usize,
}

impl SegmentStats {
    /// Number of blocks currently handed out.
    #[inline]
    #[must_use]
    pub const fn live_count(&self) -> usize {
        self.block_count - self.free_count
    }
}

/// One block class.
#[derive(Clone, Copy, Debug)]
struct Segment {
    block_size: usize,
    count: usize,
    /// Section offset of the first slot.
    start: usize,
    /// Global index of the first slot in the live bitmap.
    first_slot: usize,
    free_head: usize,
    live: usize,
}

impl Segment {
    #[inline]
    const fn end(&self) -> usize {
        self.start + self.block_size * self.count
    }
}

/// A located slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Slot {
    /// Index of the owning segment.
    pub segment: usize,
    /// Section offset of the slot start.
    pub offset: usize,
}

/// Segmented fixed-block storage over one arena section.
#[derive(Debug)]
pub(crate) struct SlotTable<'a> {
    region: Region<'a>,
    segments: Vec<Segment>,
    live_bits: Vec<u64>,
    kind: AllocatorKind,
}

impl<'a> SlotTable<'a> {
    /// Validates `classes` (`(block_size, count)` pairs), carves the section
    /// and threads every free list.
    pub(crate) fn new(
        arena: &'a Arena,
        classes: &[(usize, usize)],
        kind: AllocatorKind,
    ) -> MemoryResult<Self> {
        let (segments, total) = Self::plan(classes, kind)?;
        let region = arena.carve(total, kind)?;
        let slots = segments.last().map_or(0, |s| s.first_slot + s.count);

        let mut table = Self {
            region,
            segments,
            live_bits: vec![0; slots.div_ceil(BITS)],
            kind,
        };
        table.reset();

        tracing::debug!(
            %kind,
            offset = table.region.arena_offset(),
            size = total,
            classes = ?classes,
            "fixed-block allocator initialized"
        );
        Ok(table)
    }

    /// Lays the segments out back to back.
    fn plan(classes: &[(usize, usize)], kind: AllocatorKind) -> MemoryResult<(Vec<Segment>, usize)> {
        let invalid = |what: String| MemoryError::InvalidConfig(format!("{kind} allocator: {what}"));

        if classes.is_empty() {
            return Err(invalid("no block classes declared".into()));
        }

        let mut segments = Vec::with_capacity(classes.len());
        let mut total = 0_usize;
        let mut slots = 0_usize;
        let mut previous = 0_usize;
        for (index, &(block_size, count)) in classes.iter().enumerate() {
            if block_size < WORD {
                return Err(invalid(format!(
                    "class {index}: block size {block_size} is below the {WORD}-byte minimum"
                )));
            }
            if count == 0 {
                return Err(invalid(format!("class {index}: block count is zero")));
            }
            if block_size < previous {
                return Err(invalid(format!(
                    "class {index}: block size {block_size} follows larger size {previous}"
                )));
            }
            let size = block_size
                .checked_mul(count)
                .and_then(|size| size.checked_add(total))
                .ok_or_else(|| invalid(format!("class {index}: size overflows")))?;

            segments.push(Segment {
                block_size,
                count,
                start: total,
                first_slot: slots,
                free_head: NIL,
                live: 0,
            });
            total = size;
            slots += count;
            previous = block_size;
        }
        Ok((segments, total))
    }

    /// Number of segments.
    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.segments.len()
    }

    /// Block size of segment `index`.
    #[inline]
    pub(crate) fn block_size(&self, index: usize) -> usize {
        self.segments[index].block_size
    }

    /// First segment whose block size can hold `size`.
    ///
    /// Segments are sorted by block size, so this is also the tightest fit.
    #[inline]
    pub(crate) fn first_fit(&self, size: usize) -> Option<usize> {
        let index = self.segments.partition_point(|s| s.block_size < size);
        (index < self.segments.len()).then_some(index)
    }

    /// Pops the head of segment `index`'s free list.
    #[inline]
    pub(crate) fn pop(&mut self, index: usize) -> Option<NonNull<u8>> {
        let segment = &self.segments[index];
        let head = segment.free_head;
        if head == NIL {
            return None;
        }
        let next = self.region.read_word(head);
        let bit = segment.first_slot + (head - segment.start) / segment.block_size;

        let segment = &mut self.segments[index];
        segment.free_head = next;
        segment.live += 1;
        self.live_bits[bit / BITS] |= 1 << (bit % BITS);
        Some(self.region.ptr_at(head))
    }

    /// Resolves any pointer inside the section to its slot.
    #[inline]
    pub(crate) fn locate(&self, ptr: NonNull<u8>) -> Option<Slot> {
        let offset = self.region.offset_of(ptr)?;
        let segment = self.segments.partition_point(|s| s.end() <= offset);
        let owner = self.segments.get(segment)?;
        let index = (offset - owner.start) / owner.block_size;
        Some(Slot {
            segment,
            offset: owner.start + index * owner.block_size,
        })
    }

    /// Resolves a pointer handed out by [`pop`](Self::pop) that is still live.
    ///
    /// Reports a contract violation and returns `None` otherwise.
    pub(crate) fn locate_live(&self, ptr: NonNull<u8>, op: &str) -> Option<Slot> {
        let Some(slot) = self.locate(ptr) else {
            contract_violation(self.kind, &format!("{op} of a foreign pointer"));
            return None;
        };
        if self.region.offset_of(ptr) != Some(slot.offset) {
            contract_violation(self.kind, &format!("{op} of an interior pointer"));
            return None;
        }
        if !self.is_live(slot) {
            contract_violation(self.kind, &format!("{op} of a block that is not live"));
            return None;
        }
        Some(slot)
    }

    fn bit_of(&self, slot: Slot) -> usize {
        let segment = &self.segments[slot.segment];
        segment.first_slot + (slot.offset - segment.start) / segment.block_size
    }

    fn is_live(&self, slot: Slot) -> bool {
        let bit = self.bit_of(slot);
        self.live_bits[bit / BITS] & (1 << (bit % BITS)) != 0
    }

    /// Pushes a live slot back onto its segment's free list.
    #[inline]
    pub(crate) fn push(&mut self, slot: Slot) {
        let bit = self.bit_of(slot);
        self.live_bits[bit / BITS] &= !(1 << (bit % BITS));

        let segment = &mut self.segments[slot.segment];
        let head = segment.free_head;
        segment.free_head = slot.offset;
        segment.live -= 1;
        self.region.write_word(slot.offset, head);
    }

    /// Moves a live slot into segment `target`, copying `copy_len` bytes.
    ///
    /// Returns `None`, leaving the source untouched, if `target` is exhausted.
    pub(crate) fn relocate(&mut self, from: Slot, target: usize, copy_len: usize) -> Option<NonNull<u8>> {
        let ptr = self.pop(target)?;
        let dst = self.region.offset_of(ptr)?;
        self.region.copy_within(from.offset, dst, copy_len);
        self.push(from);
        Some(ptr)
    }

    /// Returns every slot to the free state.
    pub(crate) fn reset(&mut self) {
        for index in 0..self.segments.len() {
            let Segment {
                block_size,
                count,
                start,
                ..
            } = self.segments[index];
            for slot in 0..count {
                let offset = start + slot * block_size;
                let next = if slot + 1 < count { offset + block_size } else { NIL };
                self.region.write_word(offset, next);
            }
            let segment = &mut self.segments[index];
            segment.free_head = start;
            segment.live = 0;
        }
        self.live_bits.fill(0);
    }

    /// Returns `true` if `ptr` lies inside the section.
    #[inline]
    pub(crate) fn owns(&self, ptr: NonNull<u8>) -> bool {
        self.region.contains(ptr)
    }

    /// Usage of segment `index`.
    pub(crate) fn segment_stats(&self, index: usize) -> SegmentStats {
        let segment = &self.segments[index];
        SegmentStats {
            offset: segment.start,
            block_size: segment.block_size,
            block_count: segment.count,
            free_count: segment.count - segment.live,
        }
    }

    /// Walks segment `index`'s free list from head to tail.
    pub(crate) fn free_slots(&self, index: usize) -> Vec<NonNull<u8>> {
        let segment = &self.segments[index];
        let mut slots = Vec::with_capacity(segment.count - segment.live);
        let mut cursor = segment.free_head;
        while cursor != NIL && slots.len() < segment.count {
            slots.push(self.region.ptr_at(cursor));
            cursor = self.region.read_word(cursor);
        }
        slots
    }

    /// Aggregate usage.
    pub(crate) fn stats(&self) -> AllocatorStats {
        let (used, live) = self.segments.iter().fold((0, 0), |(used, live), s| {
            (used + s.live * s.block_size, live + s.live)
        });
        AllocatorStats {
            kind: self.kind,
            capacity: self.region.len(),
            used,
            live_allocations: live,
        }
    }

    /// Borrows bytes at `ptr`, confined to the live slot containing it.
    pub(crate) fn bytes(&self, ptr: NonNull<u8>, len: usize) -> Option<&[u8]> {
        let offset = self.confine(ptr, len)?;
        self.region.bytes(offset, len)
    }

    /// Mutably borrows bytes at `ptr`, confined to the live slot containing it.
    pub(crate) fn bytes_mut(&mut self, ptr: NonNull<u8>, len: usize) -> Option<&mut [u8]> {
        let offset = self.confine(ptr, len)?;
        self.region.bytes_mut(offset, len)
    }

    /// A free slot's first word is its list link; it is never handed out.
    fn confine(&self, ptr: NonNull<u8>, len: usize) -> Option<usize> {
        let slot = self.locate(ptr)?;
        if !self.is_live(slot) {
            return None;
        }
        let offset = self.region.offset_of(ptr)?;
        let slot_end = slot.offset + self.segments[slot.segment].block_size;
        (offset.checked_add(len)? <= slot_end).then_some(offset)
    }
}
