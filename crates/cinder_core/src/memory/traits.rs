//! # Allocator Capability
//!
//! The interface every allocator kind implements, so call sites can depend
//! on "something that allocates" instead of a concrete allocator.
//!
//! ## Kind-specific behaviour
//!
//! | Kind       | `free(ptr)`          | `realloc`                     | `reset()`            |
//! |------------|----------------------|-------------------------------|----------------------|
//! | `Linear`   | no-op                | always `None`                 | rewinds the offset   |
//! | `Pool`     | LIFO push            | moves across block classes    | every slot free      |
//! | `Slab`     | LIFO push            | moves to the tightest slab    | every slot free      |
//! | `FreeList` | coalescing free      | in place when possible        | one free block       |

use std::fmt;
use std::ptr::NonNull;

use bytemuck::Pod;

/// The four allocator kinds an arena can host.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AllocatorKind {
    /// Bump allocator with bulk reset.
    Linear,
    /// Fixed-size blocks from one or more pool regions.
    Pool,
    /// Fixed-size blocks from explicit size classes.
    Slab,
    /// General-purpose variable-size allocator.
    FreeList,
}

impl AllocatorKind {
    /// Returns a short human-readable name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Linear => "linear",
            Self::Pool => "pool",
            Self::Slab => "slab",
            Self::FreeList => "free-list",
        }
    }
}

impl fmt::Display for AllocatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Point-in-time usage of one allocator.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AllocatorStats {
    /// Kind of allocator reporting.
    pub kind: AllocatorKind,
    /// Size of the allocator's arena section in bytes.
    pub capacity: usize,
    /// Bytes currently handed out, including per-block overhead.
    pub used: usize,
    /// Number of live allocations.
    pub live_allocations: usize,
}

impl AllocatorStats {
    /// Bytes not currently handed out.
    #[inline]
    #[must_use]
    pub const fn available(&self) -> usize {
        self.capacity.saturating_sub(self.used)
    }

    /// Fraction of the section in use, in `0.0..=1.0`.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn utilization(&self) -> f64 {
        if self.capacity == 0 {
            return 0.0;
        }
        self.used as f64 / self.capacity as f64
    }
}

/// Common allocation contract.
///
/// Exhaustion is reported as `None`, never as a panic or an error. Passing a
/// pointer that this allocator did not hand out (or freeing twice) is a
/// contract violation: debug builds panic, release builds ignore the call.
///
/// # Example
///
/// ```rust
/// use cinder_core::memory::{Allocator, Arena, FreeListAllocator, LinearAllocator};
///
/// fn scratch(alloc: &mut dyn Allocator) -> bool {
///     alloc.alloc(64).is_some()
/// }
///
/// let arena = Arena::new(4096).expect("reservation");
/// let mut linear = LinearAllocator::new(&arena, 1024).expect("section");
/// let mut general = FreeListAllocator::new(&arena, 2048, 16).expect("section");
/// assert!(scratch(&mut linear));
/// assert!(scratch(&mut general));
/// ```
pub trait Allocator {
    /// Which kind of allocator this is.
    fn kind(&self) -> AllocatorKind;

    /// Allocates `size` bytes, or returns `None` when exhausted.
    fn alloc(&mut self, size: usize) -> Option<NonNull<u8>>;

    /// Returns a block to the allocator.
    fn free(&mut self, ptr: NonNull<u8>);

    /// Resizes a block, possibly moving it.
    ///
    /// On `None` the original block is left untouched and still live.
    fn realloc(&mut self, ptr: NonNull<u8>, new_size: usize) -> Option<NonNull<u8>>;

    /// Invalidates every outstanding allocation at once.
    fn reset(&mut self);

    /// Returns `true` if `ptr` lies inside this allocator's section.
    fn owns(&self, ptr: NonNull<u8>) -> bool;

    /// Current usage.
    fn stats(&self) -> AllocatorStats;

    /// Borrows `len` bytes at `ptr`, if the range lies inside memory this
    /// allocator handed out.
    fn bytes(&self, ptr: NonNull<u8>, len: usize) -> Option<&[u8]>;

    /// Mutably borrows `len` bytes at `ptr`, if the range lies inside memory
    /// this allocator handed out.
    fn bytes_mut(&mut self, ptr: NonNull<u8>, len: usize) -> Option<&mut [u8]>;

    /// Copies `value` into the block at `ptr`.
    ///
    /// Returns `false` if the value does not fit.
    fn write_pod<T: Pod>(&mut self, ptr: NonNull<u8>, value: &T) -> bool
    where
        Self: Sized,
    {
        let bytes = bytemuck::bytes_of(value);
        match self.bytes_mut(ptr, bytes.len()) {
            Some(dst) => {
                dst.copy_from_slice(bytes);
                true
            }
            None => false,
        }
    }

    /// Reads a value back from the block at `ptr`.
    #[must_use]
    fn read_pod<T: Pod>(&self, ptr: NonNull<u8>) -> Option<T>
    where
        Self: Sized,
    {
        self.bytes(ptr, std::mem::size_of::<T>())
            .map(bytemuck::pod_read_unaligned)
    }

    /// Allocates room for `value` and stores it.
    fn alloc_pod<T: Pod>(&mut self, value: &T) -> Option<NonNull<u8>>
    where
        Self: Sized,
    {
        let ptr = self.alloc(std::mem::size_of::<T>())?;
        self.write_pod(ptr, value).then_some(ptr)
    }
}

/// Reports a broken caller contract.
///
/// Debug builds panic; release builds log and let the caller ignore the call.
#[cold]
#[inline(never)]
pub(crate) fn contract_violation(kind: AllocatorKind, what: &str) {
    tracing::warn!(%kind, what, "allocator contract violation ignored");
    if cfg!(debug_assertions) {
        panic!("{kind} allocator contract violation: {what}");
    }
}
