//! # Game Memory
//!
//! The allocators an engine builds at startup from one arena:
//!
//! ```text
//! Arena
//! ┌────────────┬─────────┬──────────────┬──────────────────┬───────────┐
//! │ persistent │ frame   │ pool regions │ general (opt.)   │ slab(opt.)│
//! │ linear     │ linear  │              │ free list        │           │
//! └────────────┴─────────┴──────────────┴──────────────────┴───────────┘
//! ```
//!
//! Call sites pick the allocator by the lifetime of their data: persistent
//! for the whole run, frame for one frame, pool for small churning objects,
//! general for anything else.

use std::fmt;
use std::ptr::NonNull;

use cinder_core::memory::{
    Allocator, AllocatorStats, Arena, FreeListAllocator, LinearAllocator, PoolAllocator,
    SlabAllocator,
};

use crate::config::{ByteSize, ConfigError, MemoryConfig};

/// Which of the engine's allocators to use.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MemoryRole {
    /// Data living for the whole run.
    Persistent,
    /// Data living until the end of the current frame.
    Frame,
    /// Small fixed-size objects.
    Pool,
    /// Variable-size data with individual lifetimes.
    General,
    /// Objects spread over a few size classes.
    Slab,
}

impl MemoryRole {
    /// Every role, in arena order.
    pub const ALL: [Self; 5] = [
        Self::Persistent,
        Self::Frame,
        Self::Pool,
        Self::General,
        Self::Slab,
    ];

    /// Returns a short human-readable name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Persistent => "persistent",
            Self::Frame => "frame",
            Self::Pool => "pool",
            Self::General => "general",
            Self::Slab => "slab",
        }
    }
}

/// The engine's allocators, carved from one arena.
///
/// # Example
///
/// ```rust
/// use cinder::{GameMemory, MemoryConfig};
///
/// let config = MemoryConfig::default();
/// let arena = config.create_arena().expect("reservation");
/// let mut memory = GameMemory::new(&arena, &config).expect("layout");
///
/// let mesh = memory.persist_alloc(4096).expect("persistent memory");
/// let scratch = memory.frame_alloc(512).expect("frame memory");
/// assert_ne!(mesh, scratch);
///
/// assert_eq!(memory.end_frame(), 1);
/// ```
pub struct GameMemory<'a> {
    /// Arena every allocator below is carved from.
    arena: &'a Arena,
    /// Whole-run allocations.
    persistent: LinearAllocator<'a>,
    /// Per-frame allocations.
    frame: LinearAllocator<'a>,
    /// Fixed-size blocks.
    pool: PoolAllocator<'a>,
    /// General-purpose allocator.
    general: Option<FreeListAllocator<'a>>,
    /// Size-class allocator.
    slab: Option<SlabAllocator<'a>>,
    /// Frames completed.
    frame_index: u64,
}

impl<'a> GameMemory<'a> {
    /// Carves every configured allocator from `arena`.
    ///
    /// # Errors
    ///
    /// - [`ConfigError::Invalid`] if the config is inconsistent or does not
    ///   fit what is left of the arena.
    /// - [`ConfigError::Memory`] if an allocator rejects its declarations.
    pub fn new(arena: &'a Arena, config: &MemoryConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let required = config
            .required_bytes()
            .ok_or_else(|| ConfigError::Invalid("section sizes overflow".into()))?;
        if required > arena.remaining() {
            return Err(ConfigError::Invalid(format!(
                "sections need {} but the arena has {} left",
                ByteSize(required),
                ByteSize(arena.remaining())
            )));
        }

        let persistent = LinearAllocator::new(arena, config.persistent.size.bytes())?;
        let frame = LinearAllocator::new(arena, config.frame.size.bytes())?;
        let pool = PoolAllocator::with_regions(arena, &config.pool.regions)?;
        let general = config
            .general
            .as_ref()
            .map(|g| FreeListAllocator::new(arena, g.size.bytes(), g.min_alignment))
            .transpose()?;
        let slab = config
            .slab
            .as_ref()
            .map(|s| SlabAllocator::new(arena, &s.declarations))
            .transpose()?;

        tracing::info!(
            capacity = %ByteSize(arena.capacity()),
            used = %ByteSize(arena.used()),
            general = general.is_some(),
            slab = slab.is_some(),
            "game memory initialized"
        );

        Ok(Self {
            arena,
            persistent,
            frame,
            pool,
            general,
            slab,
            frame_index: 0,
        })
    }

    /// Allocates memory that lives for the whole run.
    #[inline]
    pub fn persist_alloc(&mut self, size: usize) -> Option<NonNull<u8>> {
        self.persistent.alloc(size)
    }

    /// Allocates memory that lives until [`end_frame`](Self::end_frame).
    #[inline]
    pub fn frame_alloc(&mut self, size: usize) -> Option<NonNull<u8>> {
        self.frame.alloc(size)
    }

    /// Releases every frame allocation and returns the new frame index.
    pub fn end_frame(&mut self) -> u64 {
        self.frame.reset();
        self.frame_index += 1;
        self.frame_index
    }

    /// Frames completed so far.
    #[inline]
    #[must_use]
    pub const fn frame_index(&self) -> u64 {
        self.frame_index
    }

    /// Allocates a pool block able to hold `size` bytes.
    #[inline]
    pub fn pool_alloc(&mut self, size: usize) -> Option<NonNull<u8>> {
        self.pool.alloc(size)
    }

    /// Resizes a pool block, moving it across regions when needed.
    #[inline]
    pub fn pool_realloc(&mut self, ptr: NonNull<u8>, new_size: usize) -> Option<NonNull<u8>> {
        self.pool.realloc(ptr, new_size)
    }

    /// Returns a pool block.
    #[inline]
    pub fn pool_free(&mut self, ptr: NonNull<u8>) {
        self.pool.free(ptr);
    }

    /// The pool allocator.
    pub fn pool(&mut self) -> &mut PoolAllocator<'a> {
        &mut self.pool
    }

    /// The general-purpose allocator, if configured.
    pub fn general(&mut self) -> Option<&mut FreeListAllocator<'a>> {
        self.general.as_mut()
    }

    /// The slab allocator, if configured.
    pub fn slab(&mut self) -> Option<&mut SlabAllocator<'a>> {
        self.slab.as_mut()
    }

    /// The allocator serving `role`, behind the common interface.
    pub fn allocator(&mut self, role: MemoryRole) -> Option<&mut dyn Allocator> {
        match role {
            MemoryRole::Persistent => Some(&mut self.persistent as &mut dyn Allocator),
            MemoryRole::Frame => Some(&mut self.frame as &mut dyn Allocator),
            MemoryRole::Pool => Some(&mut self.pool as &mut dyn Allocator),
            MemoryRole::General => self.general.as_mut().map(|a| a as &mut dyn Allocator),
            MemoryRole::Slab => self.slab.as_mut().map(|a| a as &mut dyn Allocator),
        }
    }

    fn stats(&self, role: MemoryRole) -> Option<AllocatorStats> {
        match role {
            MemoryRole::Persistent => Some(self.persistent.stats()),
            MemoryRole::Frame => Some(self.frame.stats()),
            MemoryRole::Pool => Some(self.pool.stats()),
            MemoryRole::General => self.general.as_ref().map(Allocator::stats),
            MemoryRole::Slab => self.slab.as_ref().map(Allocator::stats),
        }
    }

    /// Snapshot of arena and allocator usage.
    #[must_use]
    pub fn report(&self) -> MemoryReport {
        MemoryReport {
            frame_index: self.frame_index,
            arena_capacity: self.arena.capacity(),
            arena_used: self.arena.used(),
            allocators: MemoryRole::ALL
                .into_iter()
                .filter_map(|role| Some((role, self.stats(role)?)))
                .collect(),
        }
    }
}

/// Usage snapshot produced by [`GameMemory::report`].
#[derive(Clone, Debug, PartialEq)]
pub struct MemoryReport {
    /// Frames completed when the snapshot was taken.
    pub frame_index: u64,
    /// Arena capacity in bytes.
    pub arena_capacity: usize,
    /// Arena bytes carved into sections.
    pub arena_used: usize,
    /// Per-allocator usage, in arena order.
    pub allocators: Vec<(MemoryRole, AllocatorStats)>,
}

impl MemoryReport {
    /// Usage of the allocator serving `role`, if configured.
    #[must_use]
    pub fn get(&self, role: MemoryRole) -> Option<&AllocatorStats> {
        self.allocators
            .iter()
            .find_map(|(r, stats)| (*r == role).then_some(stats))
    }
}

impl fmt::Display for MemoryReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "arena: {} of {} carved, frame {}",
            ByteSize(self.arena_used),
            ByteSize(self.arena_capacity),
            self.frame_index
        )?;
        writeln!(
            f,
            "{:<12} {:<10} {:>12} {:>12} {:>8} {:>7}",
            "role", "kind", "capacity", "used", "live", "util"
        )?;
        for (role, stats) in &self.allocators {
            writeln!(
                f,
                "{:<12} {:<10} {:>12} {:>12} {:>8} {:>6.1}%",
                role.name(),
                stats.kind.name(),
                stats.capacity,
                stats.used,
                stats.live_allocations,
                stats.utilization() * 100.0
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cinder_core::memory::AllocatorKind;

    #[test]
    fn test_game_memory_layout() {
        let config = MemoryConfig::default();
        let arena = config.create_arena().unwrap();
        let memory = GameMemory::new(&arena, &config).unwrap();

        let report = memory.report();
        assert_eq!(report.allocators.len(), 5);
        assert_eq!(report.arena_used, config.required_bytes().unwrap());
        assert_eq!(
            report.get(MemoryRole::General).unwrap().kind,
            AllocatorKind::FreeList
        );
    }

    #[test]
    fn test_frame_reset() {
        let config = MemoryConfig::default();
        let arena = config.create_arena().unwrap();
        let mut memory = GameMemory::new(&arena, &config).unwrap();

        let first = memory.frame_alloc(1024).unwrap();
        memory.frame_alloc(1024).unwrap();
        memory.persist_alloc(64).unwrap();

        assert_eq!(memory.end_frame(), 1);
        assert_eq!(memory.frame_alloc(16), Some(first));
        let report = memory.report();
        assert_eq!(report.get(MemoryRole::Frame).unwrap().used, 16);
        assert_eq!(report.get(MemoryRole::Persistent).unwrap().used, 64);
    }

    #[test]
    fn test_pool_helpers() {
        let config = MemoryConfig::default();
        let arena = config.create_arena().unwrap();
        let mut memory = GameMemory::new(&arena, &config).unwrap();

        let small = memory.pool_alloc(48).unwrap();
        let grown = memory.pool_realloc(small, 200).unwrap();
        assert_ne!(small, grown);
        assert_eq!(memory.pool().block_size_of(grown), Some(256));
        memory.pool_free(grown);
        assert_eq!(memory.report().get(MemoryRole::Pool).unwrap().live_allocations, 0);
    }

    #[test]
    fn test_optional_allocators() {
        let mut config = MemoryConfig::default();
        config.general = None;
        config.slab = None;
        let arena = config.create_arena().unwrap();
        let mut memory = GameMemory::new(&arena, &config).unwrap();

        assert!(memory.general().is_none());
        assert!(memory.slab().is_none());
        assert!(memory.allocator(MemoryRole::Slab).is_none());
        assert_eq!(memory.report().allocators.len(), 3);
    }

    #[test]
    fn test_arena_too_small() {
        let config = MemoryConfig::default();
        let arena = Arena::new(1024 * 1024).unwrap();
        assert!(matches!(
            GameMemory::new(&arena, &config),
            Err(ConfigError::Invalid(_))
        ));
    }
}
