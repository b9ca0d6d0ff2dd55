//! # Memory Error Types
//!
//! Construction-time failures of the arena and its allocators.
//!
//! Allocation exhaustion is NOT an error: `alloc`/`realloc` report it as
//! `None` and the caller decides whether it is fatal.

use thiserror::Error;

/// Errors that can occur while building arenas and allocators.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MemoryError {
    /// The backing reservation could not be obtained.
    #[error("failed to reserve {requested} bytes for the arena")]
    ReservationFailed {
        /// Number of bytes requested.
        requested: usize,
    },

    /// A carve-out does not fit in what is left of the arena.
    #[error("arena out of space: requested {requested} bytes, {remaining} remaining")]
    OutOfSpace {
        /// Size of the requested section.
        requested: usize,
        /// Bytes still available in the arena.
        remaining: usize,
    },

    /// The arena already hosts its maximum number of allocator sections.
    #[error("arena section limit reached: {limit} sections")]
    TooManySections {
        /// Maximum number of sections per arena.
        limit: usize,
    },

    /// Alignment is not a power of two or is smaller than a machine word.
    #[error("invalid alignment {0}: must be a power of two and at least a machine word")]
    InvalidAlignment(usize),

    /// Allocator declarations are structurally invalid.
    #[error("invalid allocator configuration: {0}")]
    InvalidConfig(String),

    /// Allocator bookkeeping is inconsistent.
    #[error("allocator state corrupted: {0}")]
    Corrupted(String),
}

/// Result type for memory subsystem construction.
pub type MemoryResult<T> = Result<T, MemoryError>;
