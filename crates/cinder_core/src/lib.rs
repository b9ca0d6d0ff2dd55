//! # CINDER Core Memory
//!
//! Arena-backed allocator suite for a real-time engine:
//! - One fixed reservation per arena, carved once per allocator
//! - Zero system allocator calls on the allocation path
//! - Deterministic reuse: LIFO slots, first-fit blocks, bulk frame reset
//!
//! ## Architecture Rules
//!
//! 1. **Reserve at startup** - Arenas are sized for the engine's lifetime
//! 2. **Pick by lifetime** - Callers choose the allocator matching the data
//! 3. **Exhaustion is data** - `alloc` returns `None`, the caller decides
//!
//! ## Example
//!
//! ```rust
//! use cinder_core::memory::units::megabytes;
//! use cinder_core::{Allocator, Arena, LinearAllocator, PoolAllocator};
//!
//! let arena = Arena::new(megabytes(4)).expect("reservation");
//! let mut frame = LinearAllocator::new(&arena, megabytes(1)).expect("frame section");
//! let mut particles = PoolAllocator::new(&arena, 64, 1024).expect("pool section");
//!
//! let scratch = frame.alloc(4096).expect("frame memory");
//! let particle = particles.alloc_pod(&[0.0_f32; 4]).expect("particle slot");
//! assert!(frame.owns(scratch) && particles.owns(particle));
//!
//! frame.reset(); // end of frame
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod error;
pub mod memory;

pub use error::{MemoryError, MemoryResult};
pub use memory::{
    Allocator, AllocatorKind, AllocatorStats, Arena, FreeListAllocator, LinearAllocator,
    PoolAllocator, PoolRegion, SharedAllocator, SlabAllocator, SlabDeclaration,
};
