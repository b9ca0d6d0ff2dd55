//! # Memory Management
//!
//! One arena reserved at start-up, carved into purpose-built allocators.
//!
//! ## Design Philosophy
//!
//! All memory is reserved once at startup. During gameplay:
//! - No system allocator calls
//! - Exhaustion is a checked `None`, never a panic
//! - Predictable, flat latency
//!
//! | Allocator             | Lifetime pattern                      |
//! |-----------------------|---------------------------------------|
//! | [`LinearAllocator`]   | one batch, released together          |
//! | [`PoolAllocator`]     | many same-sized objects               |
//! | [`SlabAllocator`]     | many objects across a few size classes|
//! | [`FreeListAllocator`] | anything else                         |

mod arena;
mod free_list;
mod linear;
mod pool;
mod region;
mod shared;
mod slab;
mod slot_table;
mod traits;
pub mod units;

pub use arena::{Arena, Section, DEFAULT_ALIGNMENT, MAX_SECTIONS};
pub use free_list::{FreeListAllocator, HEADER as FREE_LIST_HEADER};
pub use linear::LinearAllocator;
pub use pool::{PoolAllocator, PoolRegion};
pub use region::{Region, WORD};
pub use shared::SharedAllocator;
pub use slab::{SlabAllocator, SlabDeclaration};
pub use slot_table::SegmentStats;
pub use traits::{Allocator, AllocatorKind, AllocatorStats};
