//! # CINDER
//!
//! Engine-facing memory integration on top of `cinder_core`.
//!
//! ## Startup
//!
//! ```text
//! memory.toml ──► MemoryConfig ──► Arena ──► GameMemory
//!                  (validated)     (one      (persistent, frame, pool,
//!                                  reserve)   general, slab)
//! ```
//!
//! ## Modules
//!
//! - `config`: TOML memory layout
//! - `game_memory`: the allocators an engine uses, chosen by data lifetime

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod config;
pub mod game_memory;

// Re-export the allocator suite
pub use cinder_core as core;

// Re-export commonly used types
pub use config::{ByteSize, ConfigError, MemoryConfig};
pub use game_memory::{GameMemory, MemoryReport, MemoryRole};
