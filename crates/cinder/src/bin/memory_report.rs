//! # Memory Report
//!
//! Builds the engine's allocators from a memory config, runs a few frames of
//! mixed allocation traffic and prints how much of each allocator is in use.
//!
//! ```bash
//! # Built-in default layout
//! ./memory_report
//!
//! # Custom layout
//! ./memory_report crates/cinder/config/memory.toml
//! ```

use std::process::ExitCode;

use cinder::{ConfigError, GameMemory, MemoryConfig, MemoryRole};

/// Frames to simulate.
const FRAMES: u64 = 8;

/// Small objects spawned per frame.
const SPAWNS_PER_FRAME: usize = 64;

fn run() -> Result<(), ConfigError> {
    let config = match std::env::args().nth(1) {
        Some(path) => MemoryConfig::load(path)?,
        None => MemoryConfig::default(),
    };
    let arena = config.create_arena()?;
    let mut memory = GameMemory::new(&arena, &config)?;

    // Level data, loaded once.
    let mut level_bytes = 0;
    for size in [64 * 1024, 16 * 1024, 4 * 1024] {
        if memory.persist_alloc(size).is_some() {
            level_bytes += size;
        }
    }
    println!("persistent: {level_bytes} bytes of level data");

    let mut live = Vec::new();
    let mut dropped = 0_usize;
    for frame in 0..FRAMES {
        // Transient per-frame scratch.
        for i in 0..32 {
            if memory.frame_alloc(256 + i * 32).is_none() {
                dropped += 1;
            }
        }

        // Short-lived objects: spawn some, retire the oldest.
        for i in 0..SPAWNS_PER_FRAME {
            let size = 16 + (i * 37 + frame as usize * 11) % 900;
            match memory.pool_alloc(size) {
                Some(ptr) => live.push(ptr),
                None => dropped += 1,
            }
        }
        let retire = live.len().saturating_sub(SPAWNS_PER_FRAME * 2);
        for ptr in live.drain(..retire) {
            memory.pool_free(ptr);
        }

        // Growing buffers in the general allocator.
        if let Some(general) = memory.allocator(MemoryRole::General) {
            if let Some(buffer) = general.alloc(1024) {
                if general.realloc(buffer, 4096 << (frame % 3)).is_none() {
                    dropped += 1;
                }
            }
        }

        let index = memory.end_frame();
        if index == FRAMES {
            println!("frame {index}: {} pool blocks live", live.len());
        }
    }

    println!("dropped requests: {dropped}");
    println!();
    print!("{}", memory.report());
    Ok(())
}

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("memory_report: {err}");
            ExitCode::FAILURE
        }
    }
}
