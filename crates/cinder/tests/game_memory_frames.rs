//! # Game Memory Frame Tests
//!
//! Drives `GameMemory` through many frames of seeded allocation traffic and
//! checks that data with a longer lifetime survives every frame boundary.

use std::collections::HashMap;
use std::ptr::NonNull;

use cinder::core::memory::{AllocatorKind, Arena};
use cinder::{ByteSize, ConfigError, GameMemory, MemoryConfig, MemoryRole};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

const SEED: u64 = 0xF1A3_E5;

fn shipped_config() -> MemoryConfig {
    let path = concat!(env!("CARGO_MANIFEST_DIR"), "/config/memory.toml");
    MemoryConfig::load(path).expect("shipped config loads")
}

/// Fills `len` bytes at `ptr` through the role's allocator.
fn stamp(memory: &mut GameMemory<'_>, role: MemoryRole, ptr: NonNull<u8>, len: usize, tag: u8) {
    let alloc = memory.allocator(role).expect("role configured");
    alloc.bytes_mut(ptr, len).expect("range handed out").fill(tag);
}

fn intact(memory: &mut GameMemory<'_>, role: MemoryRole, ptr: NonNull<u8>, len: usize, tag: u8) -> bool {
    let alloc = memory.allocator(role).expect("role configured");
    alloc
        .bytes(ptr, len)
        .is_some_and(|bytes| bytes.iter().all(|&b| b == tag))
}

// ============================================================================
// CONFIG
// ============================================================================

#[test]
fn verify_shipped_config_builds() {
    let config = shipped_config();
    assert_eq!(config.arena.capacity, ByteSize(32 * 1024 * 1024));
    assert_eq!(config.pool.regions.len(), 3);

    let arena = config.create_arena().unwrap();
    let memory = GameMemory::new(&arena, &config).unwrap();
    let report = memory.report();

    let kinds: Vec<_> = report.allocators.iter().map(|(_, s)| s.kind).collect();
    assert_eq!(
        kinds,
        [
            AllocatorKind::Linear,
            AllocatorKind::Linear,
            AllocatorKind::Pool,
            AllocatorKind::FreeList,
            AllocatorKind::Slab,
        ]
    );
    assert!(report.arena_used <= report.arena_capacity);
}

#[test]
fn verify_layout_must_fit_arena() {
    let config = shipped_config();
    let arena = Arena::new(config.arena.capacity.bytes() / 2).unwrap();
    assert!(matches!(
        GameMemory::new(&arena, &config),
        Err(ConfigError::Invalid(_))
    ));
}

// ============================================================================
// FRAME TRAFFIC
// ============================================================================

#[test]
fn verify_lifetimes_across_frames() {
    let config = shipped_config();
    let arena = config.create_arena().unwrap();
    let mut memory = GameMemory::new(&arena, &config).unwrap();
    let mut rng = ChaCha8Rng::seed_from_u64(SEED);

    // Persistent level data.
    let level = memory.persist_alloc(4096).unwrap();
    stamp(&mut memory, MemoryRole::Persistent, level, 4096, 0xA5);

    let mut pooled: HashMap<usize, (NonNull<u8>, usize, u8)> = HashMap::new();
    let mut next_id = 0_usize;

    for frame in 1..=60_u64 {
        // Scratch that must not outlive the frame.
        let mut scratch = Vec::new();
        for _ in 0..rng.gen_range(1..40) {
            let size = rng.gen_range(1..4096);
            let ptr = memory.frame_alloc(size).unwrap();
            stamp(&mut memory, MemoryRole::Frame, ptr, size, frame as u8);
            scratch.push((ptr, size));
        }
        for &(ptr, size) in &scratch {
            assert!(intact(&mut memory, MemoryRole::Frame, ptr, size, frame as u8));
        }

        // Pool objects with random lifetimes.
        for _ in 0..rng.gen_range(0..24) {
            let size = rng.gen_range(1..=1024);
            if let Some(ptr) = memory.pool_alloc(size) {
                let tag = (next_id % 251) as u8;
                stamp(&mut memory, MemoryRole::Pool, ptr, size, tag);
                pooled.insert(next_id, (ptr, size, tag));
                next_id += 1;
            }
        }
        let retired: Vec<_> = pooled
            .keys()
            .copied()
            .filter(|_| rng.gen_bool(0.3))
            .collect();
        for id in retired {
            let (ptr, size, tag) = pooled.remove(&id).unwrap();
            assert!(intact(&mut memory, MemoryRole::Pool, ptr, size, tag));
            memory.pool_free(ptr);
        }

        assert_eq!(memory.end_frame(), frame);
        assert_eq!(memory.report().get(MemoryRole::Frame).unwrap().used, 0);
    }

    assert!(intact(&mut memory, MemoryRole::Persistent, level, 4096, 0xA5));
    for &(ptr, size, tag) in pooled.values() {
        assert!(intact(&mut memory, MemoryRole::Pool, ptr, size, tag));
    }
    assert_eq!(
        memory.report().get(MemoryRole::Pool).unwrap().live_allocations,
        pooled.len()
    );
}

#[test]
fn verify_general_buffers_keep_contents() {
    let config = shipped_config();
    let arena = config.create_arena().unwrap();
    let mut memory = GameMemory::new(&arena, &config).unwrap();
    let mut rng = ChaCha8Rng::seed_from_u64(SEED ^ 1);

    let mut buffers: Vec<(NonNull<u8>, usize, u8)> = Vec::new();
    for step in 0..500_usize {
        let tag = (step % 251) as u8;
        match rng.gen_range(0..3) {
            0 if !buffers.is_empty() => {
                let (ptr, size, tag) = buffers.swap_remove(rng.gen_range(0..buffers.len()));
                assert!(intact(&mut memory, MemoryRole::General, ptr, size, tag));
                memory.general().unwrap().free(ptr);
            }
            1 if !buffers.is_empty() => {
                let index = rng.gen_range(0..buffers.len());
                let (ptr, size, old_tag) = buffers[index];
                let new_size = rng.gen_range(1..16 * 1024);
                if let Some(moved) = memory.general().unwrap().realloc(ptr, new_size) {
                    let kept = size.min(new_size);
                    assert!(intact(&mut memory, MemoryRole::General, moved, kept, old_tag));
                    stamp(&mut memory, MemoryRole::General, moved, new_size, old_tag);
                    buffers[index] = (moved, new_size, old_tag);
                }
            }
            _ => {
                let size = rng.gen_range(1..8 * 1024);
                if let Some(ptr) = memory.general().unwrap().alloc(size) {
                    stamp(&mut memory, MemoryRole::General, ptr, size, tag);
                    buffers.push((ptr, size, tag));
                }
            }
        }
        memory.general().unwrap().validate().unwrap();
    }

    for (ptr, _, _) in buffers.drain(..) {
        memory.general().unwrap().free(ptr);
    }
    assert_eq!(memory.general().unwrap().free_block_count(), 1);
}

// ============================================================================
// COMMON INTERFACE
// ============================================================================

#[test]
fn verify_every_role_serves_requests() {
    let config = shipped_config();
    let arena = config.create_arena().unwrap();
    let mut memory = GameMemory::new(&arena, &config).unwrap();

    for role in MemoryRole::ALL {
        let alloc = memory.allocator(role).expect("all roles configured");
        let ptr = alloc.alloc(48).unwrap();
        assert!(alloc.owns(ptr), "{} does not own its block", role.name());
        alloc.bytes_mut(ptr, 48).unwrap().fill(0x3C);
        assert_eq!(alloc.bytes(ptr, 48).unwrap(), &[0x3C; 48][..]);
        assert_eq!(alloc.stats().live_allocations, 1);

        alloc.reset();
        assert_eq!(alloc.stats().used, 0);
    }

    let report = memory.report();
    assert!(report.allocators.iter().all(|(_, s)| s.used == 0));
    assert!(report.to_string().contains("general"));
}
