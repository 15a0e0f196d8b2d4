//! Benchmark workloads for the linmem arena allocator.
//!
//! - [`small_objects_profile`]: many short-lived small payloads.
//! - [`mixed_profile`]: a wider size range with resizes.
//! - [`fragmented_heap`]: a heap pre-shaped into alternating used and free
//!   blocks, the worst case for the first-fit walk.

#![forbid(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

use linmem_heap::{Heap, HeapConfig, Payload};
use linmem_test_utils::{random_script, Op};

/// Arena size used by all profiles: one 64 KiB wasm page.
pub const ARENA_BYTES: usize = 64 * 1024;

/// Script of `len` ops with payloads up to 64 bytes.
pub fn small_objects_profile(seed: u64, len: usize) -> Vec<Op> {
    random_script(seed, len, 64)
}

/// Script of `len` ops with payloads up to 2 KiB.
pub fn mixed_profile(seed: u64, len: usize) -> Vec<Op> {
    random_script(seed, len, 2048)
}

/// Fresh heap of [`ARENA_BYTES`] with verification off.
pub fn bench_heap() -> Heap<Vec<u8>> {
    bench_heap_with(HeapConfig::new())
}

/// Fresh heap of [`ARENA_BYTES`] with `config`, verification off.
pub fn bench_heap_with(config: HeapConfig) -> Heap<Vec<u8>> {
    match Heap::with_config(vec![0u8; ARENA_BYTES], config.with_verify(false)) {
        Ok(heap) => heap,
        Err(err) => panic!("bench heap rejected: {err}"),
    }
}

/// Allocate `blocks` payloads of `size` bytes and free every other one.
///
/// Returns the heap and the payloads still live.
pub fn fragmented_heap(blocks: usize, size: usize) -> (Heap<Vec<u8>>, Vec<Payload>) {
    let mut heap = bench_heap();
    let mut all = Vec::with_capacity(blocks);
    for _ in 0..blocks {
        let Ok(payload) = heap.allocate(size) else {
            break;
        };
        all.push(payload);
    }
    let mut live = Vec::with_capacity(all.len() / 2);
    for (i, payload) in all.into_iter().enumerate() {
        if i % 2 == 0 {
            heap.free(Some(payload));
        } else {
            live.push(payload);
        }
    }
    (heap, live)
}

/// Replay a script directly against `heap` without the shadow model.
///
/// Returns the number of successful grants.
pub fn replay(heap: &mut Heap<Vec<u8>>, ops: &[Op], live: &mut Vec<Payload>) -> usize {
    let mut granted = 0;
    for op in ops {
        match *op {
            Op::Allocate { size } => {
                if let Ok(p) = heap.allocate(size) {
                    live.push(p);
                    granted += 1;
                }
            }
            Op::ZeroAllocate { count, size } => {
                if let Ok(p) = heap.zero_allocate(count, size) {
                    live.push(p);
                    granted += 1;
                }
            }
            Op::Free { slot } => {
                if !live.is_empty() {
                    let p = live.swap_remove(slot % live.len());
                    heap.free(Some(p));
                }
            }
            Op::Resize { slot, size } => {
                if !live.is_empty() {
                    let i = slot % live.len();
                    if let Ok(p) = heap.resize(Some(live[i]), size) {
                        live[i] = p;
                        granted += 1;
                    }
                }
            }
        }
    }
    granted
}
