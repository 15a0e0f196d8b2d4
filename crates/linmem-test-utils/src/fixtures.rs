//! Scripted allocator workloads.
//!
//! A script is a list of [`Op`]s referring to live payloads by slot index
//! (wrapped over however many are live when the op runs), so any script is
//! valid against any heap. [`random_script`] derives one from a seed with
//! a ChaCha8 RNG; the same seed always yields the same script.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::shadow::ShadowHeap;

/// One allocator call in a script.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Op {
    Allocate { size: usize },
    ZeroAllocate { count: usize, size: usize },
    Free { slot: usize },
    Resize { slot: usize, size: usize },
}

/// Counters from [`run_script`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ScriptStats {
    pub granted: usize,
    pub exhausted: usize,
    pub invalid: usize,
    pub freed: usize,
    pub relocated: usize,
    pub skipped: usize,
}

/// Generate `len` ops with sizes in `0..=max_size`.
///
/// Weights favour allocation slightly over release so long scripts build
/// up fragmentation before hitting capacity.
pub fn random_script(seed: u64, len: usize, max_size: usize) -> Vec<Op> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    (0..len)
        .map(|_| match rng.random_range(0..10u32) {
            0..=3 => Op::Allocate {
                size: rng.random_range(0..=max_size),
            },
            4 => Op::ZeroAllocate {
                count: rng.random_range(1..=4),
                size: rng.random_range(0..=max_size / 4),
            },
            5..=7 => Op::Free {
                slot: rng.random_range(0..64),
            },
            _ => Op::Resize {
                slot: rng.random_range(0..64),
                size: rng.random_range(0..=max_size),
            },
        })
        .collect()
}

/// Apply `ops` to `shadow`, checking all invariants after every op.
///
/// Ops that refer to a slot while nothing is live are skipped.
pub fn run_script(shadow: &mut ShadowHeap, ops: &[Op]) -> ScriptStats {
    let mut stats = ScriptStats::default();
    for op in ops {
        let result = match *op {
            Op::Allocate { size } => Some(shadow.allocate(size).map(|_| ())),
            Op::ZeroAllocate { count, size } => Some(shadow.zero_allocate(count, size).map(|_| ())),
            Op::Free { slot } => shadow.pick(slot).map(|payload| {
                shadow.free(payload);
                stats.freed += 1;
                Ok(())
            }),
            Op::Resize { slot, size } => shadow.pick(slot).map(|payload| {
                shadow.resize(payload, size).map(|moved| {
                    if moved != payload {
                        stats.relocated += 1;
                    }
                })
            }),
        };
        match result {
            None => stats.skipped += 1,
            Some(Ok(())) => {
                if !matches!(op, Op::Free { .. }) {
                    stats.granted += 1;
                }
            }
            Some(Err(linmem_heap::HeapError::CapacityExhausted { .. })) => stats.exhausted += 1,
            Some(Err(linmem_heap::HeapError::InvalidSize { .. })) => stats.invalid += 1,
        }
        shadow.check();
    }
    stats
}
