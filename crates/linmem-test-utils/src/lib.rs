//! Test utilities for linmem development.
//!
//! Provides a [`ShadowHeap`] that mirrors every live payload of a
//! [`Heap`] in an ordered map and checks payload contents and chain
//! structure after each operation, plus scripted workloads in
//! [`fixtures`].

#![forbid(unsafe_code)]
#![allow(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod fixtures;
pub mod shadow;

pub use fixtures::{random_script, run_script, Op, ScriptStats};
pub use shadow::ShadowHeap;

use linmem_heap::{Heap, HeapConfig};

/// Byte expected at position `index` of a payload tagged `tag`.
///
/// Position-dependent so that a payload copied to the wrong offset, or
/// truncated, shows up as a mismatch.
#[inline]
pub fn pattern_byte(tag: u8, index: usize) -> u8 {
    tag ^ (index as u8).wrapping_mul(0x9D)
}

/// `len` bytes of the pattern for `tag`.
pub fn pattern(tag: u8, len: usize) -> Vec<u8> {
    (0..len).map(|i| pattern_byte(tag, i)).collect()
}

/// A heap over a zero-filled `Vec` with per-operation verification on.
pub fn verified_heap(len: usize) -> Heap<Vec<u8>> {
    verified_heap_with(len, HeapConfig::new())
}

/// Like [`verified_heap`] with an explicit base configuration.
pub fn verified_heap_with(len: usize, config: HeapConfig) -> Heap<Vec<u8>> {
    match Heap::with_config(vec![0u8; len], config.with_verify(true)) {
        Ok(heap) => heap,
        Err(err) => panic!("test heap of {len} bytes rejected: {err}"),
    }
}
