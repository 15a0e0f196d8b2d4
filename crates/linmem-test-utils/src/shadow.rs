//! Shadow model of live payloads.
//!
//! [`ShadowHeap`] drives a real [`Heap`] and records, for every payload it
//! handed out, the requested size and a content tag. Each payload is
//! filled with [`crate::pattern`] for its tag, so any operation that
//! scribbles over a live payload, or loses bytes on relocation, is caught
//! by [`ShadowHeap::check`]. Failures panic with a description, which
//! both plain tests and proptest report.

use indexmap::IndexMap;
use linmem_heap::{BlockState, Heap, HeapConfig, HeapError, Payload, ALIGN, HEADER_SIZE};

use crate::{pattern, pattern_byte};

/// What the model knows about one live payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Live {
    /// Bytes the caller asked for; the granted size may be larger.
    pub requested: usize,
    /// Seed of the content pattern.
    pub tag: u8,
}

/// A heap plus an insertion-ordered map of its live payloads.
pub struct ShadowHeap {
    heap: Heap<Vec<u8>>,
    live: IndexMap<Payload, Live>,
    next_tag: u8,
}

impl ShadowHeap {
    /// Shadowed heap over `len` bytes with the default configuration.
    pub fn new(len: usize) -> Self {
        Self::with_config(len, HeapConfig::new())
    }

    /// Shadowed heap over `len` bytes with `config`.
    pub fn with_config(len: usize, config: HeapConfig) -> Self {
        Self {
            heap: crate::verified_heap_with(len, config),
            live: IndexMap::new(),
            next_tag: 1,
        }
    }

    pub fn heap(&self) -> &Heap<Vec<u8>> {
        &self.heap
    }

    pub fn live(&self) -> &IndexMap<Payload, Live> {
        &self.live
    }

    pub fn live_count(&self) -> usize {
        self.live.len()
    }

    /// The `index`-th live payload in insertion order, wrapping around.
    pub fn pick(&self, index: usize) -> Option<Payload> {
        if self.live.is_empty() {
            return None;
        }
        self.live
            .get_index(index % self.live.len())
            .map(|(payload, _)| *payload)
    }

    /// Allocate, check the grant and fill it with a fresh pattern.
    ///
    /// On failure asserts that the arena did not change.
    pub fn allocate(&mut self, size: usize) -> Result<Payload, HeapError> {
        let before = self.heap.as_bytes().to_vec();
        match self.heap.allocate(size) {
            Ok(payload) => {
                self.admit(payload, size);
                Ok(payload)
            }
            Err(err) => {
                assert_eq!(
                    self.heap.as_bytes(),
                    &before[..],
                    "failed allocate({size}) mutated the arena"
                );
                Err(err)
            }
        }
    }

    /// Zero-allocate, check the payload is all zeros, then pattern it.
    pub fn zero_allocate(&mut self, count: usize, size: usize) -> Result<Payload, HeapError> {
        let before = self.heap.as_bytes().to_vec();
        match self.heap.zero_allocate(count, size) {
            Ok(payload) => {
                assert!(
                    self.heap.payload(payload).iter().all(|&b| b == 0),
                    "zero_allocate({count}, {size}) left non-zero bytes in {payload}"
                );
                self.admit(payload, count * size);
                Ok(payload)
            }
            Err(err) => {
                assert_eq!(
                    self.heap.as_bytes(),
                    &before[..],
                    "failed zero_allocate mutated the arena"
                );
                Err(err)
            }
        }
    }

    /// Free a live payload and forget it.
    ///
    /// # Panics
    ///
    /// Panics if `payload` is not live in the model.
    pub fn free(&mut self, payload: Payload) {
        assert!(
            self.live.shift_remove(&payload).is_some(),
            "free of {payload} which is not live"
        );
        self.heap.free(Some(payload));
    }

    /// Resize a live payload and check the preserved prefix.
    pub fn resize(&mut self, payload: Payload, size: usize) -> Result<Payload, HeapError> {
        let Some(&old) = self.live.get(&payload) else {
            panic!("resize of {payload} which is not live");
        };
        let before = self.heap.as_bytes().to_vec();
        match self.heap.resize(Some(payload), size) {
            Ok(moved) => {
                let kept = old.requested.min(size);
                let bytes = &self.heap.payload(moved)[..kept];
                assert_eq!(
                    bytes,
                    &pattern(old.tag, kept)[..],
                    "resize lost bytes of {payload} -> {moved}"
                );
                self.live.shift_remove(&payload);
                self.live.insert(
                    moved,
                    Live {
                        requested: size,
                        tag: old.tag,
                    },
                );
                self.check_grant(moved, size);
                self.heap.payload_mut(moved)[..size].copy_from_slice(&pattern(old.tag, size));
                Ok(moved)
            }
            Err(err) => {
                assert_eq!(
                    self.heap.as_bytes(),
                    &before[..],
                    "failed resize of {payload} mutated the arena"
                );
                Err(err)
            }
        }
    }

    /// Free every live payload, oldest first.
    pub fn free_all(&mut self) {
        while let Some(payload) = self.pick(0) {
            self.free(payload);
        }
    }

    /// Check every structural and content invariant.
    ///
    /// # Panics
    ///
    /// Panics with a description of the first violation found.
    pub fn check(&self) {
        if let Err(err) = self.heap.validate() {
            panic!("chain invalid: {err}");
        }

        let used: Vec<_> = self
            .heap
            .blocks()
            .filter(|b| b.state == BlockState::Used)
            .collect();
        assert_eq!(used.len(), self.live.len(), "used blocks and live payloads disagree");
        for block in &used {
            let Some(payload) = block.payload() else {
                panic!("used block at {} has no payload", block.offset);
            };
            assert!(
                self.live.contains_key(&payload),
                "used block {payload} is not live in the model"
            );
        }

        let mut spans: Vec<(usize, usize)> = self
            .live
            .keys()
            .map(|&p| (p.offset(), self.heap.payload_size(p)))
            .collect();
        spans.sort_unstable();
        for pair in spans.windows(2) {
            let (start, size) = pair[0];
            assert!(
                start + size + HEADER_SIZE <= pair[1].0,
                "payload at {start} overlaps the block at {}",
                pair[1].0 - HEADER_SIZE
            );
        }

        for (&payload, live) in &self.live {
            let bytes = self.heap.payload(payload);
            if let Some(i) = (0..live.requested).find(|&i| bytes[i] != pattern_byte(live.tag, i)) {
                panic!("{payload} corrupted at byte {i}");
            }
        }
    }

    fn admit(&mut self, payload: Payload, requested: usize) {
        assert!(!self.live.contains_key(&payload), "{payload} handed out twice");
        self.check_grant(payload, requested);
        let tag = self.next_tag;
        self.next_tag = self.next_tag.wrapping_add(1).max(1);
        self.heap.payload_mut(payload)[..requested].copy_from_slice(&pattern(tag, requested));
        self.live.insert(payload, Live { requested, tag });
    }

    fn check_grant(&self, payload: Payload, requested: usize) {
        let granted = self.heap.payload_size(payload);
        assert_eq!(payload.offset() % ALIGN, 0, "{payload} is not aligned");
        assert!(granted >= requested.max(1), "{payload} granted {granted} < {requested}");
        assert!(
            payload.offset() + granted + HEADER_SIZE <= self.heap.capacity(),
            "{payload} of {granted} bytes leaves no room for a successor header"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracks_allocate_resize_free() {
        let mut shadow = ShadowHeap::new(256);
        let a = shadow.allocate(10).unwrap();
        let b = shadow.allocate(20).unwrap();
        shadow.check();
        let a = shadow.resize(a, 40).unwrap();
        shadow.check();
        shadow.free(b);
        shadow.free(a);
        shadow.check();
        assert_eq!(shadow.live_count(), 0);
    }

    #[test]
    fn pick_wraps_around() {
        let mut shadow = ShadowHeap::new(128);
        assert_eq!(shadow.pick(3), None);
        let a = shadow.allocate(4).unwrap();
        let b = shadow.allocate(4).unwrap();
        assert_eq!(shadow.pick(0), Some(a));
        assert_eq!(shadow.pick(3), Some(b));
    }

    #[test]
    #[should_panic(expected = "not live")]
    fn double_free_is_caught_by_model() {
        let mut shadow = ShadowHeap::new(64);
        let a = shadow.allocate(4).unwrap();
        shadow.free(a);
        shadow.free(a);
    }
}
