//! First-fit allocation with merge-ahead and splitting.
//!
//! The search is split in two phases. [`Heap::find_placement`] walks the
//! chain from the free hint without writing anything and returns where the
//! block goes plus the free runs it decided to collapse on the way. Only
//! then does [`Heap::allocate`] write headers, so a failed allocation
//! leaves the arena untouched.

use smallvec::SmallVec;

use crate::block::Payload;
use crate::error::HeapError;
use crate::header::{ALIGN, HEADER_SIZE};
use crate::heap::Heap;

/// A run of free blocks collapsed into one during the walk.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct PendingMerge {
    offset: usize,
    size: usize,
}

/// Collapses recorded during one walk. Most walks record none.
type MergeList = SmallVec<[PendingMerge; 4]>;

/// Where a new block goes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Placement {
    /// Grow the chain: the block at `offset` becomes the new block and a
    /// fresh terminal follows it.
    Extend { offset: usize },
    /// Reuse the free block at `offset`, whose payload (after any merge)
    /// is `size` bytes.
    Reuse { offset: usize, size: usize },
}

/// Outcome of scanning a run of free blocks.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct FreeRun {
    /// Payload bytes available if the run were one block.
    total: usize,
    /// Offset of the header that stopped the run.
    end: usize,
    /// Whether the run stopped at the terminal.
    reaches_terminal: bool,
}

impl<S: AsRef<[u8]> + AsMut<[u8]>> Heap<S> {
    /// Allocate at least `size` bytes.
    ///
    /// Returns the payload handle. The granted payload is `size` rounded up
    /// to [`ALIGN`] (zero counts as one unit), possibly more when a free
    /// block is reused whole rather than split.
    ///
    /// # Errors
    ///
    /// - [`HeapError::InvalidSize`] if the size cannot be encoded.
    /// - [`HeapError::CapacityExhausted`] if the chain would have to grow
    ///   past the end of the arena.
    pub fn allocate(&mut self, size: usize) -> Result<Payload, HeapError> {
        let need = self.format().normalize(size).inspect_err(|err| {
            log::debug!("allocate({size}): {err}");
        })?;

        let mut merges = MergeList::new();
        let placement = self.find_placement(need, &mut merges).inspect_err(|err| {
            log::debug!("allocate({size}): {err}");
        })?;

        for merge in &merges {
            log::trace!(
                "allocate: collapse free run at {} into {} bytes",
                merge.offset,
                merge.size
            );
            self.write_header(merge.offset, merge.size, false);
        }

        let offset = match placement {
            Placement::Extend { offset } => {
                log::trace!("allocate: extend chain at {offset}");
                self.write_header(offset, need, true);
                self.write_terminal(offset + HEADER_SIZE + need);
                offset
            }
            Placement::Reuse { offset, size } => {
                if size > need + HEADER_SIZE + ALIGN {
                    log::trace!("allocate: split {size} bytes at {offset}");
                    let rest = offset + HEADER_SIZE + need;
                    self.write_header(rest, size - need - HEADER_SIZE, false);
                    self.write_header(offset, need, true);
                } else {
                    log::trace!("allocate: reuse {size} bytes at {offset}");
                    self.write_header(offset, size, true);
                }
                offset
            }
        };

        if offset == self.first_free {
            self.advance_hint();
        }
        self.debug_verify();
        Ok(Payload::from_header(offset))
    }

    /// Walk the chain from the hint looking for room for `need` bytes.
    ///
    /// Free runs too small to satisfy the request are pushed onto `merges`
    /// instead of being written.
    fn find_placement(&self, need: usize, merges: &mut MergeList) -> Result<Placement, HeapError> {
        let mut offset = self.first_free;
        loop {
            let header = self.header_at(offset);
            if header.is_terminal() {
                return self.extend_at(offset, need);
            }
            if header.used {
                log::trace!("allocate: skip used block at {offset}");
                offset = header.next_offset(offset);
                continue;
            }
            if header.size >= need {
                return Ok(Placement::Reuse {
                    offset,
                    size: header.size,
                });
            }

            log::trace!("allocate: attempt merge at {offset}");
            let run = self.scan_free_run(offset, header.size);
            if run.reaches_terminal {
                return self.extend_at(offset, need);
            }
            // Sizes and headers are both multiples of ALIGN, so any surplus
            // over `need` leaves room for a split header.
            if run.total >= need {
                return Ok(Placement::Reuse {
                    offset,
                    size: run.total,
                });
            }
            if run.total != header.size {
                merges.push(PendingMerge {
                    offset,
                    size: run.total,
                });
            }
            offset = run.end;
        }
    }

    /// Sum the free blocks following the free block at `offset`.
    ///
    /// Stops at a used block, at the terminal, or before a block whose
    /// absorption would overflow the header's size field.
    fn scan_free_run(&self, offset: usize, size: usize) -> FreeRun {
        let max = self.format().max_size();
        let mut total = size;
        let mut cursor = offset + HEADER_SIZE + size;
        loop {
            let header = self.header_at(cursor);
            if header.used {
                return FreeRun {
                    total,
                    end: cursor,
                    reaches_terminal: false,
                };
            }
            if header.is_terminal() {
                return FreeRun {
                    total,
                    end: cursor,
                    reaches_terminal: true,
                };
            }
            let merged = total + HEADER_SIZE + header.size;
            if merged > max {
                return FreeRun {
                    total,
                    end: cursor,
                    reaches_terminal: false,
                };
            }
            total = merged;
            cursor = header.next_offset(cursor);
        }
    }

    /// Place a block of `need` bytes at `offset` with a terminal after it.
    fn extend_at(&self, offset: usize, need: usize) -> Result<Placement, HeapError> {
        if self.terminal_after(offset, need).is_none() {
            return Err(HeapError::CapacityExhausted {
                requested: need,
                available: self.capacity().saturating_sub(offset + 2 * HEADER_SIZE),
            });
        }
        Ok(Placement::Extend { offset })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HeapConfig;
    use crate::walk::BlockState;

    fn heap(len: usize) -> Heap<Vec<u8>> {
        Heap::new(vec![0u8; len]).unwrap()
    }

    fn layout(heap: &Heap<Vec<u8>>) -> Vec<(usize, BlockState)> {
        heap.blocks().map(|b| (b.size, b.state)).collect()
    }

    #[test]
    fn first_allocation_follows_first_header() {
        let mut heap = heap(64);
        let p = heap.allocate(10).unwrap();
        assert_eq!(p.offset(), HEADER_SIZE);
        assert_eq!(heap.payload_size(p), 12);
        assert_eq!(heap.first_free(), 16);
        assert_eq!(layout(&heap), vec![(12, BlockState::Used), (0, BlockState::Terminal)]);
    }

    #[test]
    fn zero_size_gets_one_unit() {
        let mut heap = heap(64);
        let p = heap.allocate(0).unwrap();
        assert_eq!(heap.payload_size(p), ALIGN);
    }

    #[test]
    fn used_blocks_are_skipped() {
        let mut heap = heap(64);
        let a = heap.allocate(4).unwrap();
        let b = heap.allocate(4).unwrap();
        assert_eq!(b.offset(), a.offset() + 4 + HEADER_SIZE);
    }

    #[test]
    fn oversized_free_block_is_split() {
        let mut heap = heap(128);
        let a = heap.allocate(32).unwrap();
        let _guard = heap.allocate(4).unwrap();
        heap.free(Some(a));
        let b = heap.allocate(8).unwrap();
        assert_eq!(b, a);
        assert_eq!(
            layout(&heap),
            vec![
                (8, BlockState::Used),
                (32 - 8 - HEADER_SIZE, BlockState::Free),
                (4, BlockState::Used),
                (0, BlockState::Terminal),
            ]
        );
        // The hint moved onto the remainder.
        assert_eq!(heap.first_free(), HEADER_SIZE + 8);
    }

    #[test]
    fn near_fit_is_handed_out_whole() {
        let mut heap = heap(128);
        let a = heap.allocate(16).unwrap();
        let _guard = heap.allocate(4).unwrap();
        heap.free(Some(a));
        // 16 - 8 is exactly one header plus one unit: not worth a split.
        let b = heap.allocate(8).unwrap();
        assert_eq!(b, a);
        assert_eq!(heap.payload_size(b), 16);
    }

    /// x(4) free(8) free(8) guard(4): two adjacent free blocks, which only
    /// a truncating resize in front of an already free block can produce.
    fn two_adjacent_free_blocks(len: usize) -> (Heap<Vec<u8>>, Payload) {
        let mut heap = heap(len);
        let x = heap.allocate(16).unwrap();
        let y = heap.allocate(8).unwrap();
        let _guard = heap.allocate(4).unwrap();
        heap.free(Some(y));
        let x = heap.resize(Some(x), 4).unwrap();
        assert_eq!(
            layout(&heap),
            vec![
                (4, BlockState::Used),
                (8, BlockState::Free),
                (8, BlockState::Free),
                (4, BlockState::Used),
                (0, BlockState::Terminal),
            ]
        );
        (heap, x)
    }

    #[test]
    fn free_absorbs_truncated_tail() {
        let mut heap = heap(256);
        let a = heap.allocate(32).unwrap();
        let _guard = heap.allocate(4).unwrap();
        let a = heap.resize(Some(a), 12).unwrap();
        heap.free(Some(a));
        let b = heap.allocate(32).unwrap();
        assert_eq!(b, a);
    }

    #[test]
    fn merge_ahead_satisfies_request_from_adjacent_free_blocks() {
        let (mut heap, x) = two_adjacent_free_blocks(128);
        let high_water = heap.high_water();
        let p = heap.allocate(20).unwrap();
        assert_eq!(p.header_offset(), x.offset() + 4);
        assert_eq!(heap.payload_size(p), 20);
        assert_eq!(heap.high_water(), high_water);
        assert_eq!(heap.first_free(), heap.high_water() - HEADER_SIZE);
    }

    #[test]
    fn insufficient_run_is_collapsed_when_allocation_commits() {
        let (mut heap, _x) = two_adjacent_free_blocks(128);
        let p = heap.allocate(24).unwrap();
        assert_eq!(p.header_offset(), 40);
        assert_eq!(
            layout(&heap),
            vec![
                (4, BlockState::Used),
                (20, BlockState::Free),
                (4, BlockState::Used),
                (24, BlockState::Used),
                (0, BlockState::Terminal),
            ]
        );
        assert_eq!(heap.first_free(), 8);
    }

    #[test]
    fn failed_walk_does_not_commit_pending_merges() {
        let (mut heap, _x) = two_adjacent_free_blocks(64);
        let before = heap.as_bytes().to_vec();
        let hint = heap.first_free();
        assert!(matches!(
            heap.allocate(40),
            Err(HeapError::CapacityExhausted { requested: 40, .. })
        ));
        assert_eq!(heap.as_bytes(), &before[..]);
        assert_eq!(heap.first_free(), hint);
    }

    #[test]
    fn merge_ahead_reaching_terminal_extends_in_place() {
        let mut heap = Heap::with_config(vec![0u8; 0x20000], HeapConfig::compact()).unwrap();
        let a = heap.allocate(0x6000).unwrap();
        let b = heap.allocate(0x6000).unwrap();
        heap.free(Some(a));
        // Merging b backwards would overflow the 15-bit size field, so `a`
        // stays free right in front of the new terminal.
        heap.free(Some(b));
        assert_eq!(
            layout(&heap),
            vec![(0x6000, BlockState::Free), (0, BlockState::Terminal)]
        );
        let c = heap.allocate(0x7000).unwrap();
        assert_eq!(c, a);
        assert_eq!(heap.payload_size(c), 0x7000);
        assert_eq!(heap.high_water(), HEADER_SIZE + 0x7000 + HEADER_SIZE);
    }

    #[test]
    fn exhaustion_leaves_arena_untouched() {
        let mut heap = heap(64);
        let _a = heap.allocate(8).unwrap();
        let before = heap.as_bytes().to_vec();
        let hint = heap.first_free();
        match heap.allocate(64) {
            Err(HeapError::CapacityExhausted {
                requested: 64,
                available,
            }) => assert_eq!(available, 64 - 12 - 2 * HEADER_SIZE),
            other => panic!("expected CapacityExhausted, got {other:?}"),
        }
        assert_eq!(heap.as_bytes(), &before[..]);
        assert_eq!(heap.first_free(), hint);
    }

    #[test]
    fn exact_fill_of_arena_succeeds() {
        let mut heap = heap(64);
        // 4 (header) + 56 + 4 (terminal) == 64.
        let p = heap.allocate(56).unwrap();
        assert_eq!(heap.payload_size(p), 56);
        assert!(heap.allocate(0).is_err());
    }

    #[test]
    fn flag_collision_rejected_before_walk() {
        let mut heap = Heap::with_config(vec![0u8; 64], HeapConfig::compact()).unwrap();
        let before = heap.as_bytes().to_vec();
        assert_eq!(
            heap.allocate(0x8000),
            Err(HeapError::InvalidSize { requested: 0x8000 })
        );
        assert_eq!(heap.as_bytes(), &before[..]);
    }

    #[test]
    fn hint_skips_past_consecutive_used_blocks() {
        let mut heap = heap(128);
        let a = heap.allocate(4).unwrap();
        let b = heap.allocate(4).unwrap();
        let _c = heap.allocate(4).unwrap();
        heap.free(Some(a));
        heap.free(Some(b));
        assert_eq!(heap.first_free(), 0);
        // Reuses the merged a+b block whole (12 bytes, no room to split).
        let d = heap.allocate(12).unwrap();
        assert_eq!(d, a);
        assert_eq!(heap.first_free(), 24);
    }
}
