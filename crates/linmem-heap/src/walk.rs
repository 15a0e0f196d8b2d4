//! Chain introspection: block iteration, statistics and validation.
//!
//! None of this is needed to allocate. It exists for diagnostics, tests
//! and the optional post-mutation verification (see
//! [`crate::HeapConfig::verify`]).

use std::fmt;

use crate::block::Payload;
use crate::error::ChainError;
use crate::header::{self, HeaderFormat, ALIGN, HEADER_SIZE};
use crate::heap::Heap;

/// What a block in the chain currently is.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BlockState {
    /// Available for reuse.
    Free,
    /// Handed out to a caller.
    Used,
    /// The end-of-chain sentinel.
    Terminal,
}

/// One block as seen by [`Heap::blocks`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlockInfo {
    /// Offset of the block header.
    pub offset: usize,
    /// Payload size in bytes; zero for the terminal.
    pub size: usize,
    /// Free, used or terminal.
    pub state: BlockState,
}

impl BlockInfo {
    /// Handle for this block's payload, if it is a used block.
    pub fn payload(&self) -> Option<Payload> {
        match self.state {
            BlockState::Used => Payload::from_offset(self.offset + HEADER_SIZE),
            _ => None,
        }
    }
}

/// Iterator over the chain, terminal included.
///
/// Stops early, without panicking, if a header would lie outside the
/// arena.
pub struct Blocks<'a> {
    mem: &'a [u8],
    format: HeaderFormat,
    cursor: Option<usize>,
}

impl Iterator for Blocks<'_> {
    type Item = BlockInfo;

    fn next(&mut self) -> Option<BlockInfo> {
        let offset = self.cursor?;
        if offset.checked_add(HEADER_SIZE)? > self.mem.len() {
            self.cursor = None;
            return None;
        }
        let header = self.format.decode(header::read_word(self.mem, offset));
        let state = if header.used {
            BlockState::Used
        } else if header.is_terminal() {
            BlockState::Terminal
        } else {
            BlockState::Free
        };
        self.cursor = match state {
            BlockState::Terminal => None,
            _ => Some(header.next_offset(offset)),
        };
        Some(BlockInfo {
            offset,
            size: header.size,
            state,
        })
    }
}

/// Aggregate counters over one walk of the chain.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct HeapStats {
    /// Arena size in bytes.
    pub capacity: usize,
    /// Offset just past the terminal header.
    pub high_water: usize,
    /// Number of used blocks.
    pub used_blocks: usize,
    /// Number of free blocks, terminal excluded.
    pub free_blocks: usize,
    /// Payload bytes held by used blocks.
    pub used_bytes: usize,
    /// Payload bytes held by free blocks.
    pub free_bytes: usize,
    /// Largest single free payload.
    pub largest_free: usize,
}

impl fmt::Display for HeapStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{} bytes in chain, {} used ({} B), {} free ({} B, largest {})",
            self.high_water,
            self.capacity,
            self.used_blocks,
            self.used_bytes,
            self.free_blocks,
            self.free_bytes,
            self.largest_free
        )
    }
}

impl<S: AsRef<[u8]> + AsMut<[u8]>> Heap<S> {
    /// Iterate every block from offset 0 up to and including the terminal.
    pub fn blocks(&self) -> Blocks<'_> {
        Blocks {
            mem: self.mem(),
            format: self.format(),
            cursor: Some(0),
        }
    }

    /// Offset just past the terminal header.
    ///
    /// Returns the capacity if the chain never reaches a terminal.
    pub fn high_water(&self) -> usize {
        self.blocks()
            .find(|b| b.state == BlockState::Terminal)
            .map_or(self.capacity(), |b| b.offset + HEADER_SIZE)
    }

    /// Walk the chain once and count blocks and bytes.
    pub fn stats(&self) -> HeapStats {
        let mut stats = HeapStats {
            capacity: self.capacity(),
            high_water: self.capacity(),
            ..HeapStats::default()
        };
        for block in self.blocks() {
            match block.state {
                BlockState::Used => {
                    stats.used_blocks += 1;
                    stats.used_bytes += block.size;
                }
                BlockState::Free => {
                    stats.free_blocks += 1;
                    stats.free_bytes += block.size;
                    stats.largest_free = stats.largest_free.max(block.size);
                }
                BlockState::Terminal => stats.high_water = block.offset + HEADER_SIZE,
            }
        }
        stats
    }

    /// Check the structural invariants of the chain and the free hint.
    ///
    /// Verifies that every header and payload lies inside the arena, that
    /// no header has bits above the used flag, that sizes are aligned, that
    /// used blocks are non-empty, and that the hint sits on a block boundary
    /// that is not used with only used blocks below it.
    pub fn validate(&self) -> Result<(), ChainError> {
        let mem = self.mem();
        let capacity = mem.len();
        let format = self.format();
        let hint = self.first_free;
        let mut hint_seen = false;
        let mut offset = 0usize;

        loop {
            if offset + HEADER_SIZE > capacity {
                return Err(ChainError::OutOfBounds { offset, capacity });
            }
            let word = header::read_word(mem, offset);
            if format.has_stray_bits(word) {
                return Err(ChainError::CorruptHeader { offset, word });
            }
            let header = format.decode(word);
            if header.is_terminal() {
                hint_seen |= offset == hint;
                break;
            }
            if header.size % ALIGN != 0 {
                return Err(ChainError::Misaligned {
                    offset,
                    size: header.size,
                });
            }
            if header.used && header.size == 0 {
                return Err(ChainError::ZeroSizedBlock { offset });
            }
            // The payload and the header after it must both fit.
            if header.next_offset(offset) + HEADER_SIZE > capacity {
                return Err(ChainError::OutOfBounds { offset, capacity });
            }
            if offset == hint {
                if header.used {
                    return Err(ChainError::HintMisplaced { hint });
                }
                hint_seen = true;
            } else if !header.used && offset < hint {
                return Err(ChainError::FreeBelowHint { offset, hint });
            }
            offset = header.next_offset(offset);
        }

        if !hint_seen {
            return Err(ChainError::HintMisplaced { hint });
        }
        Ok(())
    }
}
