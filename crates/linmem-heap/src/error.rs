//! Heap error types.

use std::error::Error;
use std::fmt;

/// Recoverable failures of the allocator operations.
///
/// A failed operation leaves the arena byte-for-byte unchanged.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HeapError {
    /// The arena cannot hold the payload plus a new terminal sentinel.
    CapacityExhausted {
        /// Normalized payload size that was requested, in bytes.
        requested: usize,
        /// Largest payload that could have been granted at the point where
        /// the chain would grow, in bytes.
        available: usize,
    },
    /// The size cannot be encoded in a block header (it would reach the
    /// used flag) or its computation overflowed.
    InvalidSize {
        /// Size in bytes as passed by the caller.
        requested: usize,
    },
}

impl fmt::Display for HeapError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CapacityExhausted {
                requested,
                available,
            } => {
                write!(
                    f,
                    "heap capacity exhausted: requested {requested} bytes, {available} bytes available"
                )
            }
            Self::InvalidSize { requested } => {
                write!(f, "invalid allocation size: {requested} bytes")
            }
        }
    }
}

impl Error for HeapError {}

/// Errors raised while initializing a heap.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConfigError {
    /// The storage cannot even hold the terminal sentinel.
    StorageTooSmall {
        /// Length of the storage in bytes.
        len: usize,
        /// Minimum required length in bytes.
        min: usize,
    },
    /// The used flag bit is outside the supported range.
    FlagBitOutOfRange {
        /// The configured bit position.
        bit: u32,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StorageTooSmall { len, min } => {
                write!(f, "storage of {len} bytes is below minimum of {min}")
            }
            Self::FlagBitOutOfRange { bit } => {
                write!(f, "used flag bit {bit} is outside the supported range")
            }
        }
    }
}

impl Error for ConfigError {}

/// Structural defects found by [`crate::Heap::validate`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChainError {
    /// A header, or the payload it describes, extends past the arena.
    OutOfBounds {
        /// Offset of the offending header.
        offset: usize,
        /// Arena capacity in bytes.
        capacity: usize,
    },
    /// A header has bits set above the used flag.
    CorruptHeader {
        /// Offset of the offending header.
        offset: usize,
        /// The raw header word.
        word: u32,
    },
    /// A block size is not a multiple of the alignment.
    Misaligned {
        /// Offset of the offending header.
        offset: usize,
        /// The recorded size.
        size: usize,
    },
    /// A used block records a zero size.
    ZeroSizedBlock {
        /// Offset of the offending header.
        offset: usize,
    },
    /// The free hint is not on a block boundary or points at a used block.
    HintMisplaced {
        /// The hint offset.
        hint: usize,
    },
    /// A free block lies below the free hint.
    FreeBelowHint {
        /// Offset of the free block.
        offset: usize,
        /// The hint offset.
        hint: usize,
    },
}

impl fmt::Display for ChainError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OutOfBounds { offset, capacity } => {
                write!(
                    f,
                    "block at {offset} extends past arena capacity {capacity}"
                )
            }
            Self::CorruptHeader { offset, word } => {
                write!(f, "corrupt header {word:#010x} at {offset}")
            }
            Self::Misaligned { offset, size } => {
                write!(f, "block at {offset} has unaligned size {size}")
            }
            Self::ZeroSizedBlock { offset } => {
                write!(f, "used block at {offset} has zero size")
            }
            Self::HintMisplaced { hint } => {
                write!(f, "free hint {hint} does not point at a free block")
            }
            Self::FreeBelowHint { offset, hint } => {
                write!(f, "free block at {offset} lies below free hint {hint}")
            }
        }
    }
}

impl Error for ChainError {}
