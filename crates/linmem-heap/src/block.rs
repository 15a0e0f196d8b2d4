//! Payload handles.
//!
//! A [`Payload`] is the allocator's answer to "where is my memory": the
//! byte offset of a granted payload inside the arena. The block header
//! always sits [`HEADER_SIZE`] bytes before it.

use std::fmt;

use crate::header::{ALIGN, HEADER_SIZE};

/// Offset of a payload handed out by [`crate::Heap`].
///
/// Handles are plain offsets: they stay meaningful only for the heap that
/// issued them and only until that payload is freed or relocated.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[must_use]
pub struct Payload(usize);

impl Payload {
    /// Handle for the payload following the header at `header_offset`.
    #[inline]
    pub(crate) fn from_header(header_offset: usize) -> Self {
        Self(header_offset + HEADER_SIZE)
    }

    /// Rebuild a handle from a raw payload offset, e.g. one that crossed a
    /// host boundary as an address.
    ///
    /// Returns `None` for offsets that can never be payloads: below the
    /// first header or not aligned. This does not check that the offset
    /// was actually issued by a heap.
    pub fn from_offset(offset: usize) -> Option<Self> {
        if offset < HEADER_SIZE || offset % ALIGN != 0 {
            return None;
        }
        Some(Self(offset))
    }

    /// Byte offset of the payload within the arena.
    #[inline]
    pub fn offset(self) -> usize {
        self.0
    }

    /// Byte offset of the header preceding the payload.
    #[inline]
    pub fn header_offset(self) -> usize {
        self.0 - HEADER_SIZE
    }
}

impl fmt::Display for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Payload(off={}, hdr={})", self.0, self.header_offset())
    }
}
