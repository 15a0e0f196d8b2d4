//! Block header encoding.
//!
//! A header is one little-endian `u32` placed immediately before its
//! payload:
//!
//! ```text
//!  bit 31 (flag_bit)        bits flag_bit-1 ..= 0
//! +------------------+--------------------------------+
//! |       used       |          payload size          |
//! +------------------+--------------------------------+
//! ```
//!
//! The flag position is configurable (see [`crate::HeapConfig`]); any bits
//! above it must be zero. A word of exactly `0` is the terminal sentinel.

use crate::error::HeapError;

/// Size of a block header in bytes.
pub const HEADER_SIZE: usize = 4;

/// Payload sizes and payload offsets are always multiples of this.
pub const ALIGN: usize = 4;

/// Decoded view of a header word.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Header {
    /// Whether the payload is currently handed out.
    pub used: bool,
    /// Payload length in bytes, header excluded.
    pub size: usize,
}

impl Header {
    /// The terminal sentinel: free with a zero size.
    pub const TERMINAL: Header = Header {
        used: false,
        size: 0,
    };

    /// Whether this header marks the end of the chain.
    #[inline]
    pub fn is_terminal(&self) -> bool {
        !self.used && self.size == 0
    }

    /// Whether this is a real free block (not the terminal).
    #[inline]
    pub fn is_free(&self) -> bool {
        !self.used && self.size != 0
    }

    /// Offset of the successor header given this header's own offset.
    #[inline]
    pub fn next_offset(&self, offset: usize) -> usize {
        offset + HEADER_SIZE + self.size
    }
}

/// Packs and unpacks header words for one flag position.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HeaderFormat {
    used_flag: u32,
}

impl HeaderFormat {
    /// Format whose used flag is bit `flag_bit`.
    ///
    /// `flag_bit` must be validated by the caller (see
    /// [`crate::HeapConfig::validate`]).
    pub const fn new(flag_bit: u32) -> Self {
        Self {
            used_flag: 1 << flag_bit,
        }
    }

    /// The used flag as a mask.
    #[inline]
    pub fn used_flag(&self) -> u32 {
        self.used_flag
    }

    /// Mask selecting the size bits.
    #[inline]
    pub fn size_mask(&self) -> u32 {
        self.used_flag - 1
    }

    /// Largest payload size a header can record.
    #[inline]
    pub fn max_size(&self) -> usize {
        self.size_mask() as usize & !(ALIGN - 1)
    }

    /// Encode a header word. `size` must not exceed [`Self::max_size`].
    #[inline]
    pub fn encode(&self, size: usize, used: bool) -> u32 {
        debug_assert!(size <= self.max_size(), "block size {size} overflows header");
        debug_assert_eq!(size % ALIGN, 0, "block size {size} is not aligned");
        let word = size as u32 & self.size_mask();
        if used {
            word | self.used_flag
        } else {
            word
        }
    }

    /// Decode a header word, ignoring any bits above the flag.
    #[inline]
    pub fn decode(&self, word: u32) -> Header {
        Header {
            used: word & self.used_flag != 0,
            size: (word & self.size_mask()) as usize,
        }
    }

    /// Whether `word` has bits set above the used flag.
    #[inline]
    pub fn has_stray_bits(&self, word: u32) -> bool {
        word & !(self.used_flag | self.size_mask()) != 0
    }

    /// Turn a requested byte count into a block size.
    ///
    /// Zero becomes one alignment unit; everything is rounded up to
    /// [`ALIGN`]. Sizes that would reach into the used flag are rejected.
    pub fn normalize(&self, requested: usize) -> Result<usize, HeapError> {
        match requested.max(ALIGN).checked_next_multiple_of(ALIGN) {
            Some(size) if size <= self.max_size() => Ok(size),
            _ => Err(HeapError::InvalidSize { requested }),
        }
    }
}

/// Read the header word at `offset`.
///
/// # Panics
///
/// Panics if `offset + HEADER_SIZE` exceeds `mem`.
#[inline]
pub(crate) fn read_word(mem: &[u8], offset: usize) -> u32 {
    let mut bytes = [0u8; HEADER_SIZE];
    bytes.copy_from_slice(&mem[offset..offset + HEADER_SIZE]);
    u32::from_le_bytes(bytes)
}

/// Write the header word at `offset`.
///
/// # Panics
///
/// Panics if `offset + HEADER_SIZE` exceeds `mem`.
#[inline]
pub(crate) fn write_word(mem: &mut [u8], offset: usize, word: u32) {
    mem[offset..offset + HEADER_SIZE].copy_from_slice(&word.to_le_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_is_zero_word() {
        let fmt = HeaderFormat::new(31);
        assert_eq!(fmt.decode(0), Header::TERMINAL);
        assert!(fmt.decode(0).is_terminal());
        assert_eq!(fmt.encode(0, false), 0);
    }

    #[test]
    fn used_flag_sits_in_high_bit() {
        let fmt = HeaderFormat::new(31);
        let word = fmt.encode(64, true);
        assert_eq!(word, 0x8000_0040);
        let header = fmt.decode(word);
        assert!(header.used);
        assert_eq!(header.size, 64);
        assert!(!header.is_terminal());
    }

    #[test]
    fn compact_format_matches_16_bit_layout() {
        let fmt = HeaderFormat::new(15);
        assert_eq!(fmt.used_flag(), 0x8000);
        assert_eq!(fmt.max_size(), 0x7FFC);
        assert_eq!(fmt.encode(12, true), 0x800C);
    }

    #[test]
    fn normalize_rounds_up_and_promotes_zero() {
        let fmt = HeaderFormat::new(31);
        assert_eq!(fmt.normalize(0), Ok(4));
        assert_eq!(fmt.normalize(1), Ok(4));
        assert_eq!(fmt.normalize(4), Ok(4));
        assert_eq!(fmt.normalize(5), Ok(8));
        assert_eq!(fmt.normalize(13), Ok(16));
    }

    #[test]
    fn normalize_rejects_flag_collision() {
        let fmt = HeaderFormat::new(15);
        assert_eq!(fmt.normalize(0x7FFC), Ok(0x7FFC));
        assert_eq!(fmt.normalize(0x7FF9), Ok(0x7FFC));
        assert_eq!(
            fmt.normalize(0x7FFD),
            Err(HeapError::InvalidSize { requested: 0x7FFD })
        );
        assert_eq!(
            fmt.normalize(0x8000),
            Err(HeapError::InvalidSize { requested: 0x8000 })
        );
        // Bit 15 clear but still far too large for the size field.
        assert_eq!(
            fmt.normalize(0x1_0000),
            Err(HeapError::InvalidSize { requested: 0x1_0000 })
        );
    }

    #[test]
    fn normalize_rejects_rounding_overflow() {
        let fmt = HeaderFormat::new(31);
        assert_eq!(
            fmt.normalize(usize::MAX),
            Err(HeapError::InvalidSize {
                requested: usize::MAX
            })
        );
    }

    #[test]
    fn stray_bits_detected_above_flag() {
        let fmt = HeaderFormat::new(15);
        assert!(!fmt.has_stray_bits(0x8004));
        assert!(fmt.has_stray_bits(0x1_0004));
        assert!(!HeaderFormat::new(31).has_stray_bits(u32::MAX));
    }

    #[test]
    fn word_roundtrip_is_little_endian() {
        let mut mem = [0u8; 8];
        write_word(&mut mem, 4, 0x8000_0010);
        assert_eq!(mem[4..8], [0x10, 0x00, 0x00, 0x80]);
        assert_eq!(read_word(&mem, 4), 0x8000_0010);
    }

    #[test]
    fn next_offset_steps_over_header_and_payload() {
        let header = Header {
            used: true,
            size: 12,
        };
        assert_eq!(header.next_offset(8), 8 + HEADER_SIZE + 12);
    }
}
