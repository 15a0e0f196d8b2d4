//! Heap configuration parameters.

use crate::error::ConfigError;
use crate::header::{HeaderFormat, ALIGN, HEADER_SIZE};

/// Configuration for a [`crate::Heap`].
///
/// Validated at construction; immutable afterwards.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HeapConfig {
    /// Bit position of the used flag inside the 32-bit header word.
    ///
    /// Default: 31, giving a largest block of `2^31 - 4` bytes. Must lie in
    /// [`Self::MIN_FLAG_BIT`]`..=`[`Self::MAX_FLAG_BIT`].
    pub flag_bit: u32,

    /// Re-validate the whole block chain after every mutating operation.
    ///
    /// Only honoured in builds with debug assertions; a failed check panics.
    /// Default: on in debug builds. Turns every operation into an O(blocks)
    /// walk, so long-running tests may want it off.
    pub verify: bool,
}

impl HeapConfig {
    /// Default flag position: the top bit of the header word.
    pub const DEFAULT_FLAG_BIT: u32 = 31;

    /// Flag position of the 16-bit layout (`0x8000`), see [`Self::compact`].
    pub const COMPACT_FLAG_BIT: u32 = 15;

    /// Smallest supported flag position.
    pub const MIN_FLAG_BIT: u32 = 8;

    /// Largest supported flag position.
    pub const MAX_FLAG_BIT: u32 = 31;

    /// Create a config with default values.
    pub fn new() -> Self {
        Self {
            flag_bit: Self::DEFAULT_FLAG_BIT,
            verify: cfg!(debug_assertions),
        }
    }

    /// Config using the `0x8000` flag, limiting blocks to 32 KiB.
    pub fn compact() -> Self {
        Self {
            flag_bit: Self::COMPACT_FLAG_BIT,
            ..Self::new()
        }
    }

    /// Override the flag position.
    pub fn with_flag_bit(mut self, flag_bit: u32) -> Self {
        self.flag_bit = flag_bit;
        self
    }

    /// Enable or disable per-operation chain verification.
    pub fn with_verify(mut self, verify: bool) -> Self {
        self.verify = verify;
        self
    }

    /// Check the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(Self::MIN_FLAG_BIT..=Self::MAX_FLAG_BIT).contains(&self.flag_bit) {
            return Err(ConfigError::FlagBitOutOfRange { bit: self.flag_bit });
        }
        Ok(())
    }

    /// Header format described by this config.
    pub fn format(&self) -> HeaderFormat {
        HeaderFormat::new(self.flag_bit)
    }

    /// Largest payload a single block can hold.
    pub fn max_block_size(&self) -> usize {
        self.format().max_size()
    }

    /// Smallest storage that can host a heap: one terminal header.
    pub fn min_storage(&self) -> usize {
        HEADER_SIZE
    }

    /// Smallest storage that can host one block of `size` bytes, or `None`
    /// if that does not fit in a `usize`.
    pub fn storage_for(&self, size: usize) -> Option<usize> {
        let size = size.max(ALIGN).checked_next_multiple_of(ALIGN)?;
        // Block header, payload, then the terminal that follows it.
        size.checked_add(2 * HEADER_SIZE)
    }
}

impl Default for HeapConfig {
    fn default() -> Self {
        Self::new()
    }
}
