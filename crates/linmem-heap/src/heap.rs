//! The arena allocator.
//!
//! [`Heap`] owns the storage and the free hint. Allocation lives in
//! `allocate.rs`, resizing in `resize.rs`, chain walking in
//! [`crate::walk`]; this module holds construction, free, zero-allocate and
//! the header accessors they share.

use crate::block::Payload;
use crate::config::HeapConfig;
use crate::error::{ConfigError, HeapError};
use crate::header::{self, Header, HeaderFormat, HEADER_SIZE};
use crate::raw;

/// Implicit free-list allocator over one arena.
///
/// `S` is any owned or borrowed byte buffer: `Vec<u8>`, `Box<[u8]>`, or a
/// `&mut [u8]` handed over by a host. The heap is its only mutator for as
/// long as it lives; [`Heap::into_inner`] gives the storage back.
pub struct Heap<S> {
    storage: S,
    config: HeapConfig,
    format: HeaderFormat,
    /// Lowest block that may be free. Every block below it is used.
    pub(crate) first_free: usize,
}

impl<S: AsRef<[u8]> + AsMut<[u8]>> Heap<S> {
    /// Initialize a heap over `storage` with the default configuration.
    ///
    /// Writes the terminal sentinel at offset 0.
    pub fn new(storage: S) -> Result<Self, ConfigError> {
        Self::with_config(storage, HeapConfig::default())
    }

    /// Initialize a heap over `storage` with an explicit configuration.
    pub fn with_config(storage: S, config: HeapConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let len = storage.as_ref().len();
        let min = config.min_storage();
        if len < min {
            return Err(ConfigError::StorageTooSmall { len, min });
        }
        let mut heap = Self {
            storage,
            format: config.format(),
            config,
            first_free: 0,
        };
        heap.reset();
        Ok(heap)
    }

    /// Forget every block: write a terminal at offset 0 and rewind the hint.
    ///
    /// All previously issued payloads become invalid. Payload bytes are not
    /// cleared.
    pub fn reset(&mut self) {
        self.write_terminal(0);
        self.first_free = 0;
        log::trace!("reset: terminal at 0");
    }

    /// Give the storage back. The block chain stays encoded in it.
    pub fn into_inner(self) -> S {
        self.storage
    }

    /// The configuration this heap was built with.
    pub fn config(&self) -> &HeapConfig {
        &self.config
    }

    /// The header format in use.
    pub fn format(&self) -> HeaderFormat {
        self.format
    }

    /// Total arena size in bytes.
    pub fn capacity(&self) -> usize {
        self.mem().len()
    }

    /// Current free hint offset.
    pub fn first_free(&self) -> usize {
        self.first_free
    }

    /// The whole arena, headers included.
    pub fn as_bytes(&self) -> &[u8] {
        self.mem()
    }

    /// Granted size of a payload; at least what was requested.
    pub fn payload_size(&self, payload: Payload) -> usize {
        self.header_at(payload.header_offset()).size
    }

    /// The bytes of a granted payload.
    ///
    /// # Panics
    ///
    /// Panics if `payload` does not describe a block inside the arena.
    pub fn payload(&self, payload: Payload) -> &[u8] {
        let start = payload.offset();
        let size = self.payload_size(payload);
        &self.mem()[start..start + size]
    }

    /// Mutable access to the bytes of a granted payload.
    ///
    /// # Panics
    ///
    /// Panics if `payload` does not describe a block inside the arena.
    pub fn payload_mut(&mut self, payload: Payload) -> &mut [u8] {
        let start = payload.offset();
        let size = self.payload_size(payload);
        &mut self.mem_mut()[start..start + size]
    }

    /// Release a payload. `None` is a no-op.
    ///
    /// The block is merged with every free neighbour: the run of free
    /// blocks just before it (found by walking from the free hint) and the
    /// run just after it. If the merged run reaches the terminal, the run
    /// itself becomes the terminal and the high-water mark drops.
    ///
    /// Freeing below the hint is O(1) apart from the forward merge. Freeing
    /// above it walks every block between the hint and `payload`, so in a
    /// heavily fragmented heap a free far from the hint costs time linear
    /// in the number of blocks.
    pub fn free(&mut self, payload: Option<Payload>) {
        let Some(payload) = payload else {
            return;
        };
        let offset = payload.header_offset();
        let freed = self.header_at(offset);
        log::trace!("free: block at {offset}, {} bytes", freed.size);

        let mut start = offset;
        let mut size = freed.size;
        if offset < self.first_free {
            log::trace!("free: hint lowered {} -> {offset}", self.first_free);
            self.first_free = offset;
        } else if let Some(run) = self.free_run_before(offset) {
            let merged = offset + size - run;
            if merged <= self.format.max_size() {
                log::trace!("free: merge preceding run at {run}");
                start = run;
                size = merged;
            }
        }

        let mut next = start + HEADER_SIZE + size;
        loop {
            let following = self.header_at(next);
            if following.used {
                break;
            }
            if following.is_terminal() {
                log::trace!("free: convert {start} to terminal");
                self.write_terminal(start);
                self.debug_verify();
                return;
            }
            let merged = size + HEADER_SIZE + following.size;
            if merged > self.format.max_size() {
                break;
            }
            log::trace!("free: merge following block at {next}");
            size = merged;
            next = following.next_offset(next);
        }
        self.write_header(start, size, false);
        self.debug_verify();
    }

    /// Allocate `count * size` bytes and zero the whole granted payload.
    ///
    /// Fails with [`HeapError::InvalidSize`] if the product overflows; on
    /// any failure memory is not touched.
    pub fn zero_allocate(&mut self, count: usize, size: usize) -> Result<Payload, HeapError> {
        let total = count.checked_mul(size).ok_or(HeapError::InvalidSize {
            requested: count.saturating_mul(size),
        })?;
        let payload = self.allocate(total)?;
        let granted = self.payload_size(payload);
        raw::fill_bytes(self.mem_mut(), payload.offset(), 0, granted);
        Ok(payload)
    }

    /// Copy `len` bytes between two offsets of the arena. Returns `dst`.
    pub fn copy_within(&mut self, dst: usize, src: usize, len: usize) -> usize {
        raw::copy_bytes(self.mem_mut(), dst, src, len)
    }

    /// Fill `len` bytes at `dst` with `value`. Returns `dst`.
    pub fn fill(&mut self, dst: usize, value: u8, len: usize) -> usize {
        raw::fill_bytes(self.mem_mut(), dst, value, len)
    }

    // ── Internals shared with allocate/resize/walk ──────────────────

    #[inline]
    pub(crate) fn mem(&self) -> &[u8] {
        self.storage.as_ref()
    }

    #[inline]
    pub(crate) fn mem_mut(&mut self) -> &mut [u8] {
        self.storage.as_mut()
    }

    #[inline]
    pub(crate) fn header_at(&self, offset: usize) -> Header {
        self.format.decode(header::read_word(self.mem(), offset))
    }

    #[inline]
    pub(crate) fn write_header(&mut self, offset: usize, size: usize, used: bool) {
        let word = self.format.encode(size, used);
        header::write_word(self.mem_mut(), offset, word);
    }

    #[inline]
    pub(crate) fn write_terminal(&mut self, offset: usize) {
        header::write_word(self.mem_mut(), offset, 0);
    }

    /// Offset of the terminal that would follow a `need`-byte block at
    /// `offset`, or `None` if that terminal would not fit in the arena.
    #[inline]
    pub(crate) fn terminal_after(&self, offset: usize, need: usize) -> Option<usize> {
        let terminal = offset.checked_add(HEADER_SIZE)?.checked_add(need)?;
        let end = terminal.checked_add(HEADER_SIZE)?;
        (end <= self.capacity()).then_some(terminal)
    }

    /// Move the hint forward over used blocks.
    pub(crate) fn advance_hint(&mut self) {
        let mut hint = self.first_free;
        loop {
            let header = self.header_at(hint);
            if !header.used {
                break;
            }
            hint = header.next_offset(hint);
        }
        log::trace!("hint advanced {} -> {hint}", self.first_free);
        self.first_free = hint;
    }

    /// Start of the run of free blocks ending right before `offset`.
    ///
    /// Walks from the hint; blocks below it are all used, so nothing
    /// earlier can belong to the run.
    fn free_run_before(&self, offset: usize) -> Option<usize> {
        let mut cursor = self.first_free;
        let mut run = None;
        while cursor < offset {
            let header = self.header_at(cursor);
            if header.is_terminal() {
                return None;
            }
            run = if header.used { None } else { run.or(Some(cursor)) };
            cursor = header.next_offset(cursor);
        }
        if cursor == offset {
            run
        } else {
            None
        }
    }

    /// Validate the chain after a mutation when configured to.
    #[inline]
    pub(crate) fn debug_verify(&self) {
        if cfg!(debug_assertions) && self.config.verify {
            if let Err(err) = self.validate() {
                panic!("heap chain corrupted: {err}");
            }
        }
    }
}
