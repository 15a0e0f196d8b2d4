//! In-place and relocating resize.

use crate::block::Payload;
use crate::error::HeapError;
use crate::header::HEADER_SIZE;
use crate::heap::Heap;
use crate::raw;

impl<S: AsRef<[u8]> + AsMut<[u8]>> Heap<S> {
    /// Change the size of a payload, moving it if it cannot change in place.
    ///
    /// `None` behaves as [`Heap::allocate`]. In order of preference:
    ///
    /// 1. Same normalized size: nothing changes.
    /// 2. The block is the last one before the terminal: the terminal moves
    ///    (growing or shrinking the chain) and the payload stays put.
    /// 3. Shrinking by more than one header: the tail becomes a free block.
    ///    It is not merged with a free successor; a later free picks it up.
    /// 4. Otherwise a new block is allocated, the first `min(old, new)`
    ///    bytes are copied over and the old block is freed.
    ///
    /// On error the original payload is still valid and the arena is
    /// unchanged.
    pub fn resize(&mut self, payload: Option<Payload>, size: usize) -> Result<Payload, HeapError> {
        let need = self.format().normalize(size).inspect_err(|err| {
            log::debug!("resize({size}): {err}");
        })?;
        let Some(payload) = payload else {
            return self.allocate(size);
        };

        let offset = payload.header_offset();
        let current = self.header_at(offset).size;
        if need == current {
            log::trace!("resize: {payload} already {need} bytes");
            return Ok(payload);
        }

        let next = offset + HEADER_SIZE + current;
        if self.header_at(next).is_terminal() {
            let Some(terminal) = self.terminal_after(offset, need) else {
                let err = HeapError::CapacityExhausted {
                    requested: need,
                    available: self.capacity().saturating_sub(offset + 2 * HEADER_SIZE),
                };
                log::debug!("resize({size}): {err}");
                return Err(err);
            };
            log::trace!("resize: move terminal {next} -> {terminal}");
            self.write_header(offset, need, true);
            self.write_terminal(terminal);
            if self.first_free == next {
                self.first_free = terminal;
            }
            self.debug_verify();
            return Ok(payload);
        }

        if need + HEADER_SIZE < current {
            let rest = offset + HEADER_SIZE + need;
            log::trace!("resize: truncate {payload} to {need}, tail at {rest}");
            self.write_header(rest, current - need - HEADER_SIZE, false);
            self.write_header(offset, need, true);
            if rest < self.first_free {
                self.first_free = rest;
            }
            self.debug_verify();
            return Ok(payload);
        }

        log::trace!("resize: relocate {payload} ({current} -> {need})");
        let moved = self.allocate(need)?;
        raw::copy_bytes(self.mem_mut(), moved.offset(), payload.offset(), current.min(need));
        self.free(Some(payload));
        Ok(moved)
    }
}
