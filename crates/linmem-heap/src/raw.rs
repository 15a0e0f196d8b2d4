//! Byte-level primitives used by zero-allocate and relocating resize.
//!
//! Both operate on offsets into one arena slice and return the destination
//! offset, mirroring the `memcpy`/`memset` contract.

/// Copy `len` bytes from `src` to `dst` within `mem`. Returns `dst`.
///
/// Overlapping ranges are allowed.
///
/// # Panics
///
/// Panics if either range extends past `mem`.
#[inline]
pub fn copy_bytes(mem: &mut [u8], dst: usize, src: usize, len: usize) -> usize {
    mem.copy_within(src..src + len, dst);
    dst
}

/// Set `len` bytes starting at `dst` to `value`. Returns `dst`.
///
/// # Panics
///
/// Panics if the range extends past `mem`.
#[inline]
pub fn fill_bytes(mem: &mut [u8], dst: usize, value: u8, len: usize) -> usize {
    mem[dst..dst + len].fill(value);
    dst
}
