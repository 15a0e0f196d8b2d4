//! Implicit free-list allocator over a single linear-memory arena.
//!
//! A [`Heap`] owns one contiguous byte region and hands out payloads from
//! it through the classic allocator contract: [`Heap::allocate`],
//! [`Heap::free`], [`Heap::zero_allocate`] and [`Heap::resize`]. All
//! bookkeeping lives inside the arena itself; there is no side table.
//!
//! # Architecture
//!
//! ```text
//! Heap<S> (owns the storage S: AsRef<[u8]> + AsMut<[u8]>)
//! ├── HeaderFormat (used flag position, size mask, request normalization)
//! ├── first_free   (offset hint: every block below it is used)
//! └── arena bytes
//!     ├── [hdr|payload] [hdr|payload] ... [hdr = 0]  <- terminal sentinel
//!     └── unused capacity past the terminal
//! ```
//!
//! Every header is a little-endian `u32`: the used flag in the high bit,
//! the payload size (a multiple of [`ALIGN`]) in the bits below it. The
//! next header always sits at `offset + HEADER_SIZE + size`. A header of
//! exactly zero is the terminal block, the high-water mark of the chain.
//!
//! # Safety
//!
//! Blocks are referenced by byte offset into the owned storage, never by
//! pointer, so the crate contains no `unsafe`. Caller misuse (double free,
//! use after free) can corrupt the chain but cannot cause undefined
//! behaviour; [`Heap::validate`] detects most such corruption.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

mod allocate;
pub mod block;
pub mod config;
pub mod error;
pub mod header;
pub mod heap;
pub mod raw;
mod resize;
pub mod walk;

// Public re-exports for the primary API surface.
pub use block::Payload;
pub use config::HeapConfig;
pub use error::{ChainError, ConfigError, HeapError};
pub use header::{HeaderFormat, ALIGN, HEADER_SIZE};
pub use heap::Heap;
pub use walk::{BlockInfo, BlockState, Blocks, HeapStats};
