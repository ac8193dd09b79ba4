//! # Boundary-Tag Heap Allocation
//!
//! A general-purpose dynamic memory allocator over a single contiguous,
//! monotonically growable [`HeapRegion`](heap_region::HeapRegion): constant
//! time bidirectional coalescing through boundary tags, an address-ordered
//! explicit free list threaded through free payloads, and an adaptive cache
//! that serves hot request sizes from fresh heap extension instead of the
//! free list.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │              Public surface (allocator)             │
//! │    • alloc / free / realloc / init                  │
//! │    • bootstrap, extension, coalescing, placement    │
//! └───────┬─────────────────┬───────────────────────────┘
//!         │                 │
//! ┌───────▼───────┐ ┌───────▼───────────────────────────┐
//! │ Bypass cache  │ │        Explicit free list         │
//! │ (cache)       │ │        (free_list)                │
//! │ • hot-size    │ │ • address-ordered, doubly linked  │
//! │   detection   │ │ • first-fit scan                  │
//! └───────────────┘ └───────┬───────────────────────────┘
//!                           │
//!                   ┌───────▼───────────────────────────┐
//!                   │   Block handles and tag codec     │
//!                   │   (block, tag)                    │
//!                   │ • header/footer words             │
//!                   │ • neighbor arithmetic, links      │
//!                   └───────────────────────────────────┘
//! ```
//!
//! All raw word access is concentrated in the bottom layer; every component
//! above it works with typed block handles. The heap's
//! metadata lives entirely inline: headers and footers bound every block,
//! and free blocks carry the list links in their first two payload words.
//!
//! ## Concurrency Model
//!
//! None. The allocator serves a single client through `&mut self`; there is
//! no locking, no suspension, no cancellation. Callers that share a heap
//! must serialize externally.
//!
//! ## Usage Example
//! ```rust
//! use heap_alloc::BoundaryTagAllocator;
//! use heap_region::{FixedRegion, RegionStorage};
//!
//! let mut storage = Box::new(RegionStorage::<{ 64 * 1024 }>::new());
//! let mut heap = BoundaryTagAllocator::init(FixedRegion::new(&mut storage)).unwrap();
//!
//! let p = heap.alloc(100);
//! assert!(!p.is_null());
//! unsafe {
//!     p.write_bytes(0xAB, 100);
//!     let p = heap.realloc(p, 200);
//!     heap.free(p);
//! }
//! heap.check_heap(false).unwrap();
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code, clippy::cast_possible_truncation)]

mod allocator;
mod block;
mod cache;
mod check;
mod free_list;
mod tag;

pub use allocator::{BoundaryTagAllocator, HeapError, HeapStats};
pub use check::CheckError;
pub use tag::{DOUBLE_WORD, MIN_BLOCK, WORD};
