//! # Heap Region Provider
//!
//! The seam between an allocator and whatever actually owns the bytes it
//! carves up: a single contiguous region that only ever grows.
//!
//! ## Overview
//!
//! An allocator built on this crate never maps or reserves memory itself. It
//! asks a [`HeapRegion`] to [`extend`](HeapRegion::extend) by some number of
//! bytes and receives the *previous* high-water mark back, exactly like the
//! classic `sbrk` break pointer. The region keeps the bytes alive for its own
//! lifetime; nothing is ever returned to it.
//!
//! [`FixedRegion`] is the bundled implementation: a monotonic break over a
//! caller-supplied, 16-byte-aligned [`RegionStorage`] block. Hosted tests can
//! box (or leak) a storage block; freestanding users can place one in `.bss`.
//!
//! ## Usage Example
//! ```rust
//! use heap_region::{FixedRegion, HeapRegion, RegionStorage};
//!
//! let mut storage = RegionStorage::<4096>::new();
//! let mut region = FixedRegion::new(&mut storage);
//!
//! let first = region.extend(64).unwrap();
//! let second = region.extend(64).unwrap();
//! assert_eq!(first.as_ptr() as usize + 64, second.as_ptr() as usize);
//! assert_eq!(region.size(), 128);
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

mod fixed;

pub use fixed::{FixedRegion, RegionStorage};

use core::ptr::NonNull;

/// A contiguous, monotonically growing byte region backing a heap.
///
/// Implementations guarantee that every call to [`extend`](Self::extend)
/// appends to the same contiguous range: the address returned by one
/// successful call plus its byte count is the address returned by the next.
/// Memory handed out is never reclaimed while the region lives.
pub trait HeapRegion {
    /// Grow the region by `bytes` and return the previous high-water mark,
    /// i.e. the address of the first newly available byte.
    ///
    /// Returns `None` when the region cannot grow; the region is unchanged
    /// in that case.
    fn extend(&mut self, bytes: usize) -> Option<NonNull<u8>>;

    /// Address of the first byte of the region.
    fn lo(&self) -> usize;

    /// Address one past the last byte obtained so far.
    fn hi(&self) -> usize;

    /// Number of bytes obtained so far.
    fn size(&self) -> usize;
}
