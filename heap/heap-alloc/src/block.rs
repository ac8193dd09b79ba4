//! # Block Handles
//!
//! A [`BlockPtr`] is the typed view over one heap block, addressed by its
//! payload start (the pointer a client holds while the block is allocated).
//! It knows where its own header and footer live, how to step to either
//! neighbor, and where a free block keeps its list links. Everything above
//! this module works in terms of handles; the raw word traffic stays in
//! [`tag`](crate::tag).

use crate::tag::{self, BoundaryTag, DOUBLE_WORD, WORD};
use core::fmt;

/// Handle on one heap block, carried as the block's payload address.
#[repr(transparent)]
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub(crate) struct BlockPtr(usize);

impl BlockPtr {
    /// Wrap a payload address.
    #[inline]
    #[must_use]
    pub(crate) const fn new(addr: usize) -> Self {
        Self(addr)
    }

    /// Wrap a client pointer.
    #[inline]
    #[must_use]
    pub(crate) fn from_ptr(ptr: *mut u8) -> Self {
        Self(ptr as usize)
    }

    /// The payload address.
    #[inline]
    #[must_use]
    pub(crate) const fn addr(self) -> usize {
        self.0
    }

    /// The payload address as a client pointer.
    #[inline]
    #[must_use]
    pub(crate) const fn as_ptr(self) -> *mut u8 {
        self.0 as *mut u8
    }

    /// Whether the payload address sits on the doubleword granule.
    #[inline]
    #[must_use]
    pub(crate) const fn is_aligned(self) -> bool {
        self.0 % DOUBLE_WORD == 0
    }

    /// Address of the header word, one word before the payload.
    #[inline]
    #[must_use]
    pub(crate) const fn header_addr(self) -> usize {
        self.0 - WORD
    }

    /// Read the header tag.
    ///
    /// # Safety
    /// `self` must address a block inside a live heap.
    #[inline]
    pub(crate) unsafe fn header(self) -> BoundaryTag {
        unsafe { tag::load(self.header_addr()) }
    }

    /// Read the footer tag.
    ///
    /// # Safety
    /// `self` must address a block inside a live heap with a valid header;
    /// the footer position is derived from the header's size.
    #[inline]
    pub(crate) unsafe fn footer(self) -> BoundaryTag {
        unsafe { tag::load(self.0 + self.size() - DOUBLE_WORD) }
    }

    /// Block size in bytes, header and footer included.
    ///
    /// # Safety
    /// `self` must address a block inside a live heap.
    #[inline]
    pub(crate) unsafe fn size(self) -> usize {
        unsafe { self.header() }.size()
    }

    /// Whether the block is currently handed out.
    ///
    /// # Safety
    /// `self` must address a block inside a live heap.
    #[inline]
    pub(crate) unsafe fn is_allocated(self) -> bool {
        unsafe { self.header() }.allocated()
    }

    /// Write `new` to both ends of the block; the footer position follows
    /// the *new* size.
    ///
    /// # Safety
    /// `self` must address a block inside a live heap, and the range covered
    /// by `new.size()` must lie within it.
    pub(crate) unsafe fn write_tags(self, new: BoundaryTag) {
        unsafe {
            tag::store(self.header_addr(), new);
            tag::store(self.0 + new.size() - DOUBLE_WORD, new);
        }
    }

    /// The block immediately after this one.
    ///
    /// # Safety
    /// `self` must address a block inside a live heap; the result is only a
    /// block while the heap's implicit list is intact (the epilogue stops
    /// every forward walk).
    #[inline]
    pub(crate) unsafe fn next_block(self) -> Self {
        Self(self.0 + unsafe { self.size() })
    }

    /// The block immediately before this one, found through its footer.
    ///
    /// # Safety
    /// `self` must address a block inside a live heap that is not the
    /// prologue (the prologue keeps every backward walk inside the heap).
    #[inline]
    pub(crate) unsafe fn prev_block(self) -> Self {
        let prev_size = unsafe { tag::load(self.0 - DOUBLE_WORD) }.size();
        Self(self.0 - prev_size)
    }

    /// Successor link of a free block, stored in the first payload word.
    ///
    /// # Safety
    /// `self` must address a *free* block inside a live heap.
    #[inline]
    pub(crate) unsafe fn next_free(self) -> Option<Self> {
        match unsafe { tag::load_word(self.0) } {
            0 => None,
            addr => Some(Self(addr)),
        }
    }

    /// Predecessor link of a free block, stored in the second payload word.
    ///
    /// # Safety
    /// `self` must address a *free* block inside a live heap.
    #[inline]
    pub(crate) unsafe fn prev_free(self) -> Option<Self> {
        match unsafe { tag::load_word(self.0 + WORD) } {
            0 => None,
            addr => Some(Self(addr)),
        }
    }

    /// Set the successor link; `None` is the terminal sentinel.
    ///
    /// # Safety
    /// `self` must address a *free* block inside a live heap.
    #[inline]
    pub(crate) unsafe fn set_next_free(self, link: Option<Self>) {
        unsafe { tag::store_word(self.0, link.map_or(0, Self::addr)) };
    }

    /// Set the predecessor link; `None` is the terminal sentinel.
    ///
    /// # Safety
    /// `self` must address a *free* block inside a live heap.
    #[inline]
    pub(crate) unsafe fn set_prev_free(self, link: Option<Self>) {
        unsafe { tag::store_word(self.0 + WORD, link.map_or(0, Self::addr)) };
    }

    /// Zero both link words, as done before a block is handed out or retagged.
    ///
    /// # Safety
    /// The first two payload words of `self` must be writable.
    #[inline]
    pub(crate) unsafe fn clear_links(self) {
        unsafe {
            self.set_next_free(None);
            self.set_prev_free(None);
        }
    }
}

impl fmt::Debug for BlockPtr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlockPtr({:#x})", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tag::MIN_BLOCK;

    #[repr(align(16))]
    struct Arena([u8; 256]);

    /// Lay out `[pad][hdr|payload|ftr][hdr|payload|ftr]...` and return the
    /// first payload handle.
    fn build(arena: &mut Arena, sizes: &[(usize, bool)]) -> BlockPtr {
        let base = (&raw mut arena.0) as usize;
        let first = BlockPtr::new(base + 2 * WORD);
        let mut bp = first;
        for &(size, allocated) in sizes {
            unsafe { bp.write_tags(BoundaryTag::pack(size, allocated)) };
            bp = BlockPtr::new(bp.addr() + size);
        }
        first
    }

    #[test]
    fn header_and_footer_mirror_each_other() {
        let mut arena = Arena([0; 256]);
        let bp = build(&mut arena, &[(64, true)]);
        unsafe {
            assert_eq!(bp.size(), 64);
            assert!(bp.is_allocated());
            assert_eq!(bp.header().into_bits(), bp.footer().into_bits());
        }
    }

    #[test]
    fn neighbor_arithmetic_round_trips() {
        let mut arena = Arena([0; 256]);
        let first = build(&mut arena, &[(MIN_BLOCK, true), (64, false), (48, true)]);
        unsafe {
            let second = first.next_block();
            let third = second.next_block();
            assert_eq!(second.addr(), first.addr() + MIN_BLOCK);
            assert_eq!(third.addr(), second.addr() + 64);
            assert_eq!(second.prev_block(), first);
            assert_eq!(third.prev_block(), second);
        }
    }

    #[test]
    fn free_links_store_and_clear() {
        let mut arena = Arena([0; 256]);
        let first = build(&mut arena, &[(64, false), (64, false)]);
        unsafe {
            let second = first.next_block();
            first.set_next_free(Some(second));
            second.set_prev_free(Some(first));
            assert_eq!(first.next_free(), Some(second));
            assert_eq!(second.prev_free(), Some(first));
            assert_eq!(first.prev_free(), None);

            first.clear_links();
            assert_eq!(first.next_free(), None);
            assert_eq!(first.prev_free(), None);
        }
    }
}
