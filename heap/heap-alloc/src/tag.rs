//! # Boundary Tag Codec
//!
//! Every heap block starts and ends with the same packed word: the block
//! size with the allocated flag folded into its always-zero low bits. The
//! duplicate at the end (the footer) is what lets a block find the size of
//! its *left* neighbor without any out-of-band table, which in turn makes
//! coalescing O(1) in both directions.
//!
//! ```text
//!  offset      content
//!   0          header word:  (size | allocated)
//!   WORD       payload ..    (free blocks keep their list links here)
//!   size-2·WORD footer word: (size | allocated), mirror of the header
//! ```
//!
//! Block sizes are always multiples of [`DOUBLE_WORD`], so the low
//! `log2(DOUBLE_WORD)` bits of a size are zero; bit 0 carries the allocated
//! flag and the remaining slack bits stay reserved. This module is the only
//! place that reads or writes raw heap words.

use bitfield_struct::bitfield;

/// Machine word size in bytes; headers, footers, and free-list links are one
/// word each.
pub const WORD: usize = size_of::<usize>();

/// The alignment and size granule: two words. Every block pointer is aligned
/// to this and every block size is a multiple of it.
pub const DOUBLE_WORD: usize = 2 * WORD;

/// Smallest representable block: header, two link words, footer.
pub const MIN_BLOCK: usize = 2 * DOUBLE_WORD;

/// Bits of alignment slack below the granule; the shift between a byte size
/// and its granule count.
pub(crate) const GRANULE_SHIFT: u32 = DOUBLE_WORD.trailing_zeros();

const _: () = assert!(
    size_of::<usize>() == size_of::<u64>(),
    "pointer size mismatch"
);

/// Packed `(size, allocated)` word replicated at both ends of every block.
///
/// Reading the size through [`granules`](Self::granules) and shifting back up
/// is the same extraction as masking the low `DOUBLE_WORD - 1` bits off the
/// raw word.
#[bitfield(u64)]
pub(crate) struct BoundaryTag {
    /// Set while the block is handed out to a client.
    pub allocated: bool,
    /// Alignment slack below the granule; always zero.
    #[bits(3)]
    __: u8,
    /// Block size in [`DOUBLE_WORD`] granules.
    #[bits(60)]
    granules: u64,
}

impl BoundaryTag {
    /// Pack a block size (a [`DOUBLE_WORD`] multiple) and an allocated flag.
    pub(crate) const fn pack(size: usize, allocated: bool) -> Self {
        debug_assert!(size % DOUBLE_WORD == 0);
        Self::new()
            .with_allocated(allocated)
            .with_granules((size >> GRANULE_SHIFT) as u64)
    }

    /// Block size in bytes.
    pub(crate) const fn size(self) -> usize {
        (self.granules() << GRANULE_SHIFT) as usize
    }
}

/// Read the tag word at `addr`.
///
/// # Safety
/// `addr` must be a readable, word-aligned address inside the heap.
pub(crate) unsafe fn load(addr: usize) -> BoundaryTag {
    BoundaryTag::from_bits(unsafe { (addr as *const u64).read() })
}

/// Write the tag word at `addr`.
///
/// # Safety
/// `addr` must be a writable, word-aligned address inside the heap.
pub(crate) unsafe fn store(addr: usize, tag: BoundaryTag) {
    unsafe { (addr as *mut u64).write(tag.into_bits()) };
}

/// Read a plain address word (a free-list link or padding) at `addr`.
///
/// # Safety
/// `addr` must be a readable, word-aligned address inside the heap.
pub(crate) unsafe fn load_word(addr: usize) -> usize {
    unsafe { (addr as *const usize).read() }
}

/// Write a plain address word at `addr`.
///
/// # Safety
/// `addr` must be a writable, word-aligned address inside the heap.
pub(crate) unsafe fn store_word(addr: usize, value: usize) {
    unsafe { (addr as *mut usize).write(value) };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pack_round_trips_size_and_flag() {
        let tag = BoundaryTag::pack(4096, true);
        assert_eq!(tag.size(), 4096);
        assert!(tag.allocated());

        let tag = BoundaryTag::pack(MIN_BLOCK, false);
        assert_eq!(tag.size(), MIN_BLOCK);
        assert!(!tag.allocated());
    }

    #[test]
    fn zero_size_is_representable() {
        // the epilogue is a zero-size allocated header
        let tag = BoundaryTag::pack(0, true);
        assert_eq!(tag.size(), 0);
        assert!(tag.allocated());
    }

    #[test]
    fn size_extraction_ignores_all_slack_bits() {
        // the full low-granule mask is dropped, not just the flag bit
        let raw = 4096 | 0b1111;
        let tag = BoundaryTag::from_bits(raw);
        assert_eq!(tag.size(), 4096);
        assert!(tag.allocated());
    }

    #[test]
    fn flag_does_not_disturb_the_size() {
        let free = BoundaryTag::pack(160, false);
        let used = BoundaryTag::pack(160, true);
        assert_eq!(free.size(), used.size());
        assert_eq!(free.into_bits() | 1, used.into_bits());
    }
}
