//! # Heap Consistency Checker
//!
//! An on-demand verifier for the allocator's structural invariants: sentinel
//! integrity, header/footer agreement and alignment of every block, and the
//! free list matching the set of free blocks exactly, in address order, with
//! intact back links. The checker only reads; verbose mode narrates every
//! block through the [`log`] facade.

use crate::allocator::BoundaryTagAllocator;
use crate::block::BlockPtr;
use crate::tag::DOUBLE_WORD;
use heap_region::HeapRegion;

/// A structural invariant violation, reported with the offending payload
/// address where one exists.
#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum CheckError {
    /// The prologue is not a doubleword-sized allocated block.
    #[error("bad prologue header at {addr:#x}")]
    BadPrologue {
        /// The prologue's payload address.
        addr: usize,
    },
    /// A block pointer is off the doubleword granule.
    #[error("block {addr:#x} is not doubleword aligned")]
    Misaligned {
        /// The offending payload address.
        addr: usize,
    },
    /// A block's header and footer words disagree.
    #[error("header does not match footer at {addr:#x}")]
    TagMismatch {
        /// The offending payload address.
        addr: usize,
    },
    /// The implicit walk did not end on a zero-size allocated header.
    #[error("bad epilogue header at {addr:#x}")]
    BadEpilogue {
        /// Where the walk ended.
        addr: usize,
    },
    /// A free-list entry does not correspond to a free block of the heap.
    #[error("free-list entry {addr:#x} is not a free block")]
    StrayListEntry {
        /// The entry's payload address.
        addr: usize,
    },
    /// A free block of the heap is missing from the free list.
    #[error("free block {addr:#x} is missing from the free list")]
    MissingListEntry {
        /// The unlisted block's payload address.
        addr: usize,
    },
    /// Successive free-list entries are not strictly ascending.
    #[error("free list is not in address order at {addr:#x}")]
    UnsortedList {
        /// The out-of-place entry's payload address.
        addr: usize,
    },
    /// A predecessor link or an endpoint sentinel does not mirror the
    /// forward chain.
    #[error("free-list back links do not mirror the forward chain")]
    BrokenBackLinks,
}

impl<R: HeapRegion> BoundaryTagAllocator<R> {
    /// Verify the heap's structural invariants.
    ///
    /// Walks the implicit block list from the prologue to the epilogue,
    /// checking alignment and header/footer agreement per block, and zips
    /// the free blocks it passes against the free list, which must match
    /// them exactly and in order. With `verbose`, every block is emitted as
    /// a `debug!` line in the form `addr: header:[size:a|f] footer:[size:a|f]`.
    ///
    /// # Errors
    /// The first violation found, as a [`CheckError`].
    pub fn check_heap(&self, verbose: bool) -> Result<(), CheckError> {
        let base = self.base();
        if verbose {
            log::debug!("heap ({:#x}):", base.addr());
        }

        // SAFETY: the allocator keeps the sentinels and tags of every block
        // intact between public calls; the walk below stays between them.
        unsafe {
            if base.size() != DOUBLE_WORD || !base.is_allocated() {
                return Err(CheckError::BadPrologue { addr: base.addr() });
            }

            let mut list_cursor = self.free_list().first();
            if let Some(first) = list_cursor {
                if first.prev_free().is_some() {
                    return Err(CheckError::BrokenBackLinks);
                }
            }
            if self.free_list().first().is_some() != self.free_list().last().is_some() {
                return Err(CheckError::BrokenBackLinks);
            }

            let mut bp = base;
            while bp.size() > 0 {
                if verbose {
                    print_block(bp);
                }
                check_block(bp)?;

                if !bp.is_allocated() {
                    // the list is address-ordered, so its next entry must be
                    // exactly this block
                    match list_cursor {
                        Some(entry) if entry == bp => {
                            if let Some(next) = entry.next_free() {
                                if next.prev_free() != Some(entry) {
                                    return Err(CheckError::BrokenBackLinks);
                                }
                                if next <= entry {
                                    return Err(CheckError::UnsortedList { addr: next.addr() });
                                }
                            } else if self.free_list().last() != Some(entry) {
                                return Err(CheckError::BrokenBackLinks);
                            }
                            list_cursor = entry.next_free();
                        }
                        Some(entry) if entry < bp => {
                            return Err(CheckError::StrayListEntry { addr: entry.addr() });
                        }
                        _ => return Err(CheckError::MissingListEntry { addr: bp.addr() }),
                    }
                }

                bp = bp.next_block();
            }

            if verbose {
                print_block(bp);
            }
            if bp.size() != 0 || !bp.is_allocated() {
                return Err(CheckError::BadEpilogue { addr: bp.addr() });
            }
            if let Some(entry) = list_cursor {
                return Err(CheckError::StrayListEntry { addr: entry.addr() });
            }
        }

        Ok(())
    }
}

/// Alignment and tag agreement for one block.
///
/// # Safety
/// `bp` must address a block inside a live heap.
unsafe fn check_block(bp: BlockPtr) -> Result<(), CheckError> {
    if !bp.is_aligned() {
        return Err(CheckError::Misaligned { addr: bp.addr() });
    }
    // SAFETY: forwarded from the caller.
    unsafe {
        if bp.header().into_bits() != bp.footer().into_bits() {
            return Err(CheckError::TagMismatch { addr: bp.addr() });
        }
    }
    Ok(())
}

/// One `debug!` line per block; the epilogue prints as the end marker.
///
/// # Safety
/// `bp` must address a block inside a live heap.
unsafe fn print_block(bp: BlockPtr) {
    // SAFETY: forwarded from the caller.
    unsafe {
        let header = bp.header();
        if header.size() == 0 {
            log::debug!("{:#x}: end of heap", bp.addr());
            return;
        }
        let footer = bp.footer();
        log::debug!(
            "{:#x}: header:[{}:{}] footer:[{}:{}]",
            bp.addr(),
            header.size(),
            flag(header.allocated()),
            footer.size(),
            flag(footer.allocated()),
        );
    }
}

const fn flag(allocated: bool) -> char {
    if allocated { 'a' } else { 'f' }
}
