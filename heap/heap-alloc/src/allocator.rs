//! # Boundary-Tag Allocator
//!
//! The allocator proper: bootstrap, heap extension, coalescing, placement,
//! and the public `alloc` / `free` / `realloc` surface, over any
//! [`HeapRegion`].
//!
//! ## Heap layout
//!
//! ```text
//! [ pad word ]
//! [ prologue header (DW, allocated) ]
//! [ prologue footer (DW, allocated) ]   <- `base` (the prologue's payload)
//! [ block 1 .. block k ]
//! [ epilogue header (0, allocated) ]    <- permanent forward sentinel
//! ```
//!
//! The prologue and epilogue are sentinel allocated blocks that remove every
//! boundary case from coalescing and traversal: the first real block always
//! has an allocated left neighbor, and a forward walk always terminates on
//! the zero-size epilogue. Extension overwrites the old epilogue with the
//! new block's header, appends the block, and writes a fresh epilogue one
//! word past its footer.
//!
//! ## Request flow
//!
//! ```text
//! alloc ──► bypass cache ──hot──► extend region (block born allocated)
//!              │cold
//!              ▼
//!          first fit ──hit──► place (split if the rest is a whole block)
//!              │miss
//!              ▼
//!          extend region ──► coalesce left ──► place
//!
//! free ──► retag ──► coalesce (4 boundary-tag cases) ──► free list
//! ```

use crate::block::BlockPtr;
use crate::cache::BypassCache;
use crate::free_list::FreeList;
use crate::tag::{self, BoundaryTag, DOUBLE_WORD, MIN_BLOCK, WORD};
use core::ptr::{self, null_mut};
use heap_region::HeapRegion;

/// Heap-level failures. The allocation paths themselves report failure
/// through null pointers, as their contracts require.
#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum HeapError {
    /// The backing region refused to grow.
    #[error("the heap region refused to grow by {bytes} bytes")]
    RegionExhausted {
        /// Size of the refused request.
        bytes: usize,
    },
}

/// Point-in-time usage summary, see [`BoundaryTagAllocator::stats`].
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
pub struct HeapStats {
    /// Bytes obtained from the region so far, metadata included.
    pub heap_size: usize,
    /// Bytes held by blocks on the free list.
    pub free_bytes: usize,
    /// Number of blocks on the free list.
    pub free_blocks: usize,
}

/// A first-fit allocator with boundary-tagged blocks, an address-ordered
/// explicit free list, and an adaptive allocation-bypass cache.
///
/// The allocator owns its [`HeapRegion`] and keeps all metadata inline in
/// it. It serves a single client: every operation takes `&mut self`, and
/// callers needing sharing must serialize externally.
pub struct BoundaryTagAllocator<R> {
    region: R,
    /// The prologue's payload pointer; start of the implicit block walk.
    base: BlockPtr,
    free_list: FreeList,
    cache: BypassCache,
}

impl<R: HeapRegion> BoundaryTagAllocator<R> {
    /// Heap extension quantum in bytes.
    pub const CHUNK: usize = 4096;

    /// Largest in-place `realloc` surplus that stays bundled with the block
    /// instead of being split back off.
    const ABSORB_SLACK: usize = 50;

    /// Bootstrap a heap inside `region`: install the sentinels, seed the
    /// free list with one [`CHUNK`](Self::CHUNK)-sized block, and reset the
    /// bypass cache.
    ///
    /// # Errors
    /// [`HeapError::RegionExhausted`] when the region cannot supply the
    /// sentinels plus the initial chunk.
    pub fn init(mut region: R) -> Result<Self, HeapError> {
        let Some(start) = region.extend(4 * WORD) else {
            return Err(HeapError::RegionExhausted { bytes: 4 * WORD });
        };
        let start = start.as_ptr() as usize;
        // SAFETY: the region handed us these four words.
        unsafe {
            tag::store_word(start, 0); // alignment padding
            tag::store(start + WORD, BoundaryTag::pack(DOUBLE_WORD, true)); // prologue header
            tag::store(start + 2 * WORD, BoundaryTag::pack(DOUBLE_WORD, true)); // prologue footer
            tag::store(start + 3 * WORD, BoundaryTag::pack(0, true)); // epilogue header
        }

        let mut heap = Self {
            region,
            base: BlockPtr::new(start + 2 * WORD),
            free_list: FreeList::new(),
            cache: BypassCache::new(),
        };
        if heap.extend_heap(Self::CHUNK / WORD).is_none() {
            return Err(HeapError::RegionExhausted { bytes: Self::CHUNK });
        }
        log::debug!(
            "heap bootstrapped: lo={:#x} size={}",
            heap.region.lo(),
            heap.region.size()
        );
        Ok(heap)
    }

    /// Allocate a block with at least `size` payload bytes.
    ///
    /// Returns a doubleword-aligned pointer, or null when `size` is zero or
    /// the region is exhausted.
    pub fn alloc(&mut self, size: usize) -> *mut u8 {
        if size == 0 {
            return null_mut();
        }
        let adjusted = Self::adjusted_size(size);

        if self.cache.is_enabled() {
            self.cache.observe_alloc(size);
            for slot in 0..BypassCache::SLOTS {
                if self.cache.arm_and_match(slot, size) {
                    // hot size: skip the free list, grow the heap instead.
                    // When the region refuses, the slot stays armed and the
                    // request falls through to the normal path.
                    if let Some(bp) = self.extend_allocated(adjusted) {
                        return bp.as_ptr();
                    }
                }
            }
        }

        // SAFETY: list members are free blocks of an intact heap.
        unsafe {
            if let Some(bp) = self.free_list.first_fit(adjusted) {
                self.place(bp, adjusted);
                return bp.as_ptr();
            }
        }

        let Some(bp) = self.extend_heap(adjusted.max(Self::CHUNK) / WORD) else {
            return null_mut();
        };
        // SAFETY: `extend_heap` produced a free block of sufficient size.
        unsafe { self.place(bp, adjusted) };
        bp.as_ptr()
    }

    /// Release a block. Null is a no-op.
    ///
    /// # Safety
    /// `ptr` must be null or a pointer obtained from this allocator that has
    /// not been released since.
    pub unsafe fn free(&mut self, ptr: *mut u8) {
        self.cache.tick_free();
        if ptr.is_null() {
            return;
        }
        let bp = BlockPtr::from_ptr(ptr);
        // SAFETY: per contract, `bp` is a live block of this heap.
        unsafe {
            let size = bp.size();
            bp.write_tags(BoundaryTag::pack(size, false));
            bp.clear_links();
            self.coalesce(bp);
        }
    }

    /// Resize a block, moving it only when it cannot grow in place.
    ///
    /// - `size == 0` frees `ptr` and returns null.
    /// - A null `ptr` behaves as [`alloc`](Self::alloc).
    /// - A shrink returns `ptr` unchanged; the remainder stays bundled with
    ///   the block for cheap future regrowth.
    /// - Growth first tries to absorb a free right neighbor; the payload is
    ///   not moved in that case. Otherwise the payload moves to a fresh
    ///   block and the old one is released.
    ///
    /// Returns null on exhaustion, in which case the old block is untouched.
    ///
    /// Any call permanently disables the bypass cache: realloc-heavy
    /// workloads do not benefit from it and its size heuristics misfire
    /// against them.
    ///
    /// # Safety
    /// `ptr` must be null or a pointer obtained from this allocator that has
    /// not been released since.
    pub unsafe fn realloc(&mut self, ptr: *mut u8, size: usize) -> *mut u8 {
        self.cache.disable();
        if size == 0 {
            // SAFETY: forwarded under the caller's contract.
            unsafe { self.free(ptr) };
            return null_mut();
        }
        if ptr.is_null() {
            return self.alloc(size);
        }

        let bp = BlockPtr::from_ptr(ptr);
        // SAFETY: per contract, `bp` is a live block of this heap.
        unsafe {
            let old_size = bp.size();
            let adjusted = Self::adjusted_size(size);
            if old_size >= adjusted {
                return ptr;
            }

            let next = bp.next_block();
            if !next.is_allocated() && old_size + next.size() >= adjusted {
                let combined = old_size + next.size();
                self.free_list.remove(next);
                if combined - adjusted <= Self::ABSORB_SLACK {
                    // the surplus is too small to be worth a block of its own
                    bp.write_tags(BoundaryTag::pack(combined, true));
                } else {
                    bp.write_tags(BoundaryTag::pack(adjusted, true));
                    let trailer = bp.next_block();
                    trailer.write_tags(BoundaryTag::pack(combined - adjusted, true));
                    self.free(trailer.as_ptr());
                }
                return ptr;
            }

            // move path: secure the new block before releasing the old one,
            // so exhaustion leaves the original intact
            let new_ptr = self.alloc(size);
            if new_ptr.is_null() {
                return null_mut();
            }
            ptr::copy_nonoverlapping(ptr, new_ptr, size.min(old_size - DOUBLE_WORD));
            self.free(ptr);
            new_ptr
        }
    }

    /// Point-in-time usage summary.
    #[must_use]
    pub fn stats(&self) -> HeapStats {
        let mut free_bytes = 0;
        let mut free_blocks = 0;
        for bp in self.free_list.iter() {
            // SAFETY: list members are free blocks of an intact heap.
            free_bytes += unsafe { bp.size() };
            free_blocks += 1;
        }
        HeapStats {
            heap_size: self.region.size(),
            free_bytes,
            free_blocks,
        }
    }

    /// The free blocks as `(payload address, block size)` pairs, in address
    /// order.
    #[must_use]
    pub fn free_blocks(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.free_list
            .iter()
            // SAFETY: list members are free blocks of an intact heap.
            .map(|bp| (bp.addr(), unsafe { bp.size() }))
    }

    pub(crate) const fn base(&self) -> BlockPtr {
        self.base
    }

    pub(crate) const fn free_list(&self) -> &FreeList {
        &self.free_list
    }

    /// Request size rounded up to a whole block: header and footer added,
    /// then up to the granule, with the two link words as the floor.
    const fn adjusted_size(size: usize) -> usize {
        if size <= DOUBLE_WORD {
            MIN_BLOCK
        } else {
            DOUBLE_WORD * (size + DOUBLE_WORD).div_ceil(DOUBLE_WORD)
        }
    }

    /// Grow the heap by `words` (rounded up to even), install the new bytes
    /// as a free block, and coalesce it with the old last block.
    fn extend_heap(&mut self, words: usize) -> Option<BlockPtr> {
        // an even word count keeps every block a doubleword multiple
        let bytes = if words % 2 == 0 {
            words * WORD
        } else {
            (words + 1) * WORD
        };
        let Some(old_break) = self.region.extend(bytes) else {
            log::warn!("heap region exhausted: cannot grow by {bytes} bytes");
            return None;
        };
        log::trace!("heap extended by {bytes} bytes to {:#x}", self.region.hi());

        let bp = BlockPtr::new(old_break.as_ptr() as usize);
        // SAFETY: the region appended `bytes` bytes at `old_break`; the
        // block header lands on the old epilogue, one word before it.
        unsafe {
            bp.write_tags(BoundaryTag::pack(bytes, false));
            tag::store(bp.next_block().header_addr(), BoundaryTag::pack(0, true));
            Some(self.coalesce(bp))
        }
    }

    /// Extension that serves a bypass hit: the new block is born allocated,
    /// so there is nothing to coalesce and the free list stays untouched.
    /// The old epilogue becomes the block's header and a fresh epilogue is
    /// written one word past its footer, in that order.
    fn extend_allocated(&mut self, adjusted: usize) -> Option<BlockPtr> {
        let old_break = self.region.extend(adjusted)?;
        let bp = BlockPtr::new(old_break.as_ptr() as usize);
        // SAFETY: the region appended `adjusted` bytes at `old_break`.
        unsafe {
            bp.write_tags(BoundaryTag::pack(adjusted, true));
            tag::store(bp.next_block().header_addr(), BoundaryTag::pack(0, true));
        }
        Some(bp)
    }

    /// Boundary-tag coalescing of a newly freed or newly extended block.
    ///
    /// On entry `bp` carries free tags but is not on the free list; on exit
    /// the merged block is, and its address is returned.
    ///
    /// # Safety
    /// `bp` must be a retagged-free block of an intact heap, absent from the
    /// free list, with both sentinels in place.
    unsafe fn coalesce(&mut self, bp: BlockPtr) -> BlockPtr {
        unsafe {
            let prev = bp.prev_block();
            let next = bp.next_block();
            match (prev.is_allocated(), next.is_allocated()) {
                // isolated
                (true, true) => {
                    self.free_list.insert(bp);
                    bp
                }
                // absorb the successor; bp takes over its list slot, which
                // is exactly bp's own address-order position
                (true, false) => {
                    let size = bp.size() + next.size();
                    bp.write_tags(BoundaryTag::pack(size, false));
                    self.free_list.replace(next, bp);
                    bp
                }
                // absorb into the predecessor, which already sits in the
                // right list position
                (false, true) => {
                    let size = bp.size() + prev.size();
                    prev.write_tags(BoundaryTag::pack(size, false));
                    prev
                }
                // absorb both; the successor's slot collapses into the
                // predecessor's
                (false, false) => {
                    let size = bp.size() + prev.size() + next.size();
                    self.free_list.remove(next);
                    prev.write_tags(BoundaryTag::pack(size, false));
                    prev
                }
            }
        }
    }

    /// Carve an `adjusted`-sized allocation out of the free block `bp`,
    /// splitting off the remainder when it is at least a whole minimum
    /// block.
    ///
    /// # Safety
    /// `bp` must be on the free list with `size >= adjusted`.
    unsafe fn place(&mut self, bp: BlockPtr, adjusted: usize) {
        unsafe {
            let total = bp.size();
            if total - adjusted >= MIN_BLOCK {
                bp.write_tags(BoundaryTag::pack(adjusted, true));
                let rest = bp.next_block();
                rest.write_tags(BoundaryTag::pack(total - adjusted, false));
                // the remainder inherits bp's list slot and links
                self.free_list.replace(bp, rest);
            } else {
                self.free_list.remove(bp);
                bp.write_tags(BoundaryTag::pack(total, true));
            }
        }
    }
}
