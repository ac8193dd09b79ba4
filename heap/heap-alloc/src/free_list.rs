//! # Explicit Free List
//!
//! A doubly-linked list of the free blocks, threaded through the first two
//! payload words of each member and kept sorted **by address**. Address
//! order keeps the list iterable in heap order, which makes it directly
//! comparable against the implicit block walk during checking, and it makes
//! first-fit deterministic.
//!
//! The links are plain word stores into free payloads; the list never
//! allocates nodes of its own.

use crate::block::BlockPtr;

/// Head and tail of the address-ordered free list. Both are `None` exactly
/// when the list is empty.
pub(crate) struct FreeList {
    first: Option<BlockPtr>,
    last: Option<BlockPtr>,
}

impl FreeList {
    pub(crate) const fn new() -> Self {
        Self {
            first: None,
            last: None,
        }
    }

    pub(crate) const fn first(&self) -> Option<BlockPtr> {
        self.first
    }

    pub(crate) const fn last(&self) -> Option<BlockPtr> {
        self.last
    }

    /// Insert `bp`, keeping the list sorted by address.
    ///
    /// # Safety
    /// `bp` must be a free block inside a live heap that is not already on
    /// the list, and all listed blocks must have intact link words.
    pub(crate) unsafe fn insert(&mut self, bp: BlockPtr) {
        unsafe {
            match (self.first, self.last) {
                // empty list: bp becomes the sole element
                (None, _) => {
                    bp.clear_links();
                    self.first = Some(bp);
                    self.last = Some(bp);
                }
                // before the head: prepend
                (Some(first), _) if bp < first => {
                    bp.set_next_free(Some(first));
                    bp.set_prev_free(None);
                    first.set_prev_free(Some(bp));
                    self.first = Some(bp);
                }
                // past the tail: append
                (_, Some(last)) if bp > last => {
                    last.set_next_free(Some(bp));
                    bp.set_prev_free(Some(last));
                    bp.set_next_free(None);
                    self.last = Some(bp);
                }
                // interior: walk to the last node below bp and splice behind it
                (Some(first), _) => {
                    let mut prev = first;
                    while let Some(next) = prev.next_free() {
                        if next > bp {
                            break;
                        }
                        prev = next;
                    }
                    let next = prev.next_free();
                    prev.set_next_free(Some(bp));
                    bp.set_prev_free(Some(prev));
                    bp.set_next_free(next);
                    match next {
                        Some(next) => next.set_prev_free(Some(bp)),
                        None => self.last = Some(bp),
                    }
                }
            }
        }
    }

    /// Unlink `bp`, repairing the endpoints. Tolerates `bp` being the sole
    /// element.
    ///
    /// # Safety
    /// `bp` must be on the list with intact link words.
    pub(crate) unsafe fn remove(&mut self, bp: BlockPtr) {
        unsafe {
            let prev = bp.prev_free();
            let next = bp.next_free();
            match prev {
                Some(prev) => prev.set_next_free(next),
                None => self.first = next,
            }
            match next {
                Some(next) => next.set_prev_free(prev),
                None => self.last = prev,
            }
        }
    }

    /// Splice `new` into the position `old` occupies, inheriting its links.
    ///
    /// # Safety
    /// `old` must be on the list with intact link words, `new` must be a
    /// free block that is not, and `new`'s link words must be writable.
    pub(crate) unsafe fn replace(&mut self, old: BlockPtr, new: BlockPtr) {
        unsafe {
            let prev = old.prev_free();
            let next = old.next_free();
            new.set_prev_free(prev);
            new.set_next_free(next);
            match prev {
                Some(prev) => prev.set_next_free(Some(new)),
                None => self.first = Some(new),
            }
            match next {
                Some(next) => next.set_prev_free(Some(new)),
                None => self.last = Some(new),
            }
        }
    }

    /// First block in address order with `size >= asize`, left on the list.
    ///
    /// # Safety
    /// All listed blocks must have intact link words and headers.
    pub(crate) unsafe fn first_fit(&self, asize: usize) -> Option<BlockPtr> {
        let mut cursor = self.first;
        while let Some(bp) = cursor {
            unsafe {
                if bp.size() >= asize {
                    return Some(bp);
                }
                cursor = bp.next_free();
            }
        }
        None
    }

    /// Forward iteration in address order.
    pub(crate) fn iter(&self) -> impl Iterator<Item = BlockPtr> + '_ {
        let mut cursor = self.first;
        core::iter::from_fn(move || {
            let bp = cursor?;
            // SAFETY: listed blocks are free blocks with intact link words.
            cursor = unsafe { bp.next_free() };
            Some(bp)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tag::{BoundaryTag, MIN_BLOCK, WORD};

    #[repr(align(16))]
    struct Arena([u8; 512]);

    /// Carve `count` free blocks of [`MIN_BLOCK`] bytes out of `arena`.
    fn blocks<const COUNT: usize>(arena: &mut Arena) -> [BlockPtr; COUNT] {
        let base = (&raw mut arena.0) as usize;
        core::array::from_fn(|i| {
            let bp = BlockPtr::new(base + 2 * WORD + i * MIN_BLOCK);
            unsafe { bp.write_tags(BoundaryTag::pack(MIN_BLOCK, false)) };
            bp
        })
    }

    fn collect(list: &FreeList) -> Vec<BlockPtr> {
        list.iter().collect()
    }

    #[test]
    fn insert_keeps_address_order() {
        let mut arena = Arena([0; 512]);
        let [a, b, c, d] = blocks::<4>(&mut arena);
        let mut list = FreeList::new();

        // sole element, prepend, append, interior
        unsafe {
            list.insert(c);
            list.insert(a);
            list.insert(d);
            list.insert(b);
        }

        assert_eq!(collect(&list), [a, b, c, d]);
        assert_eq!(list.first(), Some(a));
        assert_eq!(list.last(), Some(d));
        unsafe {
            assert_eq!(a.prev_free(), None);
            assert_eq!(d.next_free(), None);
        }
    }

    #[test]
    fn remove_repairs_endpoints() {
        let mut arena = Arena([0; 512]);
        let [a, b, c] = blocks::<3>(&mut arena);
        let mut list = FreeList::new();
        unsafe {
            list.insert(a);
            list.insert(b);
            list.insert(c);

            list.remove(b);
            assert_eq!(collect(&list), [a, c]);

            list.remove(c);
            assert_eq!(collect(&list), [a]);
            assert_eq!(list.last(), Some(a));

            list.remove(a);
        }
        assert_eq!(collect(&list), []);
        assert_eq!(list.first(), None);
        assert_eq!(list.last(), None);
    }

    #[test]
    fn replace_inherits_the_slot() {
        let mut arena = Arena([0; 512]);
        let [a, b, c, d] = blocks::<4>(&mut arena);
        let mut list = FreeList::new();
        unsafe {
            list.insert(a);
            list.insert(b);
            list.insert(d);

            // b's slot goes to c (same list position, different block)
            list.replace(b, c);
            assert_eq!(collect(&list), [a, c, d]);
            assert_eq!(c.prev_free(), Some(a));
            assert_eq!(c.next_free(), Some(d));

            // endpoints move when the victim was one
            list.replace(a, b);
            assert_eq!(list.first(), Some(b));
        }
    }

    #[test]
    fn first_fit_scans_in_address_order() {
        let mut arena = Arena([0; 512]);
        let base = (&raw mut arena.0) as usize;
        let small = BlockPtr::new(base + 2 * WORD);
        let large = BlockPtr::new(base + 2 * WORD + MIN_BLOCK);
        unsafe {
            small.write_tags(BoundaryTag::pack(MIN_BLOCK, false));
            large.write_tags(BoundaryTag::pack(4 * MIN_BLOCK, false));
        }

        let mut list = FreeList::new();
        unsafe {
            list.insert(small);
            list.insert(large);

            assert_eq!(list.first_fit(MIN_BLOCK), Some(small));
            assert_eq!(list.first_fit(2 * MIN_BLOCK), Some(large));
            assert_eq!(list.first_fit(8 * MIN_BLOCK), None);
        }
    }
}
