//! The circular buffer: a shared handle onto a storage block, plus the
//! copy-on-write protocol that decides, for every structural change, whether
//! the block can be mutated in place, grown, or must be replaced outright.

use alloc::rc::Rc;
use core::cmp;
use core::ptr;

use crate::storage::RawStorage;

/// Capacity to request when a full block has to grow.
#[inline]
fn grown_capacity(cap: usize) -> usize {
    cmp::max(1, cap * 2)
}

/// A value handle onto one reference-counted storage block.
///
/// Cloning the handle shares the block; the block is only ever written
/// through [`Rc::get_mut`], so a shared block is immutable by construction.
/// Every mutating entry point below first either proves the block unique or
/// migrates the live elements into a fresh block it owns exclusively.
pub(crate) struct RingBuffer<T> {
    storage: Rc<RawStorage<T>>,
}

impl<T> Clone for RingBuffer<T> {
    #[inline]
    fn clone(&self) -> Self {
        RingBuffer {
            storage: Rc::clone(&self.storage),
        }
    }
}

impl<T> RingBuffer<T> {
    #[inline]
    pub(crate) fn new() -> Self {
        RingBuffer {
            storage: Rc::new(RawStorage::with_capacity(0)),
        }
    }

    #[inline]
    pub(crate) fn with_capacity(cap: usize) -> Self {
        RingBuffer {
            storage: Rc::new(RawStorage::with_capacity(cap)),
        }
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.storage.len()
    }

    #[inline]
    pub(crate) fn is_empty(&self) -> bool {
        self.storage.is_empty()
    }

    #[inline]
    pub(crate) fn capacity(&self) -> usize {
        self.storage.capacity()
    }

    #[inline]
    pub(crate) fn get(&self, index: usize) -> &T {
        self.storage.get(index)
    }

    #[inline]
    pub(crate) fn as_slices(&self) -> (&[T], &[T]) {
        self.storage.as_slices()
    }

    /// Whether this handle is the block's only owner.
    #[inline]
    fn is_unique(&self) -> bool {
        Rc::strong_count(&self.storage) == 1
    }

    /// Drops every element. Keeps the allocation only when asked to and the
    /// block is not shared; otherwise other owners keep the old block and
    /// this handle falls back to the no-storage sentinel.
    pub(crate) fn clear(&mut self, keep_capacity: bool) {
        if keep_capacity {
            if let Some(storage) = Rc::get_mut(&mut self.storage) {
                storage.clear_in_place();
                return;
            }
        }
        self.storage = Rc::new(RawStorage::with_capacity(0));
    }

    #[cfg(test)]
    pub(crate) fn shares_storage_with(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.storage, &other.storage)
    }
}

impl<T: Clone> RingBuffer<T> {
    /// Appends an element, writing in place when the block is unique and has
    /// a free slot, and migrating to a replacement block otherwise.
    pub(crate) fn push_back(&mut self, value: T) {
        if let Some(storage) = Rc::get_mut(&mut self.storage) {
            if !storage.is_full() {
                storage.push_back(value);
                return;
            }
        }
        // Grow only when actually out of room; a merely shared block is
        // replaced at its current capacity.
        let cap = self.capacity();
        let target = if self.len() == cap { grown_capacity(cap) } else { cap };
        let mut next = self.rebuilt(target);
        next.push_back(value);
        self.storage = Rc::new(next);
    }

    /// Removes and returns the first element. The caller checks emptiness.
    pub(crate) fn pop_front(&mut self) -> T {
        debug_assert!(!self.is_empty());
        self.make_unique().pop_front()
    }

    /// Releases the first `n` elements. The caller checks `n <= len`.
    pub(crate) fn remove_front_many(&mut self, n: usize) {
        debug_assert!(n <= self.len());
        let storage = self.make_unique();
        for _ in 0..n {
            storage.pop_front();
        }
    }

    #[inline]
    pub(crate) fn get_mut(&mut self, index: usize) -> &mut T {
        self.make_unique().get_mut(index)
    }

    pub(crate) fn as_mut_slices(&mut self) -> (&mut [T], &mut [T]) {
        self.make_unique().as_mut_slices()
    }

    /// Swaps the elements at logical `i` and `j`. The caller bounds-checks.
    pub(crate) fn swap(&mut self, i: usize, j: usize) {
        let storage = self.make_unique();
        let (pi, pj) = (storage.physical(i), storage.physical(j));
        unsafe {
            ptr::swap(storage.slot(pi), storage.slot(pj));
        }
    }

    /// Inserts `value` at logical `index`, rebuilding into a block of the
    /// exact resulting size. The caller checks `index <= len`.
    pub(crate) fn insert(&mut self, index: usize, value: T) {
        let len = self.len();
        let new_len = match len.checked_add(1) {
            Some(new_len) => new_len,
            None => panic!("capacity overflow"),
        };
        let mut next = RawStorage::with_capacity(new_len);
        self.migrate_with_gap(&mut next, index, 1);
        unsafe {
            ptr::write(next.slot(index), value);
            next.set_live(new_len);
        }
        self.storage = Rc::new(next);
    }

    /// Inserts every element of `iter` starting at logical `index`,
    /// rebuilding into a block of the exact resulting size. An empty source
    /// allocates nothing. The caller checks `index <= len`.
    pub(crate) fn insert_many<I>(&mut self, index: usize, iter: I)
    where
        I: ExactSizeIterator<Item = T>,
    {
        let n = iter.len();
        if n == 0 {
            return;
        }
        let len = self.len();
        let new_len = match len.checked_add(n) {
            Some(new_len) => new_len,
            None => panic!("capacity overflow"),
        };
        let mut next = RawStorage::with_capacity(new_len);
        self.migrate_with_gap(&mut next, index, n);
        let mut written = 0;
        for value in iter {
            assert!(written < n, "iterator longer than its reported length");
            unsafe {
                ptr::write(next.slot(index + written), value);
            }
            written += 1;
        }
        assert!(written == n, "iterator shorter than its reported length");
        unsafe {
            next.set_live(new_len);
        }
        self.storage = Rc::new(next);
    }

    /// Removes and returns the element at logical `index`, rebuilding into a
    /// block of the exact resulting size. The caller checks `index < len`.
    pub(crate) fn remove(&mut self, index: usize) -> T {
        let len = self.len();
        let mut next = RawStorage::with_capacity(len - 1);
        let removed = self.migrate_excluding(&mut next, index);
        unsafe {
            next.set_live(len - 1);
        }
        self.storage = Rc::new(next);
        removed
    }

    /// Ensures the block can hold `additional` more elements without another
    /// migration and is safe to write.
    pub(crate) fn reserve(&mut self, additional: usize) {
        let needed = match self.len().checked_add(additional) {
            Some(needed) => needed,
            None => panic!("capacity overflow"),
        };
        let cap = self.capacity();
        if self.is_unique() && needed <= cap {
            return;
        }
        let target = if needed > cap {
            cmp::max(needed, grown_capacity(cap))
        } else {
            cap
        };
        let next = self.rebuilt(target);
        self.storage = Rc::new(next);
    }

    /// Reduces capacity to the live count, canonicalizing in the process.
    pub(crate) fn shrink_to_fit(&mut self) {
        if self.is_unique() && self.capacity() == self.len() {
            return;
        }
        let next = self.rebuilt(self.len());
        self.storage = Rc::new(next);
    }

    /// Makes the block writable: a no-op when already unique, otherwise a
    /// canonical exact-capacity copy. A copy therefore never carries forward
    /// capacity wasted by earlier removals.
    fn make_unique(&mut self) -> &mut RawStorage<T> {
        if !self.is_unique() {
            let next = self.rebuilt(self.len());
            self.storage = Rc::new(next);
        }
        match Rc::get_mut(&mut self.storage) {
            Some(storage) => storage,
            None => unreachable!("storage still shared after copy"),
        }
    }

    /// Builds a replacement block of capacity `target` holding the live
    /// elements in canonical order. Elements are moved out of a unique
    /// source block and cloned out of a shared one, which stays valid for
    /// its other owners.
    fn rebuilt(&mut self, target: usize) -> RawStorage<T> {
        let len = self.len();
        debug_assert!(target >= len);
        let mut next = RawStorage::with_capacity(target);
        if let Some(src) = Rc::get_mut(&mut self.storage) {
            let (a, b) = src.as_slices();
            unsafe {
                ptr::copy_nonoverlapping(a.as_ptr(), next.slot(0), a.len());
                ptr::copy_nonoverlapping(b.as_ptr(), next.slot(a.len()), b.len());
                next.set_live(len);
            }
            src.forget_all();
        } else {
            let (a, b) = self.storage.as_slices();
            for value in a.iter().chain(b) {
                next.push_back(value.clone());
            }
        }
        next
    }

    /// Migrates the live elements into `next`, leaving `gap` uninitialized
    /// slots at logical position `at`. `next` still reports zero live
    /// elements afterwards; the caller fills the gap and calls `set_live`.
    fn migrate_with_gap(&mut self, next: &mut RawStorage<T>, at: usize, gap: usize) {
        debug_assert!(at <= self.len());
        debug_assert!(next.capacity() >= self.len() + gap);
        if let Some(src) = Rc::get_mut(&mut self.storage) {
            let (a, b) = src.as_slices();
            let mut pos = 0;
            for seg in [a, b] {
                // Split the segment at the insertion point: everything at a
                // logical index below `at` keeps its position, the rest
                // shifts up by `gap`.
                let pre = cmp::min(at.saturating_sub(pos), seg.len());
                unsafe {
                    ptr::copy_nonoverlapping(seg.as_ptr(), next.slot(pos), pre);
                    ptr::copy_nonoverlapping(
                        seg.as_ptr().add(pre),
                        next.slot(pos + pre + gap),
                        seg.len() - pre,
                    );
                }
                pos += seg.len();
            }
            src.forget_all();
        } else {
            let (a, b) = self.storage.as_slices();
            for (i, value) in a.iter().chain(b).enumerate() {
                let slot = if i < at { i } else { i + gap };
                unsafe {
                    ptr::write(next.slot(slot), value.clone());
                }
            }
        }
    }

    /// Migrates every live element except the one at logical `index` into
    /// `next` and returns the excluded element. `next` still reports zero
    /// live elements afterwards; the caller calls `set_live`.
    fn migrate_excluding(&mut self, next: &mut RawStorage<T>, index: usize) -> T {
        debug_assert!(index < self.len());
        if let Some(src) = Rc::get_mut(&mut self.storage) {
            let removed = unsafe { ptr::read(src.slot(src.physical(index))) };
            let (a, b) = src.as_slices();
            let mut pos = 0;
            for seg in [a, b] {
                let pre = cmp::min(index.saturating_sub(pos), seg.len());
                // Skip the removed element when this segment contains it.
                let skip = if pos <= index && index < pos + seg.len() { 1 } else { 0 };
                unsafe {
                    ptr::copy_nonoverlapping(seg.as_ptr(), next.slot(pos), pre);
                    ptr::copy_nonoverlapping(
                        seg.as_ptr().add(pre + skip),
                        next.slot(pos + pre + skip - 1),
                        seg.len() - pre - skip,
                    );
                }
                pos += seg.len();
            }
            src.forget_all();
            removed
        } else {
            let (a, b) = self.storage.as_slices();
            let mut removed = None;
            for (i, value) in a.iter().chain(b).enumerate() {
                match i.cmp(&index) {
                    cmp::Ordering::Less => unsafe {
                        ptr::write(next.slot(i), value.clone());
                    },
                    cmp::Ordering::Equal => removed = Some(value.clone()),
                    cmp::Ordering::Greater => unsafe {
                        ptr::write(next.slot(i - 1), value.clone());
                    },
                }
            }
            match removed {
                Some(removed) => removed,
                None => unreachable!("index checked against len"),
            }
        }
    }
}
