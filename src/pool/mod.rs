// Copyright (c) 2024-present, snapdb
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Fixed-size page pool (component B).
//!
//! Hands out aligned, fixed-size buffers and stamps every handle with a
//! [`Generation`] token, the "pointer version" pattern `spec.md` §9 and §5
//! call for: a consumer holding a pointer into a page can tell, cheaply,
//! whether the pool has since recycled or grown past that page.
//!
//! Grounded on the teacher's `descriptor_table`/`block_cache` modules: an
//! `RwLock`-guarded table of slots plus an LRU free-list, sized by a page
//! count rather than a byte budget because every page here is the same
//! fixed `block_size`.

mod lru;

use lru::LruList;
use std::sync::{Arc, Mutex, RwLock};

/// An opaque token stamped on every page handed out by a [`PagePool`].
///
/// Two handles with different generations may alias the same backing
/// memory after a pool resize; comparing generations is how a holder of a
/// stale pointer notices.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord, Default)]
pub struct Generation(u64);

/// A single fixed-size page, owned by the pool.
pub struct Page {
    data: Vec<u8>,
    generation: Generation,
}

impl Page {
    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    #[must_use]
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.data
    }

    #[must_use]
    pub fn generation(&self) -> Generation {
        self.generation
    }
}

/// A handle to a pooled page. Returns the page to the pool's free list on
/// drop rather than deallocating it.
pub struct PageHandle {
    pool: Arc<PagePoolInner>,
    slot: usize,
    generation: Generation,
}

impl PageHandle {
    #[must_use]
    pub fn generation(&self) -> Generation {
        self.generation
    }

    /// `true` iff the pool has recycled this slot into a newer generation
    /// since this handle was issued (e.g. concurrent `grow`/reuse).
    #[must_use]
    pub fn is_stale(&self) -> bool {
        let slots = self.pool.slots.read().expect("lock poisoned");
        slots.get(self.slot).map(|p| p.generation) != Some(self.generation)
    }

    pub fn with_slice<R>(&self, f: impl FnOnce(&[u8]) -> R) -> Option<R> {
        let slots = self.pool.slots.read().expect("lock poisoned");
        let page = slots.get(self.slot)?;
        if page.generation != self.generation {
            return None;
        }
        Some(f(page.as_slice()))
    }

    pub fn with_mut_slice<R>(&self, f: impl FnOnce(&mut [u8]) -> R) -> Option<R> {
        let mut slots = self.pool.slots.write().expect("lock poisoned");
        let page = slots.get_mut(self.slot)?;
        if page.generation != self.generation {
            return None;
        }
        Some(f(page.as_mut_slice()))
    }
}

impl Drop for PageHandle {
    fn drop(&mut self) {
        self.pool.release(self.slot);
    }
}

struct PagePoolInner {
    slots: RwLock<Vec<Page>>,
    free: Mutex<LruList<usize>>,
    page_size: usize,
    next_generation: Mutex<u64>,
}

impl PagePoolInner {
    fn release(&self, slot: usize) {
        self.free.lock().expect("lock poisoned").push_front(slot);
    }
}

/// Thread-safe fixed-size page allocator.
///
/// Grows by doubling the live slot count (minimum 8) when the free list is
/// empty, matching the growth strategy `spec.md` §9's open question settles
/// on for the analogous weak-list structure.
pub struct PagePool {
    inner: Arc<PagePoolInner>,
}

impl PagePool {
    #[must_use]
    pub fn new(page_size: usize) -> Self {
        let inner = PagePoolInner {
            slots: RwLock::new(Vec::new()),
            free: Mutex::new(LruList::with_capacity(8)),
            page_size,
            next_generation: Mutex::new(1),
        };
        let pool = Self { inner: Arc::new(inner) };
        pool.grow(8);
        pool
    }

    #[must_use]
    pub fn page_size(&self) -> usize {
        self.inner.page_size
    }

    fn grow(&self, min_new_slots: usize) {
        let mut slots = self.inner.slots.write().expect("lock poisoned");
        let mut gen_counter = self.inner.next_generation.lock().expect("lock poisoned");
        let start = slots.len();
        let new_len = start + min_new_slots.max(8);
        slots.reserve(new_len - start);
        let mut free = self.inner.free.lock().expect("lock poisoned");
        for i in start..new_len {
            let generation = Generation(*gen_counter);
            *gen_counter += 1;
            slots.push(Page { data: vec![0u8; self.inner.page_size], generation });
            free.push_front(i);
        }
    }

    /// Allocates a page, growing the pool (doubling current capacity, with
    /// a floor of 8 slots) if none are free.
    pub fn allocate(&self) -> PageHandle {
        loop {
            let slot = {
                let mut free = self.inner.free.lock().expect("lock poisoned");
                free.pop_back()
            };

            if let Some(slot) = slot {
                let generation = {
                    let mut gen_counter = self.inner.next_generation.lock().expect("lock poisoned");
                    let g = Generation(*gen_counter);
                    *gen_counter += 1;
                    g
                };

                let mut slots = self.inner.slots.write().expect("lock poisoned");
                if let Some(page) = slots.get_mut(slot) {
                    page.generation = generation;
                    for b in page.as_mut_slice() {
                        *b = 0;
                    }
                }
                return PageHandle { pool: Arc::clone(&self.inner), slot, generation };
            }

            let current = self.inner.slots.read().expect("lock poisoned").len();
            self.grow(current.max(4));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn allocate_and_detect_staleness() {
        let pool = PagePool::new(64);
        let handle = pool.allocate();
        assert!(!handle.is_stale());
        handle.with_mut_slice(|b| b[0] = 42);
        assert_eq!(handle.with_slice(|b| b[0]), Some(42));
    }

    #[test]
    fn grows_past_initial_capacity() {
        let pool = PagePool::new(16);
        let mut handles = Vec::new();
        for _ in 0..100 {
            handles.push(pool.allocate());
        }
        assert_eq!(handles.len(), 100);
    }
}
