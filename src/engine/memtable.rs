// Copyright (c) 2024-present, snapdb
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! The single-writer, in-memory append buffer (`spec.md` §4.F): an
//! on-heap ordered structure standing in for an archive that has not
//! been flushed to disk yet. Grounded on the teacher's
//! `crossbeam-skiplist`-backed `Memtable`, adapted from its
//! `(InternalKey, UserValue)` MVCC model to this engine's soft/hard
//! commit epochs: an insert is invisible to a reader until the writer's
//! next `soft_commit`, mirroring the archive layer's
//! snapshot-sequence-number pinning (`spec.md` §3.3 invariant 7).

use crossbeam_skiplist::SkipMap;
use std::sync::atomic::{AtomicU32, Ordering};

#[derive(Clone, Copy, Debug)]
struct Entry {
    value: u64,
    epoch: u32,
}

/// An append-only buffer of `(u64, u64)` records, ordered by key, with
/// soft-commit epochs gating visibility to readers that pinned an epoch
/// before the writer's latest batch closed.
pub struct MemtableBuffer {
    items: SkipMap<u64, Entry>,
    pending_epoch: AtomicU32,
    visible_epoch: AtomicU32,
}

impl Default for MemtableBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl MemtableBuffer {
    #[must_use]
    pub fn new() -> Self {
        Self { items: SkipMap::new(), pending_epoch: AtomicU32::new(1), visible_epoch: AtomicU32::new(0) }
    }

    /// Appends or overwrites `key`, tagging it with the writer's current
    /// (not-yet-visible) batch epoch. Last writer wins for a given key
    /// within the same epoch, matching the tree layer's duplicate-key
    /// policy.
    pub fn insert(&self, key: u64, value: u64) {
        let epoch = self.pending_epoch.load(Ordering::Acquire);
        self.items.insert(key, Entry { value, epoch });
    }

    /// Makes every record inserted so far visible to readers that pin an
    /// epoch from this point on, and opens a fresh batch epoch for
    /// subsequent inserts.
    pub fn soft_commit(&self) -> u32 {
        let committed = self.pending_epoch.fetch_add(1, Ordering::AcqRel);
        self.visible_epoch.fetch_max(committed, Ordering::AcqRel);
        committed
    }

    /// The epoch a reader should pin: every record with `epoch <=` this
    /// value is durable-enough-to-read.
    #[must_use]
    pub fn visible_epoch(&self) -> u32 {
        self.visible_epoch.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, key: u64, as_of_epoch: u32) -> Option<u64> {
        self.items.get(&key).filter(|e| e.value().epoch <= as_of_epoch).map(|e| e.value().value)
    }

    /// Returns every visible record as of `as_of_epoch`, in ascending
    /// key order, materialized eagerly — the buffer is small enough
    /// (bounded by the hard-commit threshold) that the merging reader
    /// does not need a lazy adapter over the skip list.
    #[must_use]
    pub fn snapshot(&self, as_of_epoch: u32) -> Vec<(u64, u64)> {
        self.items.iter().filter(|e| e.value().epoch <= as_of_epoch).map(|e| (*e.key(), e.value().value)).collect()
    }

    /// Drains every record in ascending key order for a hard commit
    /// (flush to disk via the bulk writer). The buffer is left empty.
    pub fn drain_sorted(&self) -> Vec<(u64, u64)> {
        let out: Vec<(u64, u64)> = self.items.iter().map(|e| (*e.key(), e.value().value)).collect();
        for (key, _) in &out {
            self.items.remove(key);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn insert_is_invisible_until_soft_commit() {
        let buffer = MemtableBuffer::new();
        let pinned_before = buffer.visible_epoch();

        buffer.insert(1, 10);
        assert_eq!(buffer.snapshot(pinned_before), Vec::<(u64, u64)>::new());

        buffer.soft_commit();
        assert_eq!(buffer.snapshot(buffer.visible_epoch()), vec![(1, 10)]);
    }

    #[test]
    fn drain_sorted_empties_the_buffer_in_key_order() {
        let buffer = MemtableBuffer::new();
        for key in [5u64, 1, 3] {
            buffer.insert(key, key * 10);
        }
        buffer.soft_commit();

        let drained = buffer.drain_sorted();
        assert_eq!(drained, vec![(1, 10), (3, 30), (5, 50)]);
        assert!(buffer.is_empty());
    }
}
