// Copyright (c) 2024-present, snapdb
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! The attached-archive list (`spec.md` §4.F, §5): a copy-on-write
//! collection so readers enumerating it never observe a torn update
//! while the writer rotates a hard-committed archive in.
//!
//! Grounded on the concurrency model's "archive list is copy-on-write:
//! mutations produce a new immutable snapshot under a short lock" note
//! (`spec.md` §5) and, structurally, on the teacher's own
//! `Arc<ArcSwap<...>>`-free pattern of guarding a `Vec` behind a mutex
//! and handing out `Arc` snapshots of it (seen in `tree/inner.rs`'s
//! `levels` handling) — here simplified to a single `Mutex<Arc<Vec<_>>>`
//! since this engine has exactly one archive list per database, not a
//! leveled structure.

use crate::archive::ArchiveTable;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

/// One attached archive plus bookkeeping not stored in the archive file
/// itself: whether a checksum failure has marked it suspect
/// (`spec.md` §4.F.1) pending re-verification.
pub struct AttachedArchive {
    pub path: PathBuf,
    pub table: ArchiveTable,
    pub suspect: std::sync::atomic::AtomicBool,
}

impl AttachedArchive {
    #[must_use]
    pub fn new(path: PathBuf, table: ArchiveTable) -> Self {
        Self { path, table, suspect: std::sync::atomic::AtomicBool::new(false) }
    }

    pub fn mark_suspect(&self) {
        self.suspect.store(true, std::sync::atomic::Ordering::Release);
    }

    #[must_use]
    pub fn is_suspect(&self) -> bool {
        self.suspect.load(std::sync::atomic::Ordering::Acquire)
    }
}

/// A copy-on-write list of attached archives. `snapshot()` is the only
/// way to observe the list's contents; holding the returned `Arc` keeps
/// that exact membership alive even if the writer rotates a new archive
/// in immediately after.
#[derive(Default)]
pub struct ArchiveList {
    inner: Mutex<Arc<Vec<Arc<AttachedArchive>>>>,
}

impl ArchiveList {
    #[must_use]
    pub fn new() -> Self {
        Self { inner: Mutex::new(Arc::new(Vec::new())) }
    }

    #[must_use]
    pub fn snapshot(&self) -> Arc<Vec<Arc<AttachedArchive>>> {
        #[expect(clippy::expect_used, reason = "lock poisoning is unrecoverable")]
        self.inner.lock().expect("lock poisoned").clone()
    }

    /// Appends an archive, excluding any currently-suspect archives from
    /// the deferred-deletion sweep is the caller's responsibility, not
    /// this list's.
    pub fn attach(&self, archive: AttachedArchive) {
        #[expect(clippy::expect_used, reason = "lock poisoning is unrecoverable")]
        let mut guard = self.inner.lock().expect("lock poisoned");
        let mut next = Vec::with_capacity(guard.len() + 1);
        next.extend(guard.iter().cloned());
        next.push(Arc::new(archive));
        *guard = Arc::new(next);
    }

    /// Removes the archive at `path`, e.g. once it has been superseded
    /// and its last reader snapshot has closed (`spec.md` §3.4).
    pub fn detach(&self, path: &std::path::Path) {
        #[expect(clippy::expect_used, reason = "lock poisoning is unrecoverable")]
        let mut guard = self.inner.lock().expect("lock poisoned");
        let next: Vec<Arc<AttachedArchive>> = guard.iter().filter(|a| a.path != path).cloned().collect();
        *guard = Arc::new(next);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;
    use uuid::Uuid;

    #[test]
    fn snapshot_is_stable_across_concurrent_attach() {
        let dir = tempfile::tempdir().expect("tempdir");
        let list = ArchiveList::new();

        let table_a = ArchiveTable::create(&dir.path().join("a.snapdb"), 512, Uuid::from_u128(1), Uuid::from_u128(2), crate::tree::FIXED_SIZE_COMBINED).expect("create a");
        list.attach(AttachedArchive::new(dir.path().join("a.snapdb"), table_a));

        let observed = list.snapshot();
        assert_eq!(observed.len(), 1);

        let table_b = ArchiveTable::create(&dir.path().join("b.snapdb"), 512, Uuid::from_u128(1), Uuid::from_u128(2), crate::tree::FIXED_SIZE_COMBINED).expect("create b");
        list.attach(AttachedArchive::new(dir.path().join("b.snapdb"), table_b));

        // the snapshot taken before the second attach still shows one archive
        assert_eq!(observed.len(), 1);
        assert_eq!(list.snapshot().len(), 2);
    }

    #[test]
    fn mark_suspect_does_not_remove_from_the_list() {
        let dir = tempfile::tempdir().expect("tempdir");
        let list = ArchiveList::new();
        let table = ArchiveTable::create(&dir.path().join("a.snapdb"), 512, Uuid::from_u128(1), Uuid::from_u128(2), crate::tree::FIXED_SIZE_COMBINED).expect("create");
        list.attach(AttachedArchive::new(dir.path().join("a.snapdb"), table));

        let snapshot = list.snapshot();
        snapshot[0].mark_suspect();
        assert!(list.snapshot()[0].is_suspect());
    }
}
