// Copyright (c) 2024-present, snapdb
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! The server-side engine (component F): owns the attached-archive
//! list, the single-writer in-memory append buffer, and assembles
//! `MergingReader`s for `Read` requests.

pub mod archive_list;
mod error;
pub mod filters;
pub mod memtable;
pub mod merge;

pub use error::{Error, Result};

use archive_list::{ArchiveList, AttachedArchive};
use filters::{AccessControl, MatchFilter, SeekFilter};
use memtable::MemtableBuffer;
use merge::MergingReader;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// One database: an attached-archive list plus its single in-memory
/// write buffer, bound to one `(key_type, value_type)` encoding.
pub struct Engine {
    directory: PathBuf,
    key_type: Uuid,
    value_type: Uuid,
    encoding: Uuid,
    block_size: u32,
    archives: ArchiveList,
    buffer: MemtableBuffer,
    hard_commit_threshold: usize,
}

impl Engine {
    #[must_use]
    pub fn new(directory: PathBuf, key_type: Uuid, value_type: Uuid, encoding: Uuid, block_size: u32) -> Self {
        Self {
            directory,
            key_type,
            value_type,
            encoding,
            block_size,
            archives: ArchiveList::new(),
            buffer: MemtableBuffer::new(),
            hard_commit_threshold: 1_000_000,
        }
    }

    /// Attaches an already-existing archive file (`spec.md` §4.F).
    pub fn attach(&self, path: &Path) -> Result<()> {
        let table = crate::archive::ArchiveTable::open(path, self.key_type, self.value_type)?;
        self.archives.attach(AttachedArchive::new(path.to_path_buf(), table));
        Ok(())
    }

    /// Appends a single record to the in-memory buffer if `access` grants
    /// `user` `userCanWrite` for it; a denied record is silently dropped,
    /// the same skip-not-error policy `spec.md` §4.F gives denied reads.
    /// Writers are serialized by the caller (the session layer holds the
    /// sole writer handle per database; `spec.md` §5).
    pub fn write(&self, user: &str, access: &dyn AccessControl, key: u64, value: u64) {
        if access.user_can_write(user, key, value) {
            self.buffer.insert(key, value);
        }
    }

    /// Makes buffered writes visible to subsequent `read` calls without
    /// touching disk.
    pub fn soft_commit(&self) {
        self.buffer.soft_commit();
    }

    /// Flushes the in-memory buffer to a new on-disk archive via the
    /// bulk writer and rotates it into the attached-archive list. The
    /// buffer is left empty; readers that already pinned a buffer epoch
    /// keep seeing their materialized snapshot, since `snapshot()`
    /// copies rather than borrows.
    pub fn hard_commit(&self) -> Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }

        // Snapshot rather than drain first: if the bulk writer fails partway,
        // the buffer must still hold every record for the caller to retry
        // (`spec.md` §4.F.1, "the in-memory buffer is preserved and retried").
        let records = self.buffer.snapshot(self.buffer.visible_epoch());
        let path = self.directory.join(format!("{}.snapdb", uuid::Uuid::new_v4()));
        let mut writer = crate::archive::BulkWriter::create(&path, self.block_size, self.key_type, self.value_type, self.encoding)?;
        for (key, value) in &records {
            writer.append(*key, *value)?;
        }
        writer.finish().map_err(|_| Error::CommitFailed)?;

        // only cleared now that the archive is durably on disk
        let _ = self.buffer.drain_sorted();

        let table = crate::archive::ArchiveTable::open(&path, self.key_type, self.value_type)?;
        self.archives.attach(AttachedArchive::new(path, table));
        Ok(())
    }

    #[must_use]
    pub fn should_hard_commit(&self) -> bool {
        self.buffer.len() >= self.hard_commit_threshold
    }

    /// Builds a merging reader over every attached archive's current
    /// read snapshot plus the in-memory buffer's current visible epoch.
    ///
    /// The returned value borrows from caller-owned `ReadSnapshot`s
    /// rather than the engine directly, so pinning happens at `read`
    /// call time per `spec.md` §5 ("a reader's snapshot sequence is
    /// captured at `Read` entry").
    pub fn read<'a>(
        &'a self,
        snapshots: &'a [crate::archive::ReadSnapshot<'a>],
        seek: Option<Box<dyn SeekFilter + 'a>>,
        matcher: Option<Box<dyn MatchFilter + 'a>>,
        user: Option<String>,
        access: Option<&'a dyn AccessControl>,
    ) -> Result<MergingReader<'a>> {
        let mut scanners = Vec::with_capacity(snapshots.len());
        for snapshot in snapshots {
            scanners.push(snapshot.scanner()?);
        }
        MergingReader::new(scanners, seek, matcher, user, access).map_err(Into::into)
    }

    #[must_use]
    pub fn key_type(&self) -> Uuid {
        self.key_type
    }

    #[must_use]
    pub fn value_type(&self) -> Uuid {
        self.value_type
    }

    #[must_use]
    pub fn archives(&self) -> &ArchiveList {
        &self.archives
    }

    #[must_use]
    pub fn buffer(&self) -> &MemtableBuffer {
        &self.buffer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn hard_commit_flushes_buffer_into_a_new_archive() {
        let dir = tempfile::tempdir().expect("tempdir");
        let engine = Engine::new(dir.path().to_path_buf(), Uuid::from_u128(1), Uuid::from_u128(2), crate::tree::FIXED_SIZE_COMBINED, 512);

        for i in 0..100u64 {
            engine.write("alice", &filters::AllowAll, i, i * 2);
        }
        engine.soft_commit();
        assert_eq!(engine.archives().len(), 0);

        engine.hard_commit().expect("hard commit");
        assert_eq!(engine.archives().len(), 1);
        assert!(engine.buffer().is_empty());
    }

    struct DenyWrites;

    impl AccessControl for DenyWrites {
        fn user_can_seek(&self, _user: &str, _key: u64, _position: u64) -> bool {
            true
        }

        fn user_can_match(&self, _user: &str, _key: u64, _value: u64) -> bool {
            true
        }

        fn user_can_write(&self, _user: &str, _key: u64, _value: u64) -> bool {
            false
        }
    }

    #[test]
    fn write_denied_by_access_control_is_silently_dropped() {
        let dir = tempfile::tempdir().expect("tempdir");
        let engine = Engine::new(dir.path().to_path_buf(), Uuid::from_u128(1), Uuid::from_u128(2), crate::tree::FIXED_SIZE_COMBINED, 512);

        engine.write("mallory", &DenyWrites, 1, 100);
        assert!(engine.buffer().is_empty());

        engine.write("alice", &filters::AllowAll, 2, 200);
        assert_eq!(engine.buffer().len(), 1);
    }
}
