// Copyright (c) 2024-present, snapdb
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! The archive table layer (component E): binds a sub-file to a specific
//! `(Key, Value, encoding)` triple, exposes pinned read snapshots and
//! incremental edit transactions, and a sequential bulk writer for the
//! strictly-ascending-key ingest path (`spec.md` §4.E).

mod error;

pub use error::{Error, Result};

use crate::fs::ArchiveFile;
use crate::tree::{Scanner, SortedTree};
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// An opened archive: the file-structure container plus its one
/// `SortedTree`.
pub struct ArchiveTable {
    file: ArchiveFile,
    tree: SortedTree,
}

impl ArchiveTable {
    /// Creates a new archive at `path` with a single tree sub-file under
    /// the given encoding definition.
    pub fn create(path: &Path, block_size: u32, key_type: Uuid, value_type: Uuid, encoding: Uuid) -> Result<Self> {
        let mut file = ArchiveFile::create(path, block_size, Uuid::new_v4())?;
        let tree = SortedTree::create(&mut file, "primary", key_type, value_type, encoding)?;
        file.commit()?;
        Ok(Self { file, tree })
    }

    /// Opens an existing archive, finding the sub-file whose encoding
    /// definition matches `(key_type, value_type)` and pinning its sparse
    /// index root.
    pub fn open(path: &Path, key_type: Uuid, value_type: Uuid) -> Result<Self> {
        let file = ArchiveFile::open(path)?;
        let entry = file.sub_files().by_encoding(key_type, value_type).ok_or(Error::EncodingNotFound)?;
        let tree = SortedTree::open(&file, entry.id)?;
        Ok(Self { file, tree })
    }

    /// Pins the archive's current snapshot sequence number and returns a
    /// handle for reads; the pinned sequence never advances even as the
    /// caller (or another thread) continues writing and committing
    /// (`spec.md` invariant 7).
    #[must_use]
    pub fn read_snapshot(&self) -> ReadSnapshot<'_> {
        ReadSnapshot { file: &self.file, tree: &self.tree, pinned_sequence: self.file.snapshot_sequence_number() }
    }

    /// Opens an incremental editor: each `insert` routes through the tree's
    /// ordinary split-aware path; nothing is visible to readers until
    /// `commit`.
    pub fn edit(&mut self) -> EditTransaction<'_> {
        EditTransaction { file: &mut self.file, tree: &mut self.tree }
    }

    #[must_use]
    pub fn snapshot_sequence_number(&self) -> u32 {
        self.file.snapshot_sequence_number()
    }
}

/// A read-only view pinned to the snapshot sequence number observed at
/// `read_snapshot()` time.
pub struct ReadSnapshot<'a> {
    file: &'a ArchiveFile,
    tree: &'a SortedTree,
    pinned_sequence: u32,
}

impl<'a> ReadSnapshot<'a> {
    #[must_use]
    pub fn pinned_sequence(&self) -> u32 {
        self.pinned_sequence
    }

    pub fn try_get(&self, key: u64) -> Result<Option<u64>> {
        Ok(self.tree.try_get(self.file, key)?)
    }

    pub fn get_or_get_next(&self, key: u64) -> Result<Option<(u64, u64)>> {
        Ok(self.tree.get_or_get_next(self.file, key)?)
    }

    pub fn first_record(&self) -> Result<Option<(u64, u64)>> {
        Ok(self.tree.try_get_first_record(self.file)?)
    }

    pub fn last_record(&self) -> Result<Option<(u64, u64)>> {
        Ok(self.tree.try_get_last_record(self.file)?)
    }

    pub fn scanner(&self) -> Result<Scanner<'a>> {
        Ok(self.tree.create_scanner(self.file)?)
    }
}

/// An incremental editor. Writes made through `insert` are durable only
/// once `commit` returns `Ok`.
pub struct EditTransaction<'a> {
    file: &'a mut ArchiveFile,
    tree: &'a mut SortedTree,
}

impl EditTransaction<'_> {
    pub fn insert(&mut self, key: u64, value: u64) -> Result<()> {
        Ok(self.tree.try_insert(self.file, key, value)?)
    }

    pub fn commit(self) -> Result<()> {
        Ok(self.file.commit()?)
    }
}

/// A sequential bulk writer: builds a brand-new archive in a temp file
/// beside the destination path, then atomically publishes it on
/// `finish()` (grounded on the teacher's `file::rewrite_atomic` pattern).
/// The caller's keys must be strictly ascending; out-of-order keys are
/// rejected rather than silently accepted, since this path exists
/// specifically to skip the tree's general-purpose leaf search.
pub struct BulkWriter {
    temp_file: tempfile::NamedTempFile,
    final_path: PathBuf,
    table: ArchiveTable,
    last_key: Option<u64>,
}

impl BulkWriter {
    pub fn create(final_path: &Path, block_size: u32, key_type: Uuid, value_type: Uuid, encoding: Uuid) -> Result<Self> {
        let folder = final_path.parent().unwrap_or_else(|| Path::new("."));
        let temp_file = tempfile::NamedTempFile::new_in(folder)?;

        let table = ArchiveTable::create(temp_file.path(), block_size, key_type, value_type, encoding)?;
        Ok(Self { temp_file, final_path: final_path.to_path_buf(), table, last_key: None })
    }

    pub fn append(&mut self, key: u64, value: u64) -> Result<()> {
        if let Some(last) = self.last_key {
            if key <= last {
                return Err(Error::OutOfOrder);
            }
        }
        self.table.edit().insert(key, value)?;
        self.last_key = Some(key);
        Ok(())
    }

    /// Commits the final header, then atomically renames the temp file
    /// into place.
    pub fn finish(mut self) -> Result<()> {
        self.table.file.commit()?;
        self.temp_file.persist(&self.final_path).map_err(|e| Error::Io(e.error))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    const KEY_TYPE: Uuid = Uuid::from_u128(1);
    const VALUE_TYPE: Uuid = Uuid::from_u128(2);
    const ENCODING: Uuid = crate::tree::FIXED_SIZE_COMBINED;

    #[test]
    fn edit_transaction_commit_makes_records_visible() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("a.snapdb");
        let mut table = ArchiveTable::create(&path, 512, KEY_TYPE, VALUE_TYPE, ENCODING).expect("create");

        {
            let mut editor = table.edit();
            editor.insert(1, 10).expect("insert");
            editor.insert(2, 20).expect("insert");
            editor.commit().expect("commit");
        }

        let snapshot = table.read_snapshot();
        assert_eq!(snapshot.try_get(1).expect("get"), Some(10));
        assert_eq!(snapshot.try_get(2).expect("get"), Some(20));
    }

    #[test]
    fn bulk_writer_rejects_out_of_order_keys_and_publishes_atomically() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("bulk.snapdb");

        let mut writer = BulkWriter::create(&path, 512, KEY_TYPE, VALUE_TYPE, ENCODING).expect("create bulk writer");
        for i in 0..1000u64 {
            writer.append(i, i * 2).expect("append");
        }
        assert!(matches!(writer.append(500, 1), Err(Error::OutOfOrder)));
        writer.finish().expect("finish");

        assert!(path.exists());
        let table = ArchiveTable::open(&path, KEY_TYPE, VALUE_TYPE).expect("reopen");
        let snapshot = table.read_snapshot();
        assert_eq!(snapshot.first_record().expect("first"), Some((0, 0)));
        assert_eq!(snapshot.last_record().expect("last"), Some((999, 1998)));
    }
}
