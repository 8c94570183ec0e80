// Copyright (c) 2024-present, snapdb
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Ties the block format, header, allocator, and positioned I/O together
//! into an openable archive file with transactional commit (`spec.md` §4.C,
//! testable property S6: "crash between writing data blocks and the header
//! slot never loses a previously committed snapshot").
//!
//! The header is stored in two alternating fixed-size slots at the start of
//! the file. Opening an archive reads both slots, discards whichever one
//! fails its checksum (or is simply absent, for a fresh file), and trusts
//! the surviving slot with the larger `commit_sequence`. A commit always
//! writes to the *other* slot than the one currently active, so a crash
//! mid-write leaves the previously active slot untouched and recoverable.

use super::allocator::FreeBlockAllocator;
use super::block::{Block, BlockType, Footer};
use super::header::FileHeader;
use super::pread;
use super::session::IoSession;
use super::subfile::{SubFileEntry, SubFileTable};
use super::{Error, Result};
use std::fs::{File, OpenOptions};
use std::path::Path;
use uuid::Uuid;

/// Fixed size of each header slot, independent of the archive's configured
/// data `block_size` — the header must be locatable before that value is
/// known.
const HEADER_SLOT_SIZE: usize = 4096;
const HEADER_SLOT_COUNT: u64 = 2;

/// The byte offset at which the data/index block region begins, past both
/// header slots.
const DATA_REGION_START: u64 = HEADER_SLOT_SIZE as u64 * HEADER_SLOT_COUNT;

pub struct ArchiveFile {
    file: File,
    header: FileHeader,
    active_slot: u8,
}

impl ArchiveFile {
    /// Creates a brand-new archive at `path`, truncating any existing file.
    pub fn create(path: &Path, block_size: u32, archive_guid: Uuid) -> Result<Self> {
        let file = OpenOptions::new().read(true).write(true).create(true).truncate(true).open(path)?;
        let mut header = FileHeader::new(block_size, archive_guid);
        header.commit_sequence = 1;
        let mut archive = Self { file, header, active_slot: 0 };
        archive.write_slot(0)?;
        Ok(archive)
    }

    /// Opens an existing archive, recovering the most recently committed
    /// header slot.
    pub fn open(path: &Path) -> Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        let slot_a = Self::try_read_slot(&file, 0);
        let slot_b = Self::try_read_slot(&file, 1);

        let (header, active_slot) = match (slot_a, slot_b) {
            (Ok(a), Ok(b)) if b.commit_sequence > a.commit_sequence => (b, 1),
            (Ok(a), _) => (a, 0),
            (Err(_), Ok(b)) => (b, 1),
            (Err(e), Err(_)) => return Err(e),
        };

        Ok(Self { file, header, active_slot })
    }

    fn try_read_slot(file: &File, slot: u8) -> Result<FileHeader> {
        let mut raw = vec![0u8; HEADER_SLOT_SIZE];
        let offset = slot as u64 * HEADER_SLOT_SIZE as u64;
        pread::read_exact_at(file, &mut raw, offset)?;
        let block = Block::decode(&raw)?;
        if block.footer().block_type != BlockType::FileHeader {
            return Err(Error::Corrupted("header slot does not hold a file-header block".into()));
        }
        FileHeader::decode_payload(block.payload())
    }

    fn write_slot(&mut self, slot: u8) -> Result<()> {
        let payload = self.header.encode_payload()?;
        if payload.len() > HEADER_SLOT_SIZE - super::block::FOOTER_LEN {
            return Err(Error::Corrupted("file header payload exceeds slot capacity".into()));
        }

        let footer = Footer::new(BlockType::FileHeader, 0, u32::from(slot), self.header.snapshot_sequence_number);
        let mut block = Block::new(HEADER_SLOT_SIZE, footer);
        block.payload_mut()[..payload.len()].copy_from_slice(&payload);

        let mut encoded = Vec::with_capacity(HEADER_SLOT_SIZE);
        block.finalize_and_encode(&mut encoded);

        let offset = slot as u64 * HEADER_SLOT_SIZE as u64;
        pread::write_all_at(&self.file, &encoded, offset)?;
        self.file.sync_data()?;
        self.active_slot = slot;
        Ok(())
    }

    #[must_use]
    pub fn header(&self) -> &FileHeader {
        &self.header
    }

    #[must_use]
    pub fn block_size(&self) -> usize {
        self.header.block_size as usize
    }

    #[must_use]
    pub fn sub_files(&self) -> &SubFileTable {
        &self.header.sub_files
    }

    /// Opens an I/O session positioned over the given sub-file's data
    /// region.
    #[must_use]
    pub fn open_session(&self, sub_file_id: u16) -> IoSession<'_> {
        IoSession::new(&self.file, DATA_REGION_START, self.block_size(), sub_file_id)
    }

    /// Registers a new sub-file, allocating its first block and returning
    /// the assigned id.
    pub fn create_sub_file(&mut self, name: &str, key_type: Uuid, value_type: Uuid, encoding: Uuid) -> Result<u16> {
        let id = self.header.sub_files.next_free_id();
        let snapshot = self.header.snapshot_sequence_number;
        let direct_block = self.header.allocator.allocate(1, snapshot)[0];

        self.header.sub_files.push(SubFileEntry {
            id,
            guid: Uuid::new_v4(),
            name: name.to_string(),
            direct_block,
            block_count: 1,
            key_type,
            value_type,
            encoding,
        });
        Ok(id)
    }

    #[must_use]
    pub fn allocator(&self) -> &FreeBlockAllocator {
        &self.header.allocator
    }

    /// Allocates a single fresh logical block index, eligible for reuse by
    /// the (not-yet-committed) next snapshot.
    pub fn allocate_block(&mut self) -> u32 {
        let upcoming_snapshot = self.header.snapshot_sequence_number + 1;
        self.header.allocator.allocate(1, upcoming_snapshot)[0]
    }

    /// Marks a block as free as of the (not-yet-committed) next snapshot.
    pub fn free_block(&mut self, sub_file_id: u16, block_index: u32) {
        let upcoming_snapshot = self.header.snapshot_sequence_number + 1;
        self.header.allocator.free(sub_file_id, block_index, upcoming_snapshot);
    }

    /// Reads and checksum-verifies a single whole-block-per-node node
    /// block, for consumers (the sorted-tree layer) that own entire blocks
    /// rather than addressing a byte-continuous sub-file through
    /// [`Self::open_session`].
    pub fn read_block_raw(&self, physical_block: u32) -> Result<Block> {
        let mut raw = vec![0u8; self.block_size()];
        let offset = DATA_REGION_START + u64::from(physical_block) * self.block_size() as u64;
        pread::read_exact_at(&self.file, &mut raw, offset)?;
        Block::decode(&raw)
    }

    /// Writes `payload` (a node's encoded bytes) into `physical_block`,
    /// stamping the footer with the upcoming snapshot sequence number.
    pub fn write_block(&self, physical_block: u32, block_type: BlockType, sub_file_id: u16, payload: &[u8]) -> Result<()> {
        let footer = Footer::new(block_type, sub_file_id, physical_block, self.header.snapshot_sequence_number + 1);
        let mut block = Block::new(self.block_size(), footer);
        block.payload_mut()[..payload.len()].copy_from_slice(payload);

        let mut encoded = Vec::with_capacity(self.block_size());
        block.finalize_and_encode(&mut encoded);
        let offset = DATA_REGION_START + u64::from(physical_block) * self.block_size() as u64;
        pread::write_all_at(&self.file, &encoded, offset)?;
        Ok(())
    }

    /// Updates a sub-file's `direct_block` after the tree layer changes its
    /// root (e.g. a sparse-index root split).
    pub fn set_sub_file_root(&mut self, sub_file_id: u16, direct_block: u32) {
        self.mutate_sub_file(sub_file_id, |entry| entry.direct_block = direct_block);
    }

    /// Persists a `SortedTree`'s root level, repurposing the sub-file
    /// table's `block_count` field (meaningless for a tree, whose node
    /// blocks are tracked by the allocator, not by a contiguous count).
    pub fn set_sub_file_root_level(&mut self, sub_file_id: u16, root_level: u8) {
        self.mutate_sub_file(sub_file_id, |entry| entry.block_count = u32::from(root_level));
    }

    fn mutate_sub_file(&mut self, sub_file_id: u16, f: impl FnOnce(&mut SubFileEntry)) {
        if let Some(pos) = self.header.sub_files.iter().position(|e| e.id == sub_file_id) {
            let mut entries: Vec<_> = self.header.sub_files.iter().cloned().collect();
            f(&mut entries[pos]);
            let mut table = SubFileTable::new();
            for e in entries {
                table.push(e);
            }
            self.header.sub_files = table;
        }
    }

    /// Transactional commit: the caller flushes every session whose dirty
    /// blocks should become part of this snapshot *before* calling this
    /// method (data blocks must reach disk before the header slot that
    /// references them does). This method fsyncs the data region, bumps the
    /// commit and snapshot counters, and durably writes the alternate
    /// header slot.
    pub fn commit(&mut self) -> Result<()> {
        self.file.sync_data()?;
        self.header.commit_sequence += 1;
        self.header.snapshot_sequence_number += 1;
        let next_slot = 1 - self.active_slot;
        self.write_slot(next_slot)
    }

    #[must_use]
    pub fn snapshot_sequence_number(&self) -> u32 {
        self.header.snapshot_sequence_number
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn create_open_and_commit_round_trip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("archive.snapdb");

        let guid = Uuid::new_v4();
        {
            let mut archive = ArchiveFile::create(&path, 4096, guid).expect("create");
            let id = archive
                .create_sub_file("primary", Uuid::from_u128(1), Uuid::from_u128(2), Uuid::from_u128(3))
                .expect("create sub-file");

            {
                let mut session = archive.open_session(id);
                let direct_block = archive.sub_files().by_id(id).expect("entry").direct_block;
                let (buf, _) = session
                    .write_view(direct_block, archive.block_size() - crate::fs::block::FOOTER_LEN, 0, 1)
                    .expect("write view");
                buf[0] = 0xAB;
                session.flush().expect("flush");
            }

            archive.commit().expect("commit");
            assert_eq!(archive.snapshot_sequence_number(), 1);
        }

        let reopened = ArchiveFile::open(&path).expect("reopen");
        assert_eq!(reopened.header().archive_guid, guid);
        assert_eq!(reopened.snapshot_sequence_number(), 1);
        assert_eq!(reopened.sub_files().by_id(1).expect("entry").name, "primary");
    }

    #[test]
    fn open_falls_back_to_surviving_slot_when_other_is_corrupt() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("archive.snapdb");

        let guid = Uuid::new_v4();
        {
            let mut archive = ArchiveFile::create(&path, 4096, guid).expect("create");
            archive.commit().expect("commit");
        }

        // Corrupt slot B (the slot a second commit would have written to);
        // slot A must still be recoverable.
        {
            let file = OpenOptions::new().write(true).open(&path).expect("reopen for corruption");
            let garbage = vec![0xEEu8; HEADER_SLOT_SIZE];
            pread::write_all_at(&file, &garbage, HEADER_SLOT_SIZE as u64).expect("corrupt slot b");
        }

        let reopened = ArchiveFile::open(&path).expect("should fall back to slot a");
        assert_eq!(reopened.header().archive_guid, guid);
    }
}
