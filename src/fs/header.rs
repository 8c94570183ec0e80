// Copyright (c) 2024-present, snapdb
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! The file header: format version, snapshot sequence, sub-file table, and
//! free-block allocator state (`spec.md` §3.1, §6.1), durably committed via
//! two alternating slots (`spec.md` §4.C "Transactional commit").

use super::allocator::FreeBlockAllocator;
use super::subfile::SubFileTable;
use crate::coding::{Cursor, Stream};
use uuid::Uuid;

/// The only format version this build understands.
pub const FORMAT_VERSION: u8 = 1;

/// The logical payload of the file header block, independent of which
/// physical slot it was read from or written to.
#[derive(Debug, Clone)]
pub struct FileHeader {
    pub format_version: u8,
    pub block_size: u32,
    pub snapshot_sequence_number: u32,
    pub commit_sequence: u64,
    pub archive_guid: Uuid,
    pub sub_files: SubFileTable,
    pub fat_sub_file_id: Option<u16>,
    pub allocator: FreeBlockAllocator,
}

impl FileHeader {
    #[must_use]
    pub fn new(block_size: u32, archive_guid: Uuid) -> Self {
        Self {
            format_version: FORMAT_VERSION,
            block_size,
            snapshot_sequence_number: 0,
            commit_sequence: 0,
            archive_guid,
            sub_files: SubFileTable::new(),
            fat_sub_file_id: None,
            allocator: FreeBlockAllocator::new(1),
        }
    }

    pub fn encode_payload(&self) -> super::Result<Vec<u8>> {
        let mut cursor = Cursor::new();
        cursor.write_u8(self.format_version)?;
        cursor.write_u32(self.block_size)?;
        cursor.write_u32(self.snapshot_sequence_number)?;
        cursor.write_u64(self.commit_sequence)?;
        cursor.write_guid(self.archive_guid)?;
        cursor.write_u8(u8::from(self.fat_sub_file_id.is_some()))?;
        if let Some(id) = self.fat_sub_file_id {
            cursor.write_u16(id)?;
        }
        self.sub_files.encode(&mut cursor)?;
        self.allocator.encode(&mut cursor)?;
        Ok(cursor.into_vec())
    }

    pub fn decode_payload(bytes: &[u8]) -> super::Result<Self> {
        let mut cursor = Cursor::from_vec(bytes.to_vec());
        let format_version = cursor.read_u8()?;
        if format_version != FORMAT_VERSION {
            return Err(super::Error::VersionMismatch(format_version));
        }
        let block_size = cursor.read_u32()?;
        let snapshot_sequence_number = cursor.read_u32()?;
        let commit_sequence = cursor.read_u64()?;
        let archive_guid = cursor.read_guid()?;
        let has_fat = cursor.read_u8()? != 0;
        let fat_sub_file_id = if has_fat { Some(cursor.read_u16()?) } else { None };
        let sub_files = SubFileTable::decode(&mut cursor)?;
        let allocator = FreeBlockAllocator::decode(&mut cursor)?;

        Ok(Self {
            format_version,
            block_size,
            snapshot_sequence_number,
            commit_sequence,
            archive_guid,
            sub_files,
            fat_sub_file_id,
            allocator,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn header_round_trips() {
        let mut header = FileHeader::new(4096, Uuid::from_u128(9));
        header.snapshot_sequence_number = 3;
        header.commit_sequence = 42;

        let bytes = header.encode_payload().expect("encode");
        let decoded = FileHeader::decode_payload(&bytes).expect("decode");
        assert_eq!(decoded.snapshot_sequence_number, 3);
        assert_eq!(decoded.commit_sequence, 42);
        assert_eq!(decoded.archive_guid, Uuid::from_u128(9));
    }

    #[test]
    fn unknown_version_rejected() {
        let header = FileHeader::new(4096, Uuid::nil());
        let mut bytes = header.encode_payload().expect("encode");
        bytes[0] = 200;
        let err = FileHeader::decode_payload(&bytes).expect_err("should reject");
        assert!(matches!(err, super::super::Error::VersionMismatch(200)));
    }
}
