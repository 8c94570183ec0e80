// Copyright (c) 2024-present, snapdb
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Sub-file directory entries (`spec.md` §3.1, §6.1).

use crate::coding::Stream;
use uuid::Uuid;

/// One entry of the file header's sub-file table: a named byte stream
/// inside the archive, addressed by its `direct_block` (the first
/// logical block of the stream) and `block_count`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubFileEntry {
    pub id: u16,
    pub guid: Uuid,
    pub name: String,
    pub direct_block: u32,
    pub block_count: u32,
    pub key_type: Uuid,
    pub value_type: Uuid,
    pub encoding: Uuid,
}

const MAX_NAME_CODEPOINTS: usize = 256;

impl SubFileEntry {
    pub fn encode(&self, out: &mut impl Stream) -> super::Result<()> {
        out.write_u16(self.id)?;
        out.write_guid(self.guid)?;
        out.write_string(&self.name)?;
        out.write_u32(self.direct_block)?;
        out.write_u32(self.block_count)?;
        out.write_guid(self.key_type)?;
        out.write_guid(self.value_type)?;
        out.write_guid(self.encoding)?;
        Ok(())
    }

    pub fn decode(input: &mut impl Stream) -> super::Result<Self> {
        let id = input.read_u16()?;
        let guid = input.read_guid()?;
        let name = input.try_read_string(MAX_NAME_CODEPOINTS)?;
        let direct_block = input.read_u32()?;
        let block_count = input.read_u32()?;
        let key_type = input.read_guid()?;
        let value_type = input.read_guid()?;
        let encoding = input.read_guid()?;
        Ok(Self { id, guid, name, direct_block, block_count, key_type, value_type, encoding })
    }

    /// The `(key_type, value_type, encoding)` triple that selects the
    /// archive table's concrete node encoding (`spec.md` §4.D, glossary
    /// "Encoding definition").
    #[must_use]
    pub fn encoding_definition(&self) -> (Uuid, Uuid, Uuid) {
        (self.key_type, self.value_type, self.encoding)
    }
}

/// The sub-file table: an ordered list of [`SubFileEntry`] plus lookup by id
/// or name.
#[derive(Clone, Debug, Default)]
pub struct SubFileTable {
    entries: Vec<SubFileEntry>,
}

impl SubFileTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, entry: SubFileEntry) {
        self.entries.push(entry);
    }

    #[must_use]
    pub fn by_id(&self, id: u16) -> Option<&SubFileEntry> {
        self.entries.iter().find(|e| e.id == id)
    }

    #[must_use]
    pub fn by_encoding(&self, key_type: Uuid, value_type: Uuid) -> Option<&SubFileEntry> {
        self.entries.iter().find(|e| e.key_type == key_type && e.value_type == value_type)
    }

    #[must_use]
    pub fn iter(&self) -> impl Iterator<Item = &SubFileEntry> {
        self.entries.iter()
    }

    #[must_use]
    pub fn next_free_id(&self) -> u16 {
        self.entries.iter().map(|e| e.id).max().map_or(1, |m| m + 1)
    }

    pub fn encode(&self, out: &mut impl Stream) -> super::Result<()> {
        out.write_varint_u32(self.entries.len() as u32)?;
        for entry in &self.entries {
            entry.encode(out)?;
        }
        Ok(())
    }

    pub fn decode(input: &mut impl Stream) -> super::Result<Self> {
        let count = input.read_varint_u32()?;
        let mut entries = Vec::with_capacity(count as usize);
        for _ in 0..count {
            entries.push(SubFileEntry::decode(input)?);
        }
        Ok(Self { entries })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coding::Cursor;
    use test_log::test;

    #[test]
    fn sub_file_table_round_trip() {
        let mut table = SubFileTable::new();
        table.push(SubFileEntry {
            id: 1,
            guid: Uuid::from_u128(1),
            name: "primary".into(),
            direct_block: 2,
            block_count: 10,
            key_type: Uuid::from_u128(2),
            value_type: Uuid::from_u128(3),
            encoding: Uuid::from_u128(4),
        });

        let mut cursor = Cursor::new();
        table.encode(&mut cursor).expect("encode");
        cursor.set_position(0);
        let decoded = SubFileTable::decode(&mut cursor).expect("decode");

        assert_eq!(decoded.by_id(1).expect("entry").name, "primary");
        assert_eq!(decoded.next_free_id(), 2);
    }
}
