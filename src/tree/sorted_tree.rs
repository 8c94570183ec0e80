// Copyright (c) 2024-present, snapdb
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! `SortedTree<u64, u64>`: the B+tree variant described in `spec.md` §3.2
//! and §4.D. The node layer itself knows nothing about record byte
//! layout; each tree resolves its `encoding` GUID to an [`Encoding`] trait
//! object once, at `create`/`open` time, and every leaf encode/decode call
//! delegates to it (`FixedSizeCombined`, 16-byte `(u64, u64)` records, is
//! the sole built-in).
//!
//! Node blocks are whole-block-per-node (not byte-continuous sub-files),
//! addressed through [`crate::fs::ArchiveFile::read_block_raw`] /
//! `write_block`. The key `u64::MAX` is reserved, mirroring the
//! file-structure layer's reserved block-index sentinel, and must not be
//! inserted: it is also the open-ended upper-bound marker for an internal
//! node's rightmost child.

use super::encoding::{self, Encoding};
use super::node::{InternalNode, LeafNode, Node, SENTINEL_BLOCK};
use super::sparse_index::SparseIndex;
use super::{Error, Result};
use crate::fs::block::{BlockType, FOOTER_LEN};
use crate::fs::ArchiveFile;

const LEAF_HEADER_LEN: usize = 1 + 2 + 1 + 8 + 1 + 8 + 4 + 4;
const INTERNAL_HEADER_LEN: usize = 1 + 2;
const INTERNAL_ENTRY_LEN: usize = 12;

fn leaf_capacity(block_data_len: usize, encoding: &dyn Encoding) -> usize {
    block_data_len.saturating_sub(LEAF_HEADER_LEN) / encoding.maximum_record_size()
}

fn internal_capacity(block_data_len: usize) -> usize {
    block_data_len.saturating_sub(INTERNAL_HEADER_LEN) / INTERNAL_ENTRY_LEN
}

pub struct SortedTree {
    sub_file_id: u16,
    index: SparseIndex,
    encoding: Box<dyn Encoding>,
}

impl SortedTree {
    /// Creates a brand-new, empty tree backed by a freshly registered
    /// sub-file.
    pub fn create(archive: &mut ArchiveFile, name: &str, key_type: uuid::Uuid, value_type: uuid::Uuid, encoding_guid: uuid::Uuid) -> Result<Self> {
        let encoding = encoding::resolve(encoding_guid)?;

        let root_block = archive.allocate_block();
        archive.write_block(root_block, BlockType::Data, 0, &LeafNode::empty().encode(encoding.as_ref())?)?;

        let sub_file_id = archive.create_sub_file(name, key_type, value_type, encoding_guid)?;
        archive.set_sub_file_root(sub_file_id, root_block);

        Ok(Self { sub_file_id, index: SparseIndex { root_block_index: root_block, root_level: 0 }, encoding })
    }

    /// Opens a tree whose root/height were previously persisted in the
    /// sub-file table (`direct_block` = root block, `block_count` =
    /// root level — this sub-file kind never uses `block_count` for an
    /// actual block tally, since node blocks are tracked by the allocator).
    pub fn open(archive: &ArchiveFile, sub_file_id: u16) -> Result<Self> {
        let entry = archive.sub_files().by_id(sub_file_id).ok_or(Error::NodeOverflow)?;
        let encoding = encoding::resolve(entry.encoding)?;
        Ok(Self {
            sub_file_id,
            index: SparseIndex { root_block_index: entry.direct_block, root_level: entry.block_count as u8 },
            encoding,
        })
    }

    #[must_use]
    pub fn sub_file_id(&self) -> u16 {
        self.sub_file_id
    }

    fn block_data_len(archive: &ArchiveFile) -> usize {
        archive.block_size() - FOOTER_LEN
    }

    pub fn try_get(&self, archive: &ArchiveFile, key: u64) -> Result<Option<u64>> {
        let (_, leaf_block) = self.index.find_path(archive, key, self.encoding.as_ref())?;
        let block = archive.read_block_raw(leaf_block)?;
        let leaf = as_leaf(Node::decode(block.payload(), self.encoding.as_ref())?)?;
        Ok(leaf.try_get(key))
    }

    pub fn get_or_get_next(&self, archive: &ArchiveFile, key: u64) -> Result<Option<(u64, u64)>> {
        let (_, leaf_block) = self.index.find_path(archive, key, self.encoding.as_ref())?;
        let block = archive.read_block_raw(leaf_block)?;
        let leaf = as_leaf(Node::decode(block.payload(), self.encoding.as_ref())?)?;
        if let Some(rec) = leaf.get_or_get_next(key) {
            return Ok(Some(rec));
        }
        // Not found in this leaf: the next record (if any) lives in the
        // right sibling's first record.
        if leaf.right_sibling == SENTINEL_BLOCK {
            return Ok(None);
        }
        let right = archive.read_block_raw(leaf.right_sibling)?;
        Ok(as_leaf(Node::decode(right.payload(), self.encoding.as_ref())?)?.first_record())
    }

    pub fn try_get_first_record(&self, archive: &ArchiveFile) -> Result<Option<(u64, u64)>> {
        let leftmost = self.index.leftmost_leaf(archive, self.encoding.as_ref())?;
        let block = archive.read_block_raw(leftmost)?;
        Ok(as_leaf(Node::decode(block.payload(), self.encoding.as_ref())?)?.first_record())
    }

    pub fn try_get_last_record(&self, archive: &ArchiveFile) -> Result<Option<(u64, u64)>> {
        let rightmost = self.index.rightmost_leaf(archive, self.encoding.as_ref())?;
        let block = archive.read_block_raw(rightmost)?;
        Ok(as_leaf(Node::decode(block.payload(), self.encoding.as_ref())?)?.last_record())
    }

    pub fn create_scanner<'a>(&'a self, archive: &'a ArchiveFile) -> Result<Scanner<'a>> {
        let leftmost = self.index.leftmost_leaf(archive, self.encoding.as_ref())?;
        let block = archive.read_block_raw(leftmost)?;
        let leaf = as_leaf(Node::decode(block.payload(), self.encoding.as_ref())?)?;
        Ok(Scanner { archive, encoding: self.encoding.as_ref(), current_leaf: Some(leaf), index: 0 })
    }

    /// Inserts `(key, value)`, splitting leaf and internal nodes as needed
    /// and updating the persisted root if the tree grows a level. The
    /// caller must still call [`ArchiveFile::commit`] to durably publish
    /// the result.
    pub fn try_insert(&mut self, archive: &mut ArchiveFile, key: u64, value: u64) -> Result<()> {
        if key == u64::MAX {
            return Err(Error::ReservedKey);
        }

        let block_data_len = Self::block_data_len(archive);
        let leaf_cap = leaf_capacity(block_data_len, self.encoding.as_ref());
        let (path, leaf_block) = self.index.find_path(archive, key, self.encoding.as_ref())?;

        let block = archive.read_block_raw(leaf_block)?;
        let mut leaf = as_leaf(Node::decode(block.payload(), self.encoding.as_ref())?)?;

        if leaf.try_insert(key, value, leaf_cap) {
            archive.write_block(leaf_block, BlockType::Data, self.sub_file_id, &leaf.encode(self.encoding.as_ref())?)?;
            return Ok(());
        }

        // Full: split, patch sibling links, then insert into whichever half
        // the key now routes to.
        let mut right = leaf.split();
        let right_block = archive.allocate_block();
        let old_right_sibling = leaf.right_sibling;
        right.left_sibling = leaf_block;
        leaf.right_sibling = right_block;

        if old_right_sibling != SENTINEL_BLOCK {
            let other = archive.read_block_raw(old_right_sibling)?;
            let mut other_leaf = as_leaf(Node::decode(other.payload(), self.encoding.as_ref())?)?;
            other_leaf.left_sibling = right_block;
            archive.write_block(old_right_sibling, BlockType::Data, self.sub_file_id, &other_leaf.encode(self.encoding.as_ref())?)?;
        }

        let separator = right.records.first().map_or(key, |(k, _)| *k);
        if key < separator {
            leaf.try_insert(key, value, leaf_cap);
        } else {
            right.try_insert(key, value, leaf_cap);
        }

        archive.write_block(leaf_block, BlockType::Data, self.sub_file_id, &leaf.encode(self.encoding.as_ref())?)?;
        archive.write_block(right_block, BlockType::Data, self.sub_file_id, &right.encode(self.encoding.as_ref())?)?;

        self.insert_into_parent(archive, path, separator, right_block)
    }

    fn insert_into_parent(&mut self, archive: &mut ArchiveFile, mut path: Vec<u32>, mut separator: u64, mut right_child: u32) -> Result<()> {
        let block_data_len = Self::block_data_len(archive);
        let internal_cap = internal_capacity(block_data_len);

        loop {
            let Some(node_block) = path.pop() else {
                let mut new_root = InternalNode::new(self.index.root_level + 1);
                new_root.entries.push((separator, self.index.root_block_index));
                new_root.entries.push((u64::MAX, right_child));

                let new_root_block = archive.allocate_block();
                archive.write_block(new_root_block, BlockType::Index, self.sub_file_id, &new_root.encode()?)?;

                self.index.root_block_index = new_root_block;
                self.index.root_level += 1;
                archive.set_sub_file_root(self.sub_file_id, new_root_block);
                archive.set_sub_file_root_level(self.sub_file_id, self.index.root_level);
                return Ok(());
            };

            let block = archive.read_block_raw(node_block)?;
            let mut internal = as_internal(Node::decode(block.payload(), self.encoding.as_ref())?)?;

            if internal.try_insert(separator, right_child, internal_cap) {
                archive.write_block(node_block, BlockType::Index, self.sub_file_id, &internal.encode()?)?;
                return Ok(());
            }

            let (bubble_separator, mut right_internal) = internal.split();
            let right_block = archive.allocate_block();
            if separator < bubble_separator {
                internal.try_insert(separator, right_child, internal_cap);
            } else {
                right_internal.try_insert(separator, right_child, internal_cap);
            }

            archive.write_block(node_block, BlockType::Index, self.sub_file_id, &internal.encode()?)?;
            archive.write_block(right_block, BlockType::Index, self.sub_file_id, &right_internal.encode()?)?;

            separator = bubble_separator;
            right_child = right_block;
        }
    }
}

fn as_leaf(node: Node) -> Result<LeafNode> {
    match node {
        Node::Leaf(leaf) => Ok(leaf),
        Node::Internal(i) => Err(Error::UnexpectedLevel { expected: 0, found: i.level }),
    }
}

fn as_internal(node: Node) -> Result<InternalNode> {
    match node {
        Node::Internal(internal) => Ok(internal),
        Node::Leaf(_) => Err(Error::UnexpectedLevel { expected: 1, found: 0 }),
    }
}

/// A forward-only cursor over a tree's leaves, honoring `SeekTo`/`Read`
/// (`spec.md` §4.D `CreateScanner`).
pub struct Scanner<'a> {
    archive: &'a ArchiveFile,
    encoding: &'a dyn Encoding,
    current_leaf: Option<LeafNode>,
    index: usize,
}

impl<'a> Scanner<'a> {
    pub fn seek_to(&mut self, tree: &SortedTree, key: u64) -> Result<()> {
        let (_, leaf_block) = tree.index.find_path(self.archive, key, self.encoding)?;
        let block = self.archive.read_block_raw(leaf_block)?;
        let leaf = as_leaf(Node::decode(block.payload(), self.encoding)?)?;
        self.index = leaf.records.partition_point(|(k, _)| *k < key);
        self.current_leaf = Some(leaf);
        Ok(())
    }

    pub fn read(&mut self) -> Result<Option<(u64, u64)>> {
        loop {
            let Some(leaf) = &self.current_leaf else {
                return Ok(None);
            };

            if self.index < leaf.records.len() {
                let record = leaf.records[self.index];
                self.index += 1;
                return Ok(Some(record));
            }

            let right_sibling = leaf.right_sibling;
            if right_sibling == SENTINEL_BLOCK {
                self.current_leaf = None;
                return Ok(None);
            }

            let block = self.archive.read_block_raw(right_sibling)?;
            self.current_leaf = Some(as_leaf(Node::decode(block.payload(), self.encoding)?)?);
            self.index = 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;
    use uuid::Uuid;

    fn new_archive(dir: &std::path::Path, block_size: u32) -> ArchiveFile {
        ArchiveFile::create(&dir.join("t.snapdb"), block_size, Uuid::new_v4()).expect("create archive")
    }

    #[test]
    fn insert_then_scan_preserves_ascending_order() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut archive = new_archive(dir.path(), 512);
        let mut tree = SortedTree::create(&mut archive, "primary", Uuid::from_u128(1), Uuid::from_u128(2), encoding::FIXED_SIZE_COMBINED).expect("create tree");

        for i in 0..500u64 {
            tree.try_insert(&mut archive, i, i * 2).expect("insert");
        }
        archive.commit().expect("commit");

        let mut scanner = tree.create_scanner(&archive).expect("scanner");
        let mut expected = 0u64;
        while let Some((k, v)) = scanner.read().expect("read") {
            assert_eq!(k, expected);
            assert_eq!(v, expected * 2);
            expected += 1;
        }
        assert_eq!(expected, 500);
    }

    #[test]
    fn try_get_finds_inserted_records_after_splits() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut archive = new_archive(dir.path(), 256);
        let mut tree = SortedTree::create(&mut archive, "primary", Uuid::from_u128(1), Uuid::from_u128(2), encoding::FIXED_SIZE_COMBINED).expect("create tree");

        for i in 0..1000u64 {
            tree.try_insert(&mut archive, i, i * 2).expect("insert");
        }
        archive.commit().expect("commit");

        assert_eq!(tree.try_get(&archive, 500).expect("get"), Some(1000));
        assert_eq!(tree.try_get(&archive, 999).expect("get"), Some(1998));
        assert_eq!(tree.try_get(&archive, 1000).expect("get"), None);
    }

    #[test]
    fn duplicate_insert_is_last_writer_wins() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut archive = new_archive(dir.path(), 512);
        let mut tree = SortedTree::create(&mut archive, "primary", Uuid::from_u128(1), Uuid::from_u128(2), encoding::FIXED_SIZE_COMBINED).expect("create tree");

        tree.try_insert(&mut archive, 7, 70).expect("insert");
        tree.try_insert(&mut archive, 7, 700).expect("overwrite");
        archive.commit().expect("commit");

        assert_eq!(tree.try_get(&archive, 7).expect("get"), Some(700));
    }

    #[test]
    fn close_and_reopen_preserves_tree_after_splits() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("reload.snapdb");
        let guid = Uuid::new_v4();

        {
            let mut archive = ArchiveFile::create(&path, 512, guid).expect("create");
            let mut tree = SortedTree::create(&mut archive, "primary", Uuid::from_u128(1), Uuid::from_u128(2), encoding::FIXED_SIZE_COMBINED).expect("create tree");
            for i in 0..5000u64 {
                tree.try_insert(&mut archive, i, i * 2).expect("insert");
            }
            archive.commit().expect("commit");
        }

        let archive = ArchiveFile::open(&path).expect("reopen");
        let sub_file_id = archive.sub_files().iter().next().expect("entry").id;
        let tree = SortedTree::open(&archive, sub_file_id).expect("open tree");

        let mut scanner = tree.create_scanner(&archive).expect("scanner");
        let mut count = 0u64;
        while let Some((k, v)) = scanner.read().expect("read") {
            assert_eq!(k, count);
            assert_eq!(v, count * 2);
            count += 1;
        }
        assert_eq!(count, 5000);
    }
}
