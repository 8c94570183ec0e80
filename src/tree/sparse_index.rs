// Copyright (c) 2024-present, snapdb
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! The sparse index: the chain of internal nodes from root to leaves
//! (`spec.md` §3.2, §4.D "Sparse index").

use super::encoding::Encoding;
use super::node::{InternalNode, Node};
use super::{Error, Result};
use crate::fs::ArchiveFile;

/// `root_block_index`/`root_level` for one `SortedTree`. `root_level == 0`
/// means the root is itself a leaf (a brand-new, unsplit tree).
#[derive(Copy, Clone, Debug)]
pub struct SparseIndex {
    pub root_block_index: u32,
    pub root_level: u8,
}

impl SparseIndex {
    /// Walks from the root to the leaf that would contain `key`, recording
    /// the path of internal-node block indices visited (root first).
    pub fn find_path(&self, archive: &ArchiveFile, key: u64, encoding: &dyn Encoding) -> Result<(Vec<u32>, u32)> {
        let mut path = Vec::new();
        let mut current = self.root_block_index;
        let mut level = self.root_level;

        while level > 0 {
            path.push(current);
            let block = archive.read_block_raw(current)?;
            match Node::decode(block.payload(), encoding)? {
                Node::Internal(internal) => {
                    current = Self::route_or_last(&internal, key);
                    level -= 1;
                }
                Node::Leaf(_) => return Err(Error::UnexpectedLevel { expected: level, found: 0 }),
            }
        }

        Ok((path, current))
    }

    fn route_or_last(internal: &InternalNode, key: u64) -> u32 {
        internal.route(key).unwrap_or_else(|| internal.entries.last().map_or(super::node::SENTINEL_BLOCK, |(_, c)| *c))
    }

    pub fn leftmost_leaf(&self, archive: &ArchiveFile, encoding: &dyn Encoding) -> Result<u32> {
        let mut current = self.root_block_index;
        let mut level = self.root_level;
        while level > 0 {
            let block = archive.read_block_raw(current)?;
            match Node::decode(block.payload(), encoding)? {
                Node::Internal(internal) => {
                    current = internal.entries.first().map(|(_, c)| *c).ok_or(Error::NodeOverflow)?;
                    level -= 1;
                }
                Node::Leaf(_) => return Err(Error::UnexpectedLevel { expected: level, found: 0 }),
            }
        }
        Ok(current)
    }

    pub fn rightmost_leaf(&self, archive: &ArchiveFile, encoding: &dyn Encoding) -> Result<u32> {
        let mut current = self.root_block_index;
        let mut level = self.root_level;
        while level > 0 {
            let block = archive.read_block_raw(current)?;
            match Node::decode(block.payload(), encoding)? {
                Node::Internal(internal) => {
                    current = internal.entries.last().map(|(_, c)| *c).ok_or(Error::NodeOverflow)?;
                    level -= 1;
                }
                Node::Leaf(_) => return Err(Error::UnexpectedLevel { expected: level, found: 0 }),
            }
        }
        Ok(current)
    }
}
