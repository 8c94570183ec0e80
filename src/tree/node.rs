// Copyright (c) 2024-present, snapdb
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Leaf and internal node formats (`spec.md` §4.D).
//!
//! Both node kinds are encoded through a growable [`Cursor`] and then
//! copied into a block's fixed-size payload; `record_count` (not the
//! payload's trailing zero bytes) is authoritative for how many records a
//! decode call reads back.

use super::encoding::Encoding;
use super::{Error, Result};
use crate::coding::{Cursor, Stream};

/// `0xFFFF_FFFF` marks "no sibling"/"no separator bound" — the same
/// reserved sentinel the file-structure layer uses for block indices.
pub const SENTINEL_BLOCK: u32 = crate::fs::block::RESERVED_BLOCK_SENTINEL;

const LEVEL_LEAF: u8 = 0;

/// A leaf node: a sorted run of `(key, value)` records plus sibling links.
#[derive(Clone, Debug, Default)]
pub struct LeafNode {
    pub lower_key: Option<u64>,
    pub upper_key: Option<u64>,
    pub left_sibling: u32,
    pub right_sibling: u32,
    pub records: Vec<(u64, u64)>,
}

impl LeafNode {
    #[must_use]
    pub fn empty() -> Self {
        Self { lower_key: None, upper_key: None, left_sibling: SENTINEL_BLOCK, right_sibling: SENTINEL_BLOCK, records: Vec::new() }
    }

    #[must_use]
    pub fn is_key_inside_bounds(&self, k: u64) -> bool {
        self.lower_key.is_none_or(|l| k >= l) && self.upper_key.is_none_or(|u| k < u)
    }

    #[must_use]
    pub fn try_get(&self, k: u64) -> Option<u64> {
        self.records.binary_search_by_key(&k, |(rk, _)| *rk).ok().map(|idx| self.records[idx].1)
    }

    /// Smallest record whose key is `>= k`, if any.
    #[must_use]
    pub fn get_or_get_next(&self, k: u64) -> Option<(u64, u64)> {
        let idx = self.records.partition_point(|(rk, _)| *rk < k);
        self.records.get(idx).copied()
    }

    #[must_use]
    pub fn first_record(&self) -> Option<(u64, u64)> {
        self.records.first().copied()
    }

    #[must_use]
    pub fn last_record(&self) -> Option<(u64, u64)> {
        self.records.last().copied()
    }

    /// Inserts or overwrites `(k, v)`. Returns `false` only when the node
    /// is at capacity *and* `k` is not already present — an overwrite of an
    /// existing key never fails, matching `spec.md` invariant 7 ("TryInsert
    /// returns false on full node only, not on duplicate").
    pub fn try_insert(&mut self, k: u64, v: u64, capacity: usize) -> bool {
        match self.records.binary_search_by_key(&k, |(rk, _)| *rk) {
            Ok(idx) => {
                self.records[idx].1 = v;
                true
            }
            Err(idx) => {
                if self.records.len() >= capacity {
                    return false;
                }
                self.records.insert(idx, (k, v));
                true
            }
        }
    }

    /// Splits at the median record, returning the new right sibling. The
    /// caller is responsible for wiring the right sibling's block index
    /// into both nodes' sibling pointers and bubbling the separator.
    #[must_use]
    pub fn split(&mut self) -> Self {
        let mid = self.records.len() / 2;
        let right_records = self.records.split_off(mid);
        let separator = right_records.first().map(|(k, _)| *k);

        Self {
            lower_key: separator,
            upper_key: self.upper_key,
            left_sibling: SENTINEL_BLOCK,
            right_sibling: self.right_sibling,
            records: right_records,
        }
    }

    /// Encodes the node, delegating each record's bytes to `encoding`
    /// (`spec.md` §4.D: "the node layer does not know the layout").
    pub fn encode(&self, encoding: &dyn Encoding) -> Result<Vec<u8>> {
        let mut cursor = Cursor::new();
        cursor.write_u8(LEVEL_LEAF)?;
        cursor.write_u16(u16::try_from(self.records.len()).map_err(|_| Error::NodeOverflow)?)?;
        write_bound(&mut cursor, self.lower_key)?;
        write_bound(&mut cursor, self.upper_key)?;
        cursor.write_u32(self.left_sibling)?;
        cursor.write_u32(self.right_sibling)?;
        for record in &self.records {
            encoding.encode_record(&mut cursor, *record)?;
        }
        Ok(cursor.into_vec())
    }

    pub fn decode(raw: &[u8], encoding: &dyn Encoding) -> Result<Self> {
        let mut cursor = Cursor::from_vec(raw.to_vec());
        let level = cursor.read_u8()?;
        if level != LEVEL_LEAF {
            return Err(Error::UnexpectedLevel { expected: LEVEL_LEAF, found: level });
        }
        let count = cursor.read_u16()? as usize;
        let lower_key = read_bound(&mut cursor)?;
        let upper_key = read_bound(&mut cursor)?;
        let left_sibling = cursor.read_u32()?;
        let right_sibling = cursor.read_u32()?;
        let mut records = Vec::with_capacity(count);
        for _ in 0..count {
            records.push(encoding.decode_record(&mut cursor)?);
        }
        Ok(Self { lower_key, upper_key, left_sibling, right_sibling, records })
    }
}

/// An internal node: `entries[i].0` is the exclusive upper bound of the key
/// range routed to `entries[i].1`; the final entry's bound is `u64::MAX`
/// (open-ended). `FindLeaf` binary-searches this list for the first entry
/// whose bound exceeds the sought key.
#[derive(Clone, Debug, Default)]
pub struct InternalNode {
    pub level: u8,
    pub entries: Vec<(u64, u32)>,
}

impl InternalNode {
    #[must_use]
    pub fn new(level: u8) -> Self {
        Self { level, entries: Vec::new() }
    }

    /// Routes `k` to a child block index.
    #[must_use]
    pub fn route(&self, k: u64) -> Option<u32> {
        let idx = self.entries.partition_point(|(bound, _)| *bound <= k);
        self.entries.get(idx).map(|(_, child)| *child)
    }

    pub fn try_insert(&mut self, separator: u64, child: u32, capacity: usize) -> bool {
        if self.entries.len() >= capacity {
            return false;
        }
        let idx = self.entries.partition_point(|(bound, _)| *bound <= separator);
        self.entries.insert(idx, (separator, child));
        true
    }

    #[must_use]
    pub fn split(&mut self) -> (u64, Self) {
        let mid = self.entries.len() / 2;
        let right_entries = self.entries.split_off(mid);
        let separator = right_entries.first().map_or(u64::MAX, |(bound, _)| *bound);
        (separator, Self { level: self.level, entries: right_entries })
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut cursor = Cursor::new();
        cursor.write_u8(self.level)?;
        cursor.write_u16(u16::try_from(self.entries.len()).map_err(|_| Error::NodeOverflow)?)?;
        for (separator, child) in &self.entries {
            cursor.write_u64(*separator)?;
            cursor.write_u32(*child)?;
        }
        Ok(cursor.into_vec())
    }

    pub fn decode(raw: &[u8]) -> Result<Self> {
        let mut cursor = Cursor::from_vec(raw.to_vec());
        let level = cursor.read_u8()?;
        if level == LEVEL_LEAF {
            return Err(Error::UnexpectedLevel { expected: 1, found: level });
        }
        let count = cursor.read_u16()? as usize;
        let mut entries = Vec::with_capacity(count);
        for _ in 0..count {
            let separator = cursor.read_u64()?;
            let child = cursor.read_u32()?;
            entries.push((separator, child));
        }
        Ok(Self { level, entries })
    }
}

fn write_bound(cursor: &mut Cursor, bound: Option<u64>) -> Result<()> {
    cursor.write_u8(u8::from(bound.is_some()))?;
    cursor.write_u64(bound.unwrap_or_default())?;
    Ok(())
}

fn read_bound(cursor: &mut Cursor) -> Result<Option<u64>> {
    let present = cursor.read_u8()? != 0;
    let value = cursor.read_u64()?;
    Ok(present.then_some(value))
}

/// Either node kind, dispatched by the `level` byte.
#[derive(Clone, Debug)]
pub enum Node {
    Leaf(LeafNode),
    Internal(InternalNode),
}

impl Node {
    pub fn encode(&self, encoding: &dyn Encoding) -> Result<Vec<u8>> {
        match self {
            Self::Leaf(leaf) => leaf.encode(encoding),
            Self::Internal(internal) => internal.encode(),
        }
    }

    pub fn decode(raw: &[u8], encoding: &dyn Encoding) -> Result<Self> {
        if raw.is_empty() {
            return Err(Error::UnexpectedLevel { expected: 0, found: 0 });
        }
        if raw[0] == LEVEL_LEAF {
            Ok(Self::Leaf(LeafNode::decode(raw, encoding)?))
        } else {
            Ok(Self::Internal(InternalNode::decode(raw)?))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn leaf_insert_keeps_sorted_order_and_overwrites_duplicates() {
        let mut leaf = LeafNode::empty();
        assert!(leaf.try_insert(5, 50, 4));
        assert!(leaf.try_insert(1, 10, 4));
        assert!(leaf.try_insert(3, 30, 4));
        assert!(leaf.try_insert(3, 33, 4)); // overwrite, doesn't grow count
        assert_eq!(leaf.records, vec![(1, 10), (3, 33), (5, 50)]);
    }

    #[test]
    fn leaf_try_insert_fails_only_when_full_and_key_absent() {
        let mut leaf = LeafNode::empty();
        assert!(leaf.try_insert(1, 1, 1));
        assert!(leaf.try_insert(1, 2, 1)); // overwrite still allowed at capacity
        assert!(!leaf.try_insert(2, 2, 1)); // new key at capacity: rejected
    }

    #[test]
    fn leaf_split_moves_upper_half() {
        let mut leaf = LeafNode::empty();
        for i in 0..10u64 {
            assert!(leaf.try_insert(i, i * 2, 10));
        }
        let right = leaf.split();
        assert_eq!(leaf.records.len(), 5);
        assert_eq!(right.records.len(), 5);
        assert!(leaf.records.last().unwrap().0 < right.records.first().unwrap().0);
    }

    #[test]
    fn leaf_round_trips_through_encode_decode() {
        let encoding = super::super::encoding::FixedSizeCombined;
        let mut leaf = LeafNode::empty();
        leaf.lower_key = Some(10);
        leaf.upper_key = Some(100);
        leaf.left_sibling = 2;
        leaf.right_sibling = 4;
        leaf.try_insert(20, 200, 10);
        leaf.try_insert(30, 300, 10);

        let encoded = leaf.encode(&encoding).expect("encode");
        let decoded = LeafNode::decode(&encoded, &encoding).expect("decode");
        assert_eq!(decoded.records, leaf.records);
        assert_eq!(decoded.lower_key, Some(10));
        assert_eq!(decoded.right_sibling, 4);
    }

    #[test]
    fn internal_route_finds_correct_child() {
        let mut internal = InternalNode::new(1);
        assert!(internal.try_insert(100, 1, 8));
        assert!(internal.try_insert(200, 2, 8));
        assert!(internal.try_insert(u64::MAX, 3, 8));

        assert_eq!(internal.route(50), Some(1));
        assert_eq!(internal.route(150), Some(2));
        assert_eq!(internal.route(250), Some(3));
    }
}
