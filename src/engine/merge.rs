// Copyright (c) 2024-present, snapdb
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! The multi-archive merging reader (`spec.md` §4.F): a heap-ordered
//! k-way merge across per-archive scanners, each pre-seeked by the
//! caller's seek filter, with duplicate keys across sources resolved by
//! "latest archive wins" (`spec.md` §8, testable property 5).
//!
//! Grounded directly on the teacher's `merge::Merger`, which drives an
//! `interval_heap::IntervalHeap` of `(source_index, value)` pairs ordered
//! by key and repeatedly pops the minimum. This merge additionally
//! dedupes equal keys across sources (the teacher's merger does not need
//! to, since its sources are already globally ordered by recency via the
//! LSM level order) and applies seek/match/access-control pushdown.

use super::filters::{AccessControl, MatchFilter, SeekFilter, UnboundedSeek};
use super::{Error, Result};
use crate::tree::Scanner;
use interval_heap::IntervalHeap;

/// One merge input: a scanner plus its recency rank. Higher rank wins
/// ties on duplicate keys (e.g. the in-memory buffer outranks every
/// on-disk archive, and later-attached archives outrank earlier ones).
struct Source<'a> {
    scanner: Scanner<'a>,
    rank: u32,
    pending: Option<(u64, u64)>,
}

impl<'a> Source<'a> {
    fn new(mut scanner: Scanner<'a>, rank: u32) -> Result<Self> {
        let pending = scanner.read().map_err(Error::Tree)?;
        Ok(Self { scanner, rank, pending })
    }

    fn advance(&mut self) -> Result<()> {
        self.pending = self.scanner.read().map_err(Error::Tree)?;
        Ok(())
    }
}

#[derive(Clone, Copy, Eq, PartialEq)]
struct HeapItem {
    key: u64,
    source_idx: usize,
}

impl Ord for HeapItem {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.key.cmp(&other.key)
    }
}

impl PartialOrd for HeapItem {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

/// Merges scanners from several archives (and, for the newest generation
/// of data, the in-memory buffer) into one globally key-ordered stream.
pub struct MergingReader<'a> {
    sources: Vec<Source<'a>>,
    heap: IntervalHeap<HeapItem>,
    seek: Box<dyn SeekFilter + 'a>,
    current_range: Option<(u64, u64)>,
    matcher: Option<Box<dyn MatchFilter + 'a>>,
    user: Option<String>,
    access: Option<&'a dyn AccessControl>,
    peeked: Option<Option<(u64, u64)>>,
}

impl<'a> MergingReader<'a> {
    /// Builds a reader over `scanners`, listed oldest-first: the
    /// in-memory buffer (if materialized as a scanner-shaped source by
    /// the caller) should be passed last so it naturally outranks every
    /// on-disk archive on duplicate keys.
    pub fn new(
        scanners: Vec<Scanner<'a>>,
        seek: Option<Box<dyn SeekFilter + 'a>>,
        matcher: Option<Box<dyn MatchFilter + 'a>>,
        user: Option<String>,
        access: Option<&'a dyn AccessControl>,
    ) -> Result<Self> {
        let mut sources = Vec::with_capacity(scanners.len());
        for (rank, scanner) in scanners.into_iter().enumerate() {
            sources.push(Source::new(scanner, rank as u32)?);
        }
        let seek: Box<dyn SeekFilter + 'a> = seek.unwrap_or_else(|| Box::new(UnboundedSeek::from(0)));
        let mut reader = Self { sources, heap: IntervalHeap::with_capacity(0), seek, current_range: None, matcher, user, access, peeked: None };
        reader.advance_to_next_range()?;
        Ok(reader)
    }

    /// Returns the next record without consuming it; a second call
    /// without an intervening [`Self::next`] returns the same value.
    /// Lets a caller merge this reader against another already-sorted
    /// sequence (e.g. the in-memory write buffer) without an extra
    /// `IntervalHeap` source.
    pub fn peek(&mut self) -> Result<Option<(u64, u64)>> {
        if self.peeked.is_none() {
            self.peeked = Some(self.advance()?);
        }
        Ok(self.peeked.clone().expect("just set"))
    }

    fn advance_to_next_range(&mut self) -> Result<bool> {
        loop {
            let Some((start, end)) = self.seek.next_range() else {
                self.current_range = None;
                return Ok(false);
            };

            if let Some(access) = self.access {
                let user = self.user.as_deref().unwrap_or("");
                if !access.user_can_seek(user, start, start) {
                    continue;
                }
            }

            self.current_range = Some((start, end));
            self.rebuild_heap(start)?;
            return Ok(true);
        }
    }

    fn rebuild_heap(&mut self, seek_start: u64) -> Result<()> {
        self.heap = IntervalHeap::with_capacity(self.sources.len());
        for (idx, source) in self.sources.iter_mut().enumerate() {
            while matches!(source.pending, Some((k, _)) if k < seek_start) {
                source.advance()?;
            }
            if let Some((key, _)) = source.pending {
                self.heap.push(HeapItem { key, source_idx: idx });
            }
        }
        Ok(())
    }

    /// Returns the next globally ordered `(key, value)` record passing
    /// every filter, or `None` once every source and every seek range is
    /// exhausted.
    pub fn next(&mut self) -> Result<Option<(u64, u64)>> {
        if let Some(value) = self.peeked.take() {
            return Ok(value);
        }
        self.advance()
    }

    fn advance(&mut self) -> Result<Option<(u64, u64)>> {
        loop {
            let Some((_, end)) = self.current_range else {
                return Ok(None);
            };

            let Some(top) = self.heap.pop_min() else {
                if !self.advance_to_next_range()? {
                    return Ok(None);
                }
                continue;
            };

            if top.key >= end {
                // out of this range; this source's record belongs to a future range,
                // and rebuild_heap will re-seek every source to the next range's start
                if !self.advance_to_next_range()? {
                    return Ok(None);
                }
                continue;
            }

            let mut winner = top;
            while let Some(peeked) = self.heap.peek_min() {
                if peeked.key != winner.key {
                    break;
                }
                let dup = self.heap.pop_min().expect("peeked min must pop");
                let (loser, keep) = if self.sources[dup.source_idx].rank > self.sources[winner.source_idx].rank {
                    (winner, dup)
                } else {
                    (dup, winner)
                };
                winner = keep;
                self.sources[loser.source_idx].advance()?;
                if let Some((key, _)) = self.sources[loser.source_idx].pending {
                    self.heap.push(HeapItem { key, source_idx: loser.source_idx });
                }
            }

            let value = self.sources[winner.source_idx].pending.expect("winner has a pending record").1;
            self.sources[winner.source_idx].advance()?;
            if let Some((key, _)) = self.sources[winner.source_idx].pending {
                self.heap.push(HeapItem { key, source_idx: winner.source_idx });
            }

            if let Some(access) = self.access {
                let user = self.user.as_deref().unwrap_or("");
                if !access.user_can_match(user, winner.key, value) {
                    continue;
                }
            }
            if let Some(matcher) = &self.matcher {
                if !matcher.matches(winner.key, value) {
                    continue;
                }
            }

            return Ok(Some((winner.key, value)));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::ArchiveTable;
    use crate::engine::filters::RangeListSeek;
    use test_log::test;
    use uuid::Uuid;

    fn archive_with(dir: &std::path::Path, name: &str, pairs: &[(u64, u64)]) -> ArchiveTable {
        let path = dir.join(name);
        let mut table = ArchiveTable::create(&path, 512, Uuid::from_u128(1), Uuid::from_u128(2), crate::tree::FIXED_SIZE_COMBINED).expect("create");
        let mut edit = table.edit();
        for (k, v) in pairs {
            edit.insert(*k, *v).expect("insert");
        }
        edit.commit().expect("commit");
        table
    }

    #[test]
    fn merges_two_archives_in_ascending_key_order() {
        let dir = tempfile::tempdir().expect("tempdir");
        let a = archive_with(dir.path(), "a.snapdb", &[(1, 10), (3, 30), (5, 50)]);
        let b = archive_with(dir.path(), "b.snapdb", &[(2, 20), (4, 40)]);

        let snap_a = a.read_snapshot();
        let snap_b = b.read_snapshot();
        let scanners = vec![snap_a.scanner().expect("scanner a"), snap_b.scanner().expect("scanner b")];

        let mut reader = MergingReader::new(scanners, None, None, None, None).expect("reader");
        let mut out = Vec::new();
        while let Some(record) = reader.next().expect("next") {
            out.push(record);
        }
        assert_eq!(out, vec![(1, 10), (2, 20), (3, 30), (4, 40), (5, 50)]);
    }

    #[test]
    fn later_source_wins_on_duplicate_keys() {
        let dir = tempfile::tempdir().expect("tempdir");
        let a = archive_with(dir.path(), "a.snapdb", &[(1, 100)]);
        let b = archive_with(dir.path(), "b.snapdb", &[(1, 999)]);

        let snap_a = a.read_snapshot();
        let snap_b = b.read_snapshot();
        let scanners = vec![snap_a.scanner().expect("scanner a"), snap_b.scanner().expect("scanner b")];

        let mut reader = MergingReader::new(scanners, None, None, None, None).expect("reader");
        assert_eq!(reader.next().expect("next"), Some((1, 999)));
        assert_eq!(reader.next().expect("next"), None);
    }

    #[test]
    fn seek_filter_skips_gaps_between_ranges() {
        let dir = tempfile::tempdir().expect("tempdir");
        let pairs: Vec<(u64, u64)> = (0u64..100).map(|i| (i, i)).collect();
        let a = archive_with(dir.path(), "a.snapdb", &pairs);

        let snap_a = a.read_snapshot();
        let scanners = vec![snap_a.scanner().expect("scanner")];
        let seek = Box::new(RangeListSeek::new(vec![(10, 12), (50, 52)]));

        let mut reader = MergingReader::new(scanners, Some(seek), None, None, None).expect("reader");
        let mut out = Vec::new();
        while let Some(record) = reader.next().expect("next") {
            out.push(record);
        }
        assert_eq!(out, vec![(10, 10), (11, 11), (50, 50), (51, 51)]);
    }
}
