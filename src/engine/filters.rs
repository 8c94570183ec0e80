// Copyright (c) 2024-present, snapdb
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Predicate pushdown for the merging reader (`spec.md` §4.F): seek
//! filters restrict which key ranges are visited at all, match filters
//! gate individual decoded records, and access-control predicates let the
//! server deny either without turning the denial into an error.

/// A lazy, finite, non-restartable sequence of disjoint ascending
/// `[start, end)` ranges. `end == u64::MAX` means open-ended.
pub trait SeekFilter: Send {
    /// Returns the next range to visit, or `None` once the filter is
    /// exhausted. Ranges must be yielded in ascending, non-overlapping
    /// order; the merging reader does not re-sort them.
    fn next_range(&mut self) -> Option<(u64, u64)>;
}

/// Visits every key from `start` (inclusive) onward.
pub struct UnboundedSeek {
    start: u64,
    done: bool,
}

impl UnboundedSeek {
    #[must_use]
    pub fn from(start: u64) -> Self {
        Self { start, done: false }
    }
}

impl SeekFilter for UnboundedSeek {
    fn next_range(&mut self) -> Option<(u64, u64)> {
        if self.done {
            return None;
        }
        self.done = true;
        Some((self.start, u64::MAX))
    }
}

/// Visits a fixed, pre-sorted list of disjoint ranges in order.
pub struct RangeListSeek {
    ranges: std::vec::IntoIter<(u64, u64)>,
}

impl RangeListSeek {
    #[must_use]
    pub fn new(ranges: Vec<(u64, u64)>) -> Self {
        Self { ranges: ranges.into_iter() }
    }
}

impl SeekFilter for RangeListSeek {
    fn next_range(&mut self) -> Option<(u64, u64)> {
        self.ranges.next()
    }
}

/// A per-`(key, value)` predicate evaluated after decoding; non-matching
/// records are skipped rather than surfaced.
pub trait MatchFilter: Send {
    fn matches(&self, key: u64, value: u64) -> bool;
}

impl<F: Fn(u64, u64) -> bool + Send> MatchFilter for F {
    fn matches(&self, key: u64, value: u64) -> bool {
        self(key, value)
    }
}

/// The server's three optional access-control hooks (`spec.md` §4.F). A
/// denied record is skipped, not an error, except a denied seek range,
/// which is dropped entirely rather than attempted record-by-record.
pub trait AccessControl: Send + Sync {
    fn user_can_seek(&self, user: &str, key: u64, position: u64) -> bool;
    fn user_can_match(&self, user: &str, key: u64, value: u64) -> bool;
    fn user_can_write(&self, user: &str, key: u64, value: u64) -> bool;
}

/// The default policy: every operation is allowed. Mirrors the
/// configuration surface's `default_user_can_{read,write,is_admin}` keys
/// short-circuiting to permissive when the server sets no finer-grained
/// predicates.
pub struct AllowAll;

impl AccessControl for AllowAll {
    fn user_can_seek(&self, _user: &str, _key: u64, _position: u64) -> bool {
        true
    }

    fn user_can_match(&self, _user: &str, _key: u64, _value: u64) -> bool {
        true
    }

    fn user_can_write(&self, _user: &str, _key: u64, _value: u64) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn range_list_seek_yields_ranges_in_order() {
        let mut seek = RangeListSeek::new(vec![(1000, 2000), (3000, 3500)]);
        assert_eq!(seek.next_range(), Some((1000, 2000)));
        assert_eq!(seek.next_range(), Some((3000, 3500)));
        assert_eq!(seek.next_range(), None);
    }

    #[test]
    fn closure_match_filter_is_usable_as_trait_object() {
        let filter: Box<dyn MatchFilter> = Box::new(|_k: u64, v: u64| v % 2 == 0);
        assert!(filter.matches(1, 4));
        assert!(!filter.matches(1, 5));
    }
}
