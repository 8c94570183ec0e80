// Copyright (c) 2024-present, snapdb
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Wire-level seek/match filter payloads (`spec.md` §6.2 `Read` body,
//! §9 "replace reflection-based dispatch ... with a registry keyed by
//! GUID mapping to factory closures").

use super::{Error, Result};
use crate::engine::filters::{MatchFilter, RangeListSeek, SeekFilter, UnboundedSeek};
use crate::wire::io;
use std::io::Read;
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Every key from a starting point onward.
pub const SEEK_UNBOUNDED: Uuid = Uuid::from_u128(0xB8A1_7B9C_7A53_4F18_9C2D_5D4E_1E0A_0001);
/// A fixed, pre-sorted list of disjoint `[start, end)` ranges.
pub const SEEK_RANGE_LIST: Uuid = Uuid::from_u128(0xB8A1_7B9C_7A53_4F18_9C2D_5D4E_1E0A_0002);

/// `value ∈ [min, max)`.
pub const MATCH_VALUE_RANGE: Uuid = Uuid::from_u128(0xB8A1_7B9C_7A53_4F18_9C2D_5D4E_1E0B_0001);

/// Parses a seek-filter payload of `{guid, body}` into a concrete
/// [`SeekFilter`]. `Unknown` GUIDs surface as
/// [`Error::UnknownOrCorruptSeekFilter`] per `spec.md` §6.2.
pub fn read_seek_filter<'a>(r: &mut impl Read) -> Result<Box<dyn SeekFilter + 'a>> {
    let guid = io::read_guid(r)?;
    if guid == SEEK_UNBOUNDED {
        let start = io::read_varint64(r)?;
        Ok(Box::new(UnboundedSeek::from(start)))
    } else if guid == SEEK_RANGE_LIST {
        let count = io::read_varint32(r)? as usize;
        let mut ranges = Vec::with_capacity(count);
        for _ in 0..count {
            let start = io::read_varint64(r)?;
            let end = io::read_varint64(r)?;
            ranges.push((start, end));
        }
        Ok(Box::new(RangeListSeek::new(ranges)))
    } else {
        Err(Error::UnknownOrCorruptSeekFilter)
    }
}

/// Parses a match-filter payload the same way.
pub fn read_match_filter<'a>(r: &mut impl Read) -> Result<Box<dyn MatchFilter + 'a>> {
    let guid = io::read_guid(r)?;
    if guid == MATCH_VALUE_RANGE {
        let min = io::read_varint64(r)?;
        let max = io::read_varint64(r)?;
        Ok(Box::new(move |_key: u64, value: u64| value >= min && value < max))
    } else {
        Err(Error::UnknownOrCorruptMatchFilter)
    }
}

/// Per-`Read` options (`spec.md` §5 "Reads carry an optional deadline
/// from the `ReaderOptions`").
#[derive(Default)]
pub struct ReaderOptions {
    pub deadline: Option<Instant>,
}

pub fn read_reader_options(r: &mut impl Read) -> Result<ReaderOptions> {
    let has_deadline = io::read_bool(r)?;
    if !has_deadline {
        return Ok(ReaderOptions::default());
    }
    let deadline_ms = io::read_varint64(r)?;
    if deadline_ms > u64::from(u32::MAX) * 1000 {
        return Err(Error::UnknownOrCorruptReaderOptions);
    }
    Ok(ReaderOptions { deadline: Some(Instant::now() + Duration::from_millis(deadline_ms)) })
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn unbounded_seek_round_trips_through_the_registry() {
        let mut buf = Vec::new();
        io::write_guid(&mut buf, SEEK_UNBOUNDED).expect("write guid");
        io::write_varint64(&mut buf, 42).expect("write start");

        let mut cursor = &buf[..];
        let mut filter = read_seek_filter(&mut cursor).expect("parse seek filter");
        assert_eq!(filter.next_range(), Some((42, u64::MAX)));
    }

    #[test]
    fn unknown_seek_filter_guid_is_rejected() {
        let mut buf = Vec::new();
        io::write_guid(&mut buf, Uuid::from_u128(0xDEAD)).expect("write guid");
        let mut cursor = &buf[..];
        assert!(matches!(read_seek_filter(&mut cursor), Err(Error::UnknownOrCorruptSeekFilter)));
    }
}
