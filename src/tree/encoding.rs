// Copyright (c) 2024-present, snapdb
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! The pluggable node-record encoding (`spec.md` §4.D "Encoding plug-in").
//!
//! The node layer never assumes a record's byte shape: [`LeafNode`](super::node::LeafNode)
//! and [`SortedTree`](super::sorted_tree::SortedTree) hold an [`Encoding`]
//! trait object resolved once, at `create`/`open` time, from the `encoding`
//! GUID stored alongside the sub-file's `key_type`/`value_type`.

use super::{Error, Result};
use crate::coding::Stream;
use uuid::Uuid;

/// The trivial encoding: an 8-byte key immediately followed by an 8-byte
/// value, 16 bytes per record. Currently the only built-in implementation.
pub const FIXED_SIZE_COMBINED: Uuid = Uuid::from_u128(0xB8A1_7B9C_7A53_4F18_9C2D_5D4E_1E0C_0001);

/// Encodes and decodes one node record at a time. The node layer is built
/// against this trait and never reads or writes a record's bytes directly.
pub trait Encoding: Send + Sync {
    fn encode_record(&self, out: &mut dyn Stream, record: (u64, u64)) -> Result<()>;
    fn decode_record(&self, input: &mut dyn Stream) -> Result<(u64, u64)>;

    /// Upper bound on one encoded record's byte length, used to size a
    /// leaf's record capacity for a given block.
    fn maximum_record_size(&self) -> usize;
}

/// `(u64, u64)` records stored key-then-value with no further packing.
#[derive(Debug, Default)]
pub struct FixedSizeCombined;

impl Encoding for FixedSizeCombined {
    fn encode_record(&self, out: &mut dyn Stream, record: (u64, u64)) -> Result<()> {
        out.write_u64(record.0)?;
        out.write_u64(record.1)?;
        Ok(())
    }

    fn decode_record(&self, input: &mut dyn Stream) -> Result<(u64, u64)> {
        let key = input.read_u64()?;
        let value = input.read_u64()?;
        Ok((key, value))
    }

    fn maximum_record_size(&self) -> usize {
        16
    }
}

/// Resolves an `encoding` GUID (as stored in a sub-file's table entry) to
/// its implementation.
pub fn resolve(guid: Uuid) -> Result<Box<dyn Encoding>> {
    if guid == FIXED_SIZE_COMBINED {
        Ok(Box::new(FixedSizeCombined))
    } else {
        Err(Error::UnknownEncoding(guid))
    }
}
