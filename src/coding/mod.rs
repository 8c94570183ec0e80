// Copyright (c) 2024-present, snapdb
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Binary I/O primitives: a little-endian addressable byte stream, a 7-bit
//! varint codec, and length-prefixed byte/string framing.
//!
//! This is component A of the engine: every byte that ever reaches disk or
//! the wire passes through a [`Cursor`] (buffer-backed) or a [`PointerView`]
//! (page-pool-backed) implementing the [`Stream`] trait.

mod cursor;
mod error;
mod pointer_view;
mod varint;

pub use cursor::Cursor;
pub use error::{Error, Result};
pub use pointer_view::PointerView;
pub use varint::{read_varint_u32, read_varint_u64, varint_len_u32, varint_len_u64, write_varint_u32, write_varint_u64};

use uuid::Uuid;

/// An addressable little-endian byte stream with bounded reads/writes.
///
/// Two concrete implementations exist: [`Cursor`], which owns a `Vec<u8>` or
/// wraps a borrowed slice, and [`PointerView`], which is backed by a page
/// pool buffer and carries a generation token so that a holder of a stale
/// view can detect invalidation after the pool grows or recycles pages (see
/// `pool::Generation`). Both variants expose the same bounded, positioned
/// API; code that only needs to move bytes around is written against this
/// trait rather than against either concrete type.
pub trait Stream {
    /// Current byte offset within the stream.
    fn position(&self) -> u64;

    /// Seeks to an absolute byte offset. Does not validate bounds itself;
    /// the next bounded read/write does.
    fn set_position(&mut self, position: u64);

    /// Total addressable length of the stream.
    fn len(&self) -> u64;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Reads exactly `buf.len()` bytes at the current position, advancing it.
    fn read_exact(&mut self, buf: &mut [u8]) -> Result<()>;

    /// Writes `buf` at the current position, advancing it. May extend the
    /// stream if the concrete implementation supports growth.
    fn write_all(&mut self, buf: &[u8]) -> Result<()>;

    fn read_u8(&mut self) -> Result<u8> {
        let mut b = [0u8; 1];
        self.read_exact(&mut b)?;
        Ok(b[0])
    }

    fn write_u8(&mut self, v: u8) -> Result<()> {
        self.write_all(&[v])
    }

    fn read_u16(&mut self) -> Result<u16> {
        let mut b = [0u8; 2];
        self.read_exact(&mut b)?;
        Ok(u16::from_le_bytes(b))
    }

    fn write_u16(&mut self, v: u16) -> Result<()> {
        self.write_all(&v.to_le_bytes())
    }

    fn read_i16(&mut self) -> Result<i16> {
        Ok(self.read_u16()? as i16)
    }

    fn write_i16(&mut self, v: i16) -> Result<()> {
        self.write_u16(v as u16)
    }

    fn read_u24(&mut self) -> Result<u32> {
        let mut b = [0u8; 4];
        self.read_exact(&mut b[..3])?;
        Ok(u32::from_le_bytes(b))
    }

    fn write_u24(&mut self, v: u32) -> Result<()> {
        debug_assert!(v <= 0x00FF_FFFF, "u24 overflow");
        self.write_all(&v.to_le_bytes()[..3])
    }

    fn read_u32(&mut self) -> Result<u32> {
        let mut b = [0u8; 4];
        self.read_exact(&mut b)?;
        Ok(u32::from_le_bytes(b))
    }

    fn write_u32(&mut self, v: u32) -> Result<()> {
        self.write_all(&v.to_le_bytes())
    }

    fn read_i32(&mut self) -> Result<i32> {
        Ok(self.read_u32()? as i32)
    }

    fn write_i32(&mut self, v: i32) -> Result<()> {
        self.write_u32(v as u32)
    }

    fn read_u40(&mut self) -> Result<u64> {
        let mut b = [0u8; 8];
        self.read_exact(&mut b[..5])?;
        Ok(u64::from_le_bytes(b))
    }

    fn write_u40(&mut self, v: u64) -> Result<()> {
        debug_assert!(v <= 0x00FF_FFFF_FFFF, "u40 overflow");
        self.write_all(&v.to_le_bytes()[..5])
    }

    fn read_u48(&mut self) -> Result<u64> {
        let mut b = [0u8; 8];
        self.read_exact(&mut b[..6])?;
        Ok(u64::from_le_bytes(b))
    }

    fn write_u48(&mut self, v: u64) -> Result<()> {
        debug_assert!(v <= 0x0000_FFFF_FFFF_FFFF, "u48 overflow");
        self.write_all(&v.to_le_bytes()[..6])
    }

    fn read_u56(&mut self) -> Result<u64> {
        let mut b = [0u8; 8];
        self.read_exact(&mut b[..7])?;
        Ok(u64::from_le_bytes(b))
    }

    fn write_u56(&mut self, v: u64) -> Result<()> {
        debug_assert!(v <= 0x00FF_FFFF_FFFF_FFFF, "u56 overflow");
        self.write_all(&v.to_le_bytes()[..7])
    }

    fn read_u64(&mut self) -> Result<u64> {
        let mut b = [0u8; 8];
        self.read_exact(&mut b)?;
        Ok(u64::from_le_bytes(b))
    }

    fn write_u64(&mut self, v: u64) -> Result<()> {
        self.write_all(&v.to_le_bytes())
    }

    fn read_i64(&mut self) -> Result<i64> {
        Ok(self.read_u64()? as i64)
    }

    fn write_i64(&mut self, v: i64) -> Result<()> {
        self.write_u64(v as u64)
    }

    fn read_f32(&mut self) -> Result<f32> {
        Ok(f32::from_bits(self.read_u32()?))
    }

    fn write_f32(&mut self, v: f32) -> Result<()> {
        self.write_u32(v.to_bits())
    }

    fn read_f64(&mut self) -> Result<f64> {
        Ok(f64::from_bits(self.read_u64()?))
    }

    fn write_f64(&mut self, v: f64) -> Result<()> {
        self.write_u64(v.to_bits())
    }

    /// A .NET-style "ticks since 0001-01-01" timestamp, stored as i64.
    fn read_datetime_ticks(&mut self) -> Result<i64> {
        self.read_i64()
    }

    fn write_datetime_ticks(&mut self, ticks: i64) -> Result<()> {
        self.write_i64(ticks)
    }

    /// A base-10, 96-bit-mantissa decimal, stored as (lo, mid, hi, flags) u32s.
    fn read_decimal(&mut self) -> Result<(u32, u32, u32, u32)> {
        Ok((self.read_u32()?, self.read_u32()?, self.read_u32()?, self.read_u32()?))
    }

    fn write_decimal(&mut self, parts: (u32, u32, u32, u32)) -> Result<()> {
        self.write_u32(parts.0)?;
        self.write_u32(parts.1)?;
        self.write_u32(parts.2)?;
        self.write_u32(parts.3)
    }

    fn read_guid(&mut self) -> Result<Uuid> {
        let mut b = [0u8; 16];
        self.read_exact(&mut b)?;
        Ok(Uuid::from_bytes(b))
    }

    fn write_guid(&mut self, guid: Uuid) -> Result<()> {
        self.write_all(guid.as_bytes())
    }

    /// Writes an unsigned varint (1-5 bytes for values that fit in u32).
    fn write_varint_u32(&mut self, v: u32) -> Result<()> {
        let mut buf = [0u8; 5];
        let n = varint::write_varint_u32(v, &mut buf);
        self.write_all(&buf[..n])
    }

    fn read_varint_u32(&mut self) -> Result<u32> {
        varint::read_varint_u32(|| self.read_u8())
    }

    /// Writes an unsigned varint (1-9 bytes for u64).
    fn write_varint_u64(&mut self, v: u64) -> Result<()> {
        let mut buf = [0u8; 9];
        let n = varint::write_varint_u64(v, &mut buf);
        self.write_all(&buf[..n])
    }

    fn read_varint_u64(&mut self) -> Result<u64> {
        varint::read_varint_u64(|| self.read_u8())
    }

    /// Writes a varint-length-prefixed byte array.
    fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        self.write_varint_u32(bytes.len() as u32)?;
        self.write_all(bytes)
    }

    /// Reads a varint-length-prefixed byte array, rejecting declared
    /// lengths that are negative (impossible in an unsigned encoding, but
    /// a too-large varint decodes to a value that would overflow `i32`,
    /// which is the wire-level analogue) or that exceed `max_length`,
    /// without consuming more than the length prefix on failure.
    fn try_read_bytes(&mut self, max_length: usize) -> Result<Vec<u8>> {
        let declared = self.read_varint_u32()? as usize;
        if declared > max_length {
            return Err(Error::Malformed("declared byte length exceeds bound"));
        }
        let mut buf = vec![0u8; declared];
        self.read_exact(&mut buf)?;
        Ok(buf)
    }

    /// Writes a UTF-8 string with varint-length-prefixed byte framing.
    fn write_string(&mut self, s: &str) -> Result<()> {
        self.write_bytes(s.as_bytes())
    }

    /// Reads a UTF-8 string, bounding the byte read to `6 * max_codepoints`
    /// (the worst case for UTF-8 is 4 bytes/codepoint; 6x leaves headroom
    /// for encodings that pad, matching the historical contract this
    /// primitive is grounded on) and verifying the decoded length.
    fn try_read_string(&mut self, max_codepoints: usize) -> Result<String> {
        let max_bytes = max_codepoints.saturating_mul(6);
        let bytes = self.try_read_bytes(max_bytes)?;
        let s = String::from_utf8(bytes).map_err(|_| Error::Malformed("invalid utf-8"))?;
        if s.chars().count() > max_codepoints {
            return Err(Error::Malformed("decoded string exceeds codepoint bound"));
        }
        Ok(s)
    }

    /// Copies `length` bytes from `source_position` to the stream's current
    /// position, within the same stream. Safe for overlapping ranges;
    /// preserves the stream's position afterwards.
    fn copy_within(&mut self, source_position: u64, dest_position: u64, length: u64) -> Result<()>;

    /// Shifts the region `[position, len())` right by `count` bytes,
    /// creating `count` bytes of uninitialized space at `position`.
    /// Position is preserved.
    fn insert_bytes(&mut self, position: u64, count: u64) -> Result<()>;

    /// Shifts the region `[position + count, len())` left by `count`
    /// bytes, removing the `count` bytes at `position`. Position is
    /// preserved.
    fn remove_bytes(&mut self, position: u64, count: u64) -> Result<()>;
}
