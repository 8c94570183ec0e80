// Copyright (c) 2024-present, snapdb
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! 7-bit varint codec (unsigned LEB128: little-endian base-128, continuation
//! bit in the MSB of each byte). Encoding is delegated to the `varint-rs`
//! crate; this module adds the exact byte-length accounting and bounded,
//! EOF-is-malformed decoding that `spec.md` §4.A and §8 (S1) require.

use super::error::{Error, Result};
use varint_rs::{VarintReader, VarintWriter};

/// Number of bytes `encode(value)` would occupy for a 32-bit varint.
#[must_use]
pub fn varint_len_u32(mut value: u32) -> usize {
    let mut len = 1;
    while value >= 0x80 {
        value >>= 7;
        len += 1;
    }
    len
}

/// Number of bytes `encode(value)` would occupy for a 64-bit varint.
#[must_use]
pub fn varint_len_u64(mut value: u64) -> usize {
    let mut len = 1;
    while value >= 0x80 {
        value >>= 7;
        len += 1;
    }
    len
}

/// Encodes `value` into `buf` (at least 5 bytes), returning the byte count.
pub fn write_varint_u32(value: u32, buf: &mut [u8; 5]) -> usize {
    let mut cursor = &mut buf[..];
    VarintWriter::write_u32_varint(&mut cursor, value).expect("writing to a fixed buffer cannot fail");
    varint_len_u32(value)
}

/// Encodes `value` into `buf` (at least 9 bytes), returning the byte count.
pub fn write_varint_u64(value: u64, buf: &mut [u8; 9]) -> usize {
    let mut cursor = &mut buf[..];
    VarintWriter::write_u64_varint(&mut cursor, value).expect("writing to a fixed buffer cannot fail");
    varint_len_u64(value)
}

/// Adapter that lets the byte-oriented `varint-rs` reader pull from a
/// closure, so callers that already hold a [`super::Stream`] (rather than a
/// `std::io::Read`) can still use the crate's decode loop. Reaching the end
/// of the underlying stream surfaces as `std::io::ErrorKind::UnexpectedEof`,
/// which is exactly the "malformed by input exhaustion" signal §4.A asks
/// for.
pub struct ByteFeed<'a, F: FnMut() -> Result<u8> + 'a> {
    next: F,
    _marker: std::marker::PhantomData<&'a ()>,
}

impl<'a, F: FnMut() -> Result<u8> + 'a> ByteFeed<'a, F> {
    pub fn new(next: F) -> Self {
        Self { next, _marker: std::marker::PhantomData }
    }
}

impl<'a, F: FnMut() -> Result<u8> + 'a> std::io::Read for ByteFeed<'a, F> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        match (self.next)() {
            Ok(b) => {
                buf[0] = b;
                Ok(1)
            }
            Err(_) => Ok(0),
        }
    }
}

/// Decodes a 32-bit varint by pulling bytes from `next`. Returns
/// `Err(Error::Malformed)` if the sequence does not terminate within 5
/// bytes (input exhaustion or a byte stream that never clears the
/// continuation bit).
pub fn read_varint_u32<F: FnMut() -> Result<u8>>(next: F) -> Result<u32> {
    let mut feed = ByteFeed::new(next);
    feed.read_u32_varint().map_err(|_| Error::Malformed("varint u32 did not terminate"))
}

/// Decodes a 64-bit varint by pulling bytes from `next`.
pub fn read_varint_u64<F: FnMut() -> Result<u8>>(next: F) -> Result<u64> {
    let mut feed = ByteFeed::new(next);
    feed.read_u64_varint().map_err(|_| Error::Malformed("varint u64 did not terminate"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    fn roundtrip_u32(value: u32) -> usize {
        let mut buf = [0u8; 5];
        let len = write_varint_u32(value, &mut buf);
        let mut idx = 0;
        let decoded = read_varint_u32(|| {
            let b = buf[idx];
            idx += 1;
            Ok(b)
        })
        .expect("decode");
        assert_eq!(decoded, value);
        len
    }

    fn roundtrip_u64(value: u64) -> usize {
        let mut buf = [0u8; 9];
        let len = write_varint_u64(value, &mut buf);
        let mut idx = 0;
        let decoded = read_varint_u64(|| {
            let b = buf[idx];
            idx += 1;
            Ok(b)
        })
        .expect("decode");
        assert_eq!(decoded, value);
        len
    }

    #[test]
    fn varint_boundaries_s1() {
        let cases: [(u32, usize); 8] = [
            (0, 1),
            (127, 1),
            (128, 2),
            (16383, 2),
            (16384, 3),
            (2_097_151, 3),
            (2_097_152, 4),
            (u32::MAX, 5),
        ];

        for (value, expected_len) in cases {
            let len = roundtrip_u32(value);
            assert_eq!(len, expected_len, "value {value} expected {expected_len} bytes, got {len}");
        }
    }

    #[test]
    fn varint_u64_round_trip_full_range() {
        for value in [0u64, 1, 127, 128, u32::MAX as u64, u64::MAX, u64::MAX - 1] {
            assert_eq!(varint_len_u64(value), roundtrip_u64(value));
        }
    }

    #[test]
    fn malformed_varint_detected_by_exhaustion() {
        // Every byte carries the continuation bit: never terminates.
        let buf = [0x80u8; 10];
        let mut idx = 0;
        let result = read_varint_u32(|| {
            if idx >= buf.len() {
                return Err(Error::Malformed("exhausted"));
            }
            let b = buf[idx];
            idx += 1;
            Ok(b)
        });
        assert!(result.is_err());
    }
}
