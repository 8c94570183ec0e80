// Copyright (c) 2024-present, snapdb
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Streamed encoding of point sequences (`spec.md` §4.G): the fixed-size
//! encoder emits `key_bytes || value_bytes` per record and a single
//! terminator byte. This crate's archive layer is fixed at `(u64, u64)`
//! records, so the encoder/decoder pair below is the concrete
//! `FixedSizeCombined` instance rather than a generic plug-in point — the
//! pluggable-encoding seam lives at the tree layer (`crate::tree`), not
//! here.

use super::io;
use super::Result;
use std::io::{Read, Write};

/// Marks the end of a point stream. `0xFF` as the first byte of what
/// would otherwise be a key byte is unambiguous here because keys are
/// always exactly 16 bytes (`u64` key + `u64` value); a genuine record
/// never starts with a lone terminator byte followed by nothing.
const TERMINATOR: u8 = 0xFF;
const CONTINUE: u8 = 0x00;

/// Encodes `(u64, u64)` points onto a byte sink, one `reset_encoder`
/// call per logical stream.
#[derive(Default)]
pub struct PointEncoder;

impl PointEncoder {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Resets any per-stream state. The fixed-size encoding is
    /// stateless, so this is a no-op kept for symmetry with encodings
    /// that carry delta/prefix-compression state across records.
    pub fn reset_encoder(&mut self) {}

    pub fn encode(&mut self, out: &mut impl Write, key: u64, value: u64) -> Result<()> {
        io::write_u8(out, CONTINUE)?;
        io::write_u64(out, key)?;
        io::write_u64(out, value)?;
        Ok(())
    }

    pub fn write_end_of_stream(&mut self, out: &mut impl Write) -> Result<()> {
        io::write_u8(out, TERMINATOR)
    }
}

/// The decoded outcome of one `try_decode` call.
pub enum Decoded {
    Record(u64, u64),
    EndOfStream,
}

/// Decodes a stream of `(u64, u64)` points framed by [`PointEncoder`].
#[derive(Default)]
pub struct PointDecoder;

impl PointDecoder {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    pub fn reset(&mut self) {}

    pub fn try_decode(&mut self, input: &mut impl Read) -> Result<Decoded> {
        let marker = io::read_u8(input)?;
        if marker == TERMINATOR {
            return Ok(Decoded::EndOfStream);
        }
        let key = io::read_u64(input)?;
        let value = io::read_u64(input)?;
        Ok(Decoded::Record(key, value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn encode_decode_round_trip_with_terminator() {
        let mut buf = Vec::new();
        let mut encoder = PointEncoder::new();
        encoder.encode(&mut buf, 1, 10).expect("encode");
        encoder.encode(&mut buf, 2, 20).expect("encode");
        encoder.write_end_of_stream(&mut buf).expect("eos");

        let mut cursor = &buf[..];
        let mut decoder = PointDecoder::new();

        match decoder.try_decode(&mut cursor).expect("decode") {
            Decoded::Record(k, v) => assert_eq!((k, v), (1, 10)),
            Decoded::EndOfStream => panic!("expected a record"),
        }
        match decoder.try_decode(&mut cursor).expect("decode") {
            Decoded::Record(k, v) => assert_eq!((k, v), (2, 20)),
            Decoded::EndOfStream => panic!("expected a record"),
        }
        match decoder.try_decode(&mut cursor).expect("decode") {
            Decoded::Record(..) => panic!("expected end of stream"),
            Decoded::EndOfStream => {}
        }
    }
}
