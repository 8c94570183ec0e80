// Copyright (c) 2024-present, snapdb
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Integration coverage for the varint codec's public surface (`spec.md`
//! §4.A, §8 S1): length accounting and malformed-input detection, driven
//! entirely through `snapdb::coding::varint` rather than its own
//! `#[cfg(test)]` module.

use snapdb::coding::varint::{read_varint_u32, varint_len_u32, write_varint_u32};

#[test]
fn varint_round_trips_across_every_length_boundary() {
    for value in [0u32, 1, 127, 128, 16_383, 16_384, 2_097_151, 2_097_152, u32::MAX] {
        let mut buf = [0u8; 5];
        let len = write_varint_u32(value, &mut buf);
        assert_eq!(len, varint_len_u32(value));

        let mut idx = 0;
        let decoded = read_varint_u32(|| {
            let b = buf[idx];
            idx += 1;
            Ok(b)
        })
        .expect("decode");
        assert_eq!(decoded, value);
    }
}

#[test]
fn a_continuation_bit_that_never_clears_is_malformed() {
    use snapdb::coding::Error;

    let buf = [0x80u8; 10];
    let mut idx = 0;
    let result = read_varint_u32(|| {
        let b = *buf.get(idx).ok_or(Error::Malformed("exhausted"))?;
        idx += 1;
        Ok(b)
    });
    assert!(result.is_err());
}
