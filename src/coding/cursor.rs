// Copyright (c) 2024-present, snapdb
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use super::{Error, Result, Stream};

/// A growable, owned byte buffer implementing [`Stream`].
///
/// This is the buffer-backed half of the stream hierarchy called for in
/// `spec.md` §9 ("express as a trait/interface with two concrete
/// variants"); the other half is [`super::PointerView`], backed by a page
/// pool.
#[derive(Clone, Debug, Default)]
pub struct Cursor {
    buf: Vec<u8>,
    position: u64,
}

impl Cursor {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn from_vec(buf: Vec<u8>) -> Self {
        Self { buf, position: 0 }
    }

    #[must_use]
    pub fn into_vec(self) -> Vec<u8> {
        self.buf
    }

    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    fn ensure_capacity(&mut self, end: u64) {
        if end > self.buf.len() as u64 {
            self.buf.resize(end as usize, 0);
        }
    }
}

impl Stream for Cursor {
    fn position(&self) -> u64 {
        self.position
    }

    fn set_position(&mut self, position: u64) {
        self.position = position;
    }

    fn len(&self) -> u64 {
        self.buf.len() as u64
    }

    fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        let start = self.position as usize;
        let end = start + buf.len();
        if end > self.buf.len() {
            return Err(Error::OutOfRange);
        }
        buf.copy_from_slice(&self.buf[start..end]);
        self.position = end as u64;
        Ok(())
    }

    fn write_all(&mut self, buf: &[u8]) -> Result<()> {
        let start = self.position;
        let end = start + buf.len() as u64;
        self.ensure_capacity(end);
        let start = start as usize;
        let end = end as usize;
        self.buf[start..end].copy_from_slice(buf);
        self.position = end as u64;
        Ok(())
    }

    fn copy_within(&mut self, source_position: u64, dest_position: u64, length: u64) -> Result<()> {
        let saved = self.position;
        let src_end = source_position + length;
        let dst_end = dest_position + length;
        self.ensure_capacity(src_end.max(dst_end));
        self.buf.copy_within(source_position as usize..src_end as usize, dest_position as usize);
        self.position = saved;
        Ok(())
    }

    fn insert_bytes(&mut self, position: u64, count: u64) -> Result<()> {
        let saved = self.position;
        let pos = position as usize;
        if pos > self.buf.len() {
            return Err(Error::OutOfRange);
        }
        let filler = vec![0u8; count as usize];
        self.buf.splice(pos..pos, filler);
        self.position = saved;
        Ok(())
    }

    fn remove_bytes(&mut self, position: u64, count: u64) -> Result<()> {
        let saved = self.position;
        let pos = position as usize;
        let end = pos + count as usize;
        if end > self.buf.len() {
            return Err(Error::OutOfRange);
        }
        self.buf.drain(pos..end);
        self.position = saved.min(self.buf.len() as u64);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn typed_round_trip() {
        let mut c = Cursor::new();
        c.write_u32(0xDEAD_BEEF).expect("write");
        c.write_u64(123_456_789).expect("write");
        c.write_guid(uuid::Uuid::nil()).expect("write");
        c.set_position(0);
        assert_eq!(c.read_u32().expect("read"), 0xDEAD_BEEF);
        assert_eq!(c.read_u64().expect("read"), 123_456_789);
        assert_eq!(c.read_guid().expect("read"), uuid::Uuid::nil());
    }

    #[test]
    fn insert_and_remove_preserve_position() {
        let mut c = Cursor::from_vec(vec![1, 2, 3, 4, 5]);
        c.set_position(3);
        c.insert_bytes(1, 2).expect("insert");
        assert_eq!(c.position(), 3);
        assert_eq!(c.len(), 7);

        c.remove_bytes(1, 2).expect("remove");
        assert_eq!(c.len(), 5);
    }

    #[test]
    fn bounded_read_rejects_oversized_length() {
        let mut c = Cursor::new();
        c.write_varint_u32(1000).expect("write length prefix");
        c.write_all(&[0u8; 10]).expect("write payload shorter than declared");
        c.set_position(0);
        let err = c.try_read_bytes(64).expect_err("should reject oversized declared length");
        assert!(matches!(err, Error::Malformed(_)));
    }
}
