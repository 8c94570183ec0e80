// Copyright (c) 2024-present, snapdb
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use super::{Error, Result, Stream};
use crate::pool::{Generation, PageHandle};

/// The page-pool-backed half of the stream hierarchy (`spec.md` §9):
/// a fixed-size, positioned view directly over a pooled page.
///
/// Unlike [`super::Cursor`], a `PointerView` cannot grow — it is exactly
/// one page wide — and carries the page's [`Generation`] so a long-lived
/// holder can detect that the pool recycled the backing page out from
/// under it (`is_stale`). `set_len`/`len` mutation is not supported on a
/// pointer-backed stream (`spec.md` §4.C error model, `NotSupported`).
pub struct PointerView {
    handle: PageHandle,
    position: u64,
}

impl PointerView {
    #[must_use]
    pub fn new(handle: PageHandle) -> Self {
        Self { handle, position: 0 }
    }

    #[must_use]
    pub fn generation(&self) -> Generation {
        self.handle.generation()
    }

    #[must_use]
    pub fn is_stale(&self) -> bool {
        self.handle.is_stale()
    }
}

impl Stream for PointerView {
    fn position(&self) -> u64 {
        self.position
    }

    fn set_position(&mut self, position: u64) {
        self.position = position;
    }

    fn len(&self) -> u64 {
        self.handle.with_slice(<[u8]>::len).unwrap_or(0) as u64
    }

    fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        let start = self.position as usize;
        let end = start + buf.len();
        let read = self
            .handle
            .with_slice(|page| {
                if end > page.len() {
                    return Err(Error::OutOfRange);
                }
                buf.copy_from_slice(&page[start..end]);
                Ok(())
            })
            .ok_or(Error::OutOfRange)?;
        read?;
        self.position = end as u64;
        Ok(())
    }

    fn write_all(&mut self, buf: &[u8]) -> Result<()> {
        let start = self.position as usize;
        let end = start + buf.len();
        let wrote = self
            .handle
            .with_mut_slice(|page| {
                if end > page.len() {
                    return Err(Error::OutOfRange);
                }
                page[start..end].copy_from_slice(buf);
                Ok(())
            })
            .ok_or(Error::OutOfRange)?;
        wrote?;
        self.position = end as u64;
        Ok(())
    }

    fn copy_within(&mut self, source_position: u64, dest_position: u64, length: u64) -> Result<()> {
        let saved = self.position;
        let (src, dst, len) = (source_position as usize, dest_position as usize, length as usize);
        let result = self
            .handle
            .with_mut_slice(|page| {
                if src + len > page.len() || dst + len > page.len() {
                    return Err(Error::OutOfRange);
                }
                page.copy_within(src..src + len, dst);
                Ok(())
            })
            .ok_or(Error::OutOfRange)?;
        result?;
        self.position = saved;
        Ok(())
    }

    fn insert_bytes(&mut self, _position: u64, _count: u64) -> Result<()> {
        Err(Error::NotSupported("insert_bytes on a fixed-size pointer view"))
    }

    fn remove_bytes(&mut self, _position: u64, _count: u64) -> Result<()> {
        Err(Error::NotSupported("remove_bytes on a fixed-size pointer view"))
    }
}
