// Copyright (c) 2024-present, snapdb
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! I/O sessions: a per-thread, single-block cached view over an archive
//! (`spec.md` §4.C "I/O sessions", glossary).
//!
//! The source design returns a raw pointer from `GetBlock(position,
//! is_writing)` that the caller dereferences directly. This crate forbids
//! `unsafe_code`, so the single boolean-flavored accessor is re-expressed as
//! two borrow-checker-friendly methods, [`IoSession::read_view`] and
//! [`IoSession::write_view`], each returning a slice scoped to `&mut self`
//! exactly as the source's pointer was scoped to the session until the next
//! `GetBlock` call.

use super::block::{Block, BlockType, Footer};
use super::pread;
use super::Result;
use std::fs::File;

/// Translates a byte position within a sub-file into the physical block
/// that contains it and the offset within that block's payload
/// (`spec.md` §3.1: `physical = direct_block + (pos / block_data_length)`).
#[must_use]
pub fn locate(direct_block: u32, block_data_len: usize, byte_position: u64) -> (u32, usize) {
    let block_data_len = block_data_len as u64;
    let block_offset = byte_position / block_data_len;
    let offset = (byte_position % block_data_len) as usize;
    (direct_block + block_offset as u32, offset)
}

/// A cached, positioned view over one physical block of an archive file.
pub struct IoSession<'f> {
    file: &'f File,
    /// Byte offset of physical block 0 within the underlying file (past any
    /// reserved header region).
    base_offset: u64,
    block_size: usize,
    sub_file_id: u16,
    current: Option<(u32, Block)>,
}

impl<'f> IoSession<'f> {
    #[must_use]
    pub fn new(file: &'f File, base_offset: u64, block_size: usize, sub_file_id: u16) -> Self {
        Self { file, base_offset, block_size, sub_file_id, current: None }
    }

    fn ensure_loaded(&mut self, physical_block: u32, snapshot_for_new: u32) -> Result<()> {
        if self.current.as_ref().map(|(idx, _)| *idx) == Some(physical_block) {
            return Ok(());
        }
        self.flush()?;

        let mut raw = vec![0u8; self.block_size];
        let offset = self.base_offset + physical_block as u64 * self.block_size as u64;
        match pread::read_exact_at(self.file, &mut raw, offset) {
            Ok(()) => {
                let block = Block::decode(&raw)?;
                self.current = Some((physical_block, block));
            }
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                let footer = Footer::new(BlockType::Data, self.sub_file_id, physical_block, snapshot_for_new);
                self.current = Some((physical_block, Block::new(self.block_size, footer)));
            }
            Err(e) => return Err(e.into()),
        }
        Ok(())
    }

    /// Loads (or reuses the already-cached) physical block containing
    /// `position` and returns an immutable view into its payload starting
    /// at that position, along with `(first_position, supports_writing)`.
    pub fn read_view(
        &mut self,
        direct_block: u32,
        block_data_len: usize,
        position: u64,
    ) -> Result<(&[u8], u64, bool)> {
        let (physical_block, offset) = locate(direct_block, block_data_len, position);
        self.ensure_loaded(physical_block, 0)?;
        let (_, block) = self.current.as_ref().expect("just loaded");
        let first_position = position - offset as u64;
        Ok((&block.payload()[offset..], first_position, true))
    }

    /// As [`Self::read_view`], but marks the block dirty and stamps the
    /// given snapshot sequence number, per `spec.md` invariant 6 ("every
    /// block written during snapshot S carries S in its footer").
    pub fn write_view(
        &mut self,
        direct_block: u32,
        block_data_len: usize,
        position: u64,
        snapshot: u32,
    ) -> Result<(&mut [u8], u64)> {
        let (physical_block, offset) = locate(direct_block, block_data_len, position);
        self.ensure_loaded(physical_block, snapshot)?;
        let (_, block) = self.current.as_mut().expect("just loaded");
        block.footer_mut().snapshot_sequence = snapshot;
        let first_position = position - offset as u64;
        Ok((&mut block.payload_mut()[offset..], first_position))
    }

    /// Writes the current dirty block back to disk, recomputing its
    /// checksum from the dirty sentinel.
    pub fn flush(&mut self) -> Result<()> {
        if let Some((idx, block)) = self.current.as_mut() {
            if block.footer().is_dirty() {
                let mut encoded = Vec::with_capacity(self.block_size);
                block.finalize_and_encode(&mut encoded);
                let offset = self.base_offset + *idx as u64 * self.block_size as u64;
                pread::write_all_at(self.file, &encoded, offset)?;
            }
        }
        Ok(())
    }

    #[must_use]
    pub fn current_block_index(&self) -> Option<u32> {
        self.current.as_ref().map(|(idx, _)| *idx)
    }
}

impl Drop for IoSession<'_> {
    fn drop(&mut self) {
        let _ = self.flush();
    }
}

/// A bulk-writer session: like [`IoSession`], but allocates (rather than
/// requiring pre-existing) physical blocks lazily as positions advance past
/// the sub-file's current end, per `spec.md` §4.C "the simplified session".
pub struct SimplifiedSession<'f> {
    inner: IoSession<'f>,
    allocate_next: Box<dyn FnMut() -> u32 + 'f>,
}

impl<'f> SimplifiedSession<'f> {
    pub fn new(
        file: &'f File,
        base_offset: u64,
        block_size: usize,
        sub_file_id: u16,
        allocate_next: impl FnMut() -> u32 + 'f,
    ) -> Self {
        Self { inner: IoSession::new(file, base_offset, block_size, sub_file_id), allocate_next: Box::new(allocate_next) }
    }

    /// Like [`IoSession::write_view`], but synthesizes a fresh physical
    /// block index via the allocator callback whenever `position` lands
    /// past every block this session has touched so far.
    pub fn write_view(
        &mut self,
        direct_block: u32,
        block_data_len: usize,
        position: u64,
        snapshot: u32,
        high_water_block: &mut u32,
    ) -> Result<(&mut [u8], u64)> {
        let (physical_block, _) = locate(direct_block, block_data_len, position);
        while *high_water_block < physical_block {
            *high_water_block = (self.allocate_next)();
        }
        self.inner.write_view(direct_block, block_data_len, position, snapshot)
    }

    pub fn flush(&mut self) -> Result<()> {
        self.inner.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn locate_translates_position_to_block_and_offset() {
        let (block, offset) = locate(5, 480, 1000);
        assert_eq!(block, 5 + 1000 / 480);
        assert_eq!(offset, 1000 % 480);
    }

    #[test]
    fn write_then_read_through_session() {
        let tmp = tempfile::NamedTempFile::new().expect("tmp file");
        let file = tmp.reopen().expect("reopen");

        {
            let mut session = IoSession::new(&file, 0, 512, 1);
            let (buf, _) = session.write_view(0, 480, 10, 3).expect("write view");
            buf[0] = 0x7E;
            session.flush().expect("flush");
        }

        let mut session = IoSession::new(&file, 0, 512, 1);
        let (buf, first_position, _) = session.read_view(0, 480, 10).expect("read view");
        assert_eq!(buf[0], 0x7E);
        assert_eq!(first_position, 10);
    }
}
