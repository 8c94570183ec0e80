// Copyright (c) 2024-present, snapdb
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! The free-block allocator (`spec.md` §3.1, §4.C).
//!
//! A monotonically increasing counter of never-used logical block indices,
//! plus a log of freed blocks tagged with the snapshot that freed them. A
//! freed block becomes reusable only by a snapshot strictly greater than
//! the one that freed it (`spec.md` invariant 2, lifecycle §3.4).

use super::block::{RESERVED_BLOCK_NONE, RESERVED_BLOCK_SENTINEL};
use crate::coding::Stream;

#[derive(Copy, Clone, Debug)]
pub struct FreedBlock {
    pub sub_file_id: u16,
    pub block_index: u32,
    pub freed_at_snapshot: u32,
}

/// Tracks never-used block indices plus a reuse log of freed-but-pending
/// blocks.
#[derive(Debug, Default)]
pub struct FreeBlockAllocator {
    next_never_used: u32,
    freed: Vec<FreedBlock>,
}

impl FreeBlockAllocator {
    #[must_use]
    pub fn new(next_never_used: u32) -> Self {
        Self { next_never_used: next_never_used.max(1), freed: Vec::new() }
    }

    #[must_use]
    pub fn next_never_used(&self) -> u32 {
        self.next_never_used
    }

    /// Allocates `n` contiguous logical block indices, preferring a
    /// reusable freed run when one exists at the current snapshot, else
    /// extending the never-used counter.
    ///
    /// Only single-block reuse is attempted; this engine's workloads (leaf
    /// and internal node splits) always allocate one block at a time, so a
    /// general best-fit run search is not needed (`spec.md` §3.4: nodes
    /// split one block at a time).
    pub fn allocate(&mut self, n: u32, current_snapshot: u32) -> Vec<u32> {
        if n == 1 {
            if let Some(pos) = self.freed.iter().position(|f| f.freed_at_snapshot < current_snapshot) {
                let freed = self.freed.remove(pos);
                return vec![freed.block_index];
            }
        }

        let mut out = Vec::with_capacity(n as usize);
        for _ in 0..n {
            let idx = self.next_never_used;
            debug_assert_ne!(idx, RESERVED_BLOCK_NONE);
            debug_assert_ne!(idx, RESERVED_BLOCK_SENTINEL);
            self.next_never_used += 1;
            out.push(idx);
        }
        out
    }

    /// Records a pending free. The block becomes available to allocations
    /// at a snapshot strictly greater than `at_snapshot`.
    pub fn free(&mut self, sub_file_id: u16, block_index: u32, at_snapshot: u32) {
        self.freed.push(FreedBlock { sub_file_id, block_index, freed_at_snapshot: at_snapshot });
    }

    #[must_use]
    pub fn pending_frees(&self) -> &[FreedBlock] {
        &self.freed
    }

    pub fn encode(&self, out: &mut impl Stream) -> super::Result<()> {
        out.write_u32(self.next_never_used)?;
        out.write_varint_u32(self.freed.len() as u32)?;
        for f in &self.freed {
            out.write_u16(f.sub_file_id)?;
            out.write_u32(f.block_index)?;
            out.write_u32(f.freed_at_snapshot)?;
        }
        Ok(())
    }

    pub fn decode(input: &mut impl Stream) -> super::Result<Self> {
        let next_never_used = input.read_u32()?;
        let count = input.read_varint_u32()?;
        let mut freed = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let sub_file_id = input.read_u16()?;
            let block_index = input.read_u32()?;
            let freed_at_snapshot = input.read_u32()?;
            freed.push(FreedBlock { sub_file_id, block_index, freed_at_snapshot });
        }
        Ok(Self { next_never_used, freed })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn allocate_extends_counter() {
        let mut alloc = FreeBlockAllocator::new(1);
        let first = alloc.allocate(3, 0);
        assert_eq!(first, vec![1, 2, 3]);
        assert_eq!(alloc.next_never_used(), 4);
    }

    #[test]
    fn freed_block_reused_only_after_strictly_greater_snapshot() {
        let mut alloc = FreeBlockAllocator::new(1);
        let [a] = <[u32; 1]>::try_from(alloc.allocate(1, 0)).unwrap();
        alloc.free(0, a, 5);

        // Same snapshot: not yet reusable.
        let second = alloc.allocate(1, 5);
        assert_ne!(second[0], a);

        // Strictly greater snapshot: reusable.
        let mut alloc2 = FreeBlockAllocator::new(1);
        let [b] = <[u32; 1]>::try_from(alloc2.allocate(1, 0)).unwrap();
        alloc2.free(0, b, 5);
        let third = alloc2.allocate(1, 6);
        assert_eq!(third[0], b);
    }
}
