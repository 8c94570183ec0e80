// Copyright (c) 2024-present, snapdb
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! The on-disk block: a fixed-size page with a 32-byte trailing, checksum
//! protected footer (`spec.md` §3.1, §4.C).
//!
//! Grounded on the teacher's `segment::block::header` checksum-then-store
//! pattern (`ChecksummedWriter` wrapping an `xxhash_rust::xxh3` hasher), but
//! folded down to the 24-bit, footer-at-the-end layout `spec.md` mandates
//! rather than the teacher's header-at-the-front, 128-bit scheme.

pub const FOOTER_LEN: usize = 32;

/// `0` and `0xFFFF_FFFF` are reserved logical block indices.
pub const RESERVED_BLOCK_NONE: u32 = 0;
pub const RESERVED_BLOCK_SENTINEL: u32 = 0xFFFF_FFFF;

/// Marks a footer's checksum as stale; must be recomputed before the block
/// may be considered durable.
const CHECKSUM_DIRTY: u8 = 0xFF;
const CHECKSUM_CLEAN: u8 = 0x00;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum BlockType {
    FileHeader,
    Index,
    Data,
    FileAllocationTable,
}

impl From<BlockType> for u8 {
    fn from(value: BlockType) -> Self {
        match value {
            BlockType::FileHeader => 0,
            BlockType::Index => 1,
            BlockType::Data => 2,
            BlockType::FileAllocationTable => 3,
        }
    }
}

impl TryFrom<u8> for BlockType {
    type Error = super::Error;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::FileHeader),
            1 => Ok(Self::Index),
            2 => Ok(Self::Data),
            3 => Ok(Self::FileAllocationTable),
            other => Err(super::Error::Corrupted(format!("unknown block type tag {other}"))),
        }
    }
}

/// The 32-byte trailing footer of a block.
///
/// ```text
/// -32  1   block type
/// -31  1   reserved/flags
/// -30  2   sub-file id
/// -28  4   logical block index within sub-file
/// -24  4   snapshot sequence number
/// -20 16   reserved
/// -4   1   checksum-recompute sentinel
/// -3   3   checksum (24-bit fold)
/// ```
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Footer {
    pub block_type: BlockType,
    pub flags: u8,
    pub sub_file_id: u16,
    pub block_index: u32,
    pub snapshot_sequence: u32,
    dirty: bool,
    checksum: u32,
}

impl Footer {
    #[must_use]
    pub fn new(block_type: BlockType, sub_file_id: u16, block_index: u32, snapshot_sequence: u32) -> Self {
        Self {
            block_type,
            flags: 0,
            sub_file_id,
            block_index,
            snapshot_sequence,
            dirty: true,
            checksum: 0,
        }
    }

    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    #[must_use]
    pub fn checksum(&self) -> u32 {
        self.checksum
    }

    fn encode(&self, out: &mut [u8; FOOTER_LEN]) {
        out[0] = self.block_type.into();
        out[1] = self.flags;
        out[2..4].copy_from_slice(&self.sub_file_id.to_le_bytes());
        out[4..8].copy_from_slice(&self.block_index.to_le_bytes());
        out[8..12].copy_from_slice(&self.snapshot_sequence.to_le_bytes());
        // bytes 12..28 reserved, left zeroed
        out[28] = if self.dirty { CHECKSUM_DIRTY } else { CHECKSUM_CLEAN };
        let checksum_bytes = self.checksum.to_le_bytes();
        out[29..32].copy_from_slice(&checksum_bytes[..3]);
    }

    fn decode(raw: &[u8; FOOTER_LEN]) -> Result<Self, super::Error> {
        let block_type = BlockType::try_from(raw[0])?;
        let flags = raw[1];
        let sub_file_id = u16::from_le_bytes([raw[2], raw[3]]);
        let block_index = u32::from_le_bytes([raw[4], raw[5], raw[6], raw[7]]);
        let snapshot_sequence = u32::from_le_bytes([raw[8], raw[9], raw[10], raw[11]]);
        let dirty = raw[28] != CHECKSUM_CLEAN;
        let checksum = u32::from_le_bytes([raw[29], raw[30], raw[31], 0]);
        Ok(Self { block_type, flags, sub_file_id, block_index, snapshot_sequence, dirty, checksum })
    }
}

/// Computes the 24-bit checksum fold over a block's payload and the first
/// 28 bytes of its footer (everything but the sentinel/checksum bytes
/// themselves). Non-cryptographic, deterministic, stable across runs:
/// `xxh3_64`, XOR-folded from 64 down to 24 bits.
#[must_use]
pub fn compute_checksum(payload: &[u8], footer_head: &[u8]) -> u32 {
    let mut hasher = xxhash_rust::xxh3::Xxh3::new();
    hasher.update(payload);
    hasher.update(footer_head);
    let digest = hasher.digest();
    let folded = (digest & 0xFFFF_FF) ^ ((digest >> 24) & 0xFFFF_FF) ^ ((digest >> 48) & 0xFFFF);
    (folded & 0x00FF_FFFF) as u32
}

/// A fixed-size block buffer: `block_size` bytes of payload-plus-footer.
#[derive(Clone, Debug)]
pub struct Block {
    data: Vec<u8>,
    footer: Footer,
}

impl Block {
    #[must_use]
    pub fn new(block_size: usize, footer: Footer) -> Self {
        Self { data: vec![0u8; block_size], footer }
    }

    #[must_use]
    pub fn block_size(&self) -> usize {
        self.data.len()
    }

    #[must_use]
    pub fn payload(&self) -> &[u8] {
        &self.data[..self.data.len() - FOOTER_LEN]
    }

    pub fn payload_mut(&mut self) -> &mut [u8] {
        let end = self.data.len() - FOOTER_LEN;
        self.footer.mark_dirty();
        &mut self.data[..end]
    }

    #[must_use]
    pub fn footer(&self) -> &Footer {
        &self.footer
    }

    pub fn footer_mut(&mut self) -> &mut Footer {
        &mut self.footer
    }

    /// Recomputes and stamps the checksum if the dirty sentinel is set,
    /// and serializes the block (payload + footer) to `out`.
    pub fn finalize_and_encode(&mut self, out: &mut Vec<u8>) {
        if self.footer.dirty {
            let mut footer_head = [0u8; FOOTER_LEN];
            self.footer.encode(&mut footer_head);
            let checksum = compute_checksum(self.payload(), &footer_head[..28]);
            self.footer.checksum = checksum;
            self.footer.dirty = false;
        }

        out.clear();
        out.extend_from_slice(self.payload());
        let mut footer_bytes = [0u8; FOOTER_LEN];
        self.footer.encode(&mut footer_bytes);
        out.extend_from_slice(&footer_bytes);
    }

    /// Parses a full block from disk, verifying its checksum.
    pub fn decode(raw: &[u8]) -> Result<Self, super::Error> {
        if raw.len() < FOOTER_LEN {
            return Err(super::Error::Corrupted("block shorter than footer".into()));
        }
        let (payload, footer_bytes) = raw.split_at(raw.len() - FOOTER_LEN);
        let mut footer_arr = [0u8; FOOTER_LEN];
        footer_arr.copy_from_slice(footer_bytes);
        let footer = Footer::decode(&footer_arr)?;

        let expected = compute_checksum(payload, &footer_bytes[..28]);
        if expected != footer.checksum {
            return Err(super::Error::Corrupted(format!(
                "checksum mismatch: expected {:06x}, got {:06x}",
                expected, footer.checksum
            )));
        }

        Ok(Self { data: raw.to_vec(), footer })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn checksum_round_trip() {
        let mut block = Block::new(512, Footer::new(BlockType::Data, 1, 7, 3));
        block.payload_mut()[0] = 0x42;

        let mut encoded = Vec::new();
        block.finalize_and_encode(&mut encoded);

        let decoded = Block::decode(&encoded).expect("checksum should verify");
        assert_eq!(decoded.payload()[0], 0x42);
        assert_eq!(decoded.footer().block_index, 7);
        assert_eq!(decoded.footer().snapshot_sequence, 3);
    }

    #[test]
    fn corrupted_block_detected() {
        let mut block = Block::new(512, Footer::new(BlockType::Data, 1, 7, 3));
        block.payload_mut()[0] = 0x42;

        let mut encoded = Vec::new();
        block.finalize_and_encode(&mut encoded);
        encoded[0] ^= 0xFF;

        let err = Block::decode(&encoded).expect_err("flipped payload byte must fail checksum");
        assert!(matches!(err, super::super::Error::Corrupted(_)));
    }

    #[test]
    fn unknown_block_type_is_corrupted() {
        let mut block = Block::new(64, Footer::new(BlockType::Data, 0, 1, 1));
        let mut encoded = Vec::new();
        block.finalize_and_encode(&mut encoded);
        let footer_start = encoded.len() - FOOTER_LEN;
        encoded[footer_start] = 0xAA;
        // Re-stamp checksum so only the type tag itself is "corrupted" (invalid), isolating that failure mode.
        let footer_head_len = 28;
        let checksum = compute_checksum(&encoded[..footer_start], &encoded[footer_start..footer_start + footer_head_len]);
        let checksum_bytes = checksum.to_le_bytes();
        encoded[footer_start + 29..footer_start + 32].copy_from_slice(&checksum_bytes[..3]);

        let err = Block::decode(&encoded).expect_err("unknown block type must fail");
        assert!(matches!(err, super::super::Error::Corrupted(_)));
    }
}
