// Copyright (c) 2024-present, snapdb
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! The wire codec (component G): typed little-endian framing over a raw
//! socket stream, command/response opcode tables, and the streamed
//! point encoder/decoder.

mod error;
pub mod io;
pub mod opcodes;
pub mod point_codec;

pub use error::{Error, Result};
pub use point_codec::{Decoded, PointDecoder, PointEncoder};

/// The fixed connection-handshake magic number (`spec.md` §4.H, §6.2).
pub const PROTOCOL_MAGIC: u64 = 0x0000_2BA5_1736_1121;
