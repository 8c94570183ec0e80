// Copyright (c) 2024-present, snapdb
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! The file-structure layer (component C): a block-addressable archive
//! file with a checksummed, footer-tagged block format, a free-block
//! allocator, a sub-file directory, and transactional two-slot header
//! commit.
//!
//! Everything above this layer (the sorted-tree node layer, component D)
//! addresses bytes through [`session::IoSession`] rather than touching
//! [`pread`] directly.

pub mod allocator;
pub mod archive_file;
pub mod block;
mod error;
pub mod header;
mod pread;
pub mod session;
pub mod subfile;

pub use archive_file::ArchiveFile;
pub use error::{Error, Result};
