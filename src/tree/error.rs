// Copyright (c) 2024-present, snapdb
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

/// Errors raised by the sorted-tree node layer (component D).
#[derive(Debug)]
pub enum Error {
    /// A node's declared record count would exceed the active encoding's
    /// per-block capacity.
    NodeOverflow,

    /// `u64::MAX` was used as a key; it is reserved as the sparse index's
    /// open-ended upper-bound sentinel.
    ReservedKey,

    /// A logical block held a node whose `level` byte did not match the
    /// level expected by the caller (e.g. a leaf found where an internal
    /// node was expected while walking the sparse index).
    UnexpectedLevel { expected: u8, found: u8 },

    /// A sub-file's `encoding` GUID did not match any registered encoding.
    UnknownEncoding(uuid::Uuid),

    Fs(crate::fs::Error),
    Coding(crate::coding::Error),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NodeOverflow => write!(f, "node exceeds capacity for its encoding"),
            Self::ReservedKey => write!(f, "u64::MAX is a reserved key"),
            Self::UnexpectedLevel { expected, found } => {
                write!(f, "expected node level {expected}, found {found}")
            }
            Self::UnknownEncoding(guid) => write!(f, "unknown encoding {guid}"),
            Self::Fs(e) => write!(f, "file-structure error: {e}"),
            Self::Coding(e) => write!(f, "coding error: {e}"),
        }
    }
}

impl std::error::Error for Error {}

impl From<crate::fs::Error> for Error {
    fn from(value: crate::fs::Error) -> Self {
        Self::Fs(value)
    }
}

impl From<crate::coding::Error> for Error {
    fn from(value: crate::coding::Error) -> Self {
        Self::Coding(value)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
