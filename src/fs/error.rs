// Copyright (c) 2024-present, snapdb
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

/// Errors raised by the file-structure layer (component C).
#[derive(Debug)]
pub enum Error {
    /// Footer checksum mismatch or a disallowed `block_type` at a given
    /// logical index.
    Corrupted(String),

    /// A position, sub-file id, or block index fell outside its valid
    /// range.
    OutOfRange,

    /// `SetLength`/`Length` requested on a stream that does not support
    /// it (a pointer-backed I/O session view).
    NotSupported(&'static str),

    /// The file header's format version tag is not one this build
    /// understands.
    VersionMismatch(u8),

    /// Underlying binary-coding failure.
    Coding(crate::coding::Error),

    /// Underlying I/O failure.
    Io(std::io::Error),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Corrupted(reason) => write!(f, "corrupted archive: {reason}"),
            Self::OutOfRange => write!(f, "position out of range"),
            Self::NotSupported(op) => write!(f, "operation not supported: {op}"),
            Self::VersionMismatch(v) => write!(f, "unsupported format version {v}"),
            Self::Coding(e) => write!(f, "coding error: {e}"),
            Self::Io(e) => write!(f, "I/O error: {e}"),
        }
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<crate::coding::Error> for Error {
    fn from(value: crate::coding::Error) -> Self {
        match value {
            crate::coding::Error::OutOfRange => Self::OutOfRange,
            crate::coding::Error::NotSupported(op) => Self::NotSupported(op),
            crate::coding::Error::Io(e) => Self::Io(e),
            other => Self::Coding(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
