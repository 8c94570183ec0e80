// Copyright (c) 2024-present, snapdb
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

/// Errors raised by the binary I/O primitives (component A).
#[derive(Debug)]
pub enum Error {
    /// A bounded read or write ran past the stream's addressable length.
    OutOfRange,

    /// A length-prefixed field, varint, or UTF-8 payload did not decode
    /// cleanly (negative/oversized declared length, non-terminating
    /// varint, invalid UTF-8).
    Malformed(&'static str),

    /// The concrete stream does not support the requested operation
    /// (e.g. `SetLength`/`Length` on a pointer-backed view).
    NotSupported(&'static str),

    /// Underlying I/O failure.
    Io(std::io::Error),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::OutOfRange => write!(f, "position out of range"),
            Self::Malformed(reason) => write!(f, "malformed encoding: {reason}"),
            Self::NotSupported(op) => write!(f, "operation not supported: {op}"),
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

pub type Result<T> = std::result::Result<T, Error>;
