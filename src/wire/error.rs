// Copyright (c) 2024-present, snapdb
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

/// Errors raised by the wire codec (component G).
#[derive(Debug)]
pub enum Error {
    /// A length-prefixed field or varint did not decode cleanly.
    Malformed(&'static str),

    /// An opcode byte did not match any known command/response.
    UnknownOpcode(u8),

    /// The peer closed the connection, or a write could not be
    /// completed (`spec.md` §4.F.1, "client-side socket reset during an
    /// active read").
    WriteFailed,

    Coding(crate::coding::Error),
    Io(std::io::Error),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Malformed(reason) => write!(f, "malformed wire payload: {reason}"),
            Self::UnknownOpcode(b) => write!(f, "unknown opcode {b:#04x}"),
            Self::WriteFailed => write!(f, "write to peer failed"),
            Self::Coding(e) => write!(f, "coding error: {e}"),
            Self::Io(e) => write!(f, "I/O error: {e}"),
        }
    }
}

impl std::error::Error for Error {}

impl From<crate::coding::Error> for Error {
    fn from(value: crate::coding::Error) -> Self {
        Self::Coding(value)
    }
}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
