// Copyright (c) 2024-present, snapdb
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

/// Errors raised by the server-side engine (component F).
#[derive(Debug)]
pub enum Error {
    /// The requested `(key_type, value_type)` pair has no matching archive
    /// in the attached list.
    UnknownEncoding,

    /// A hard commit could not durably flush the in-memory archive; the
    /// caller should retry, and readers continue to observe the prior
    /// durable snapshot.
    CommitFailed,

    Archive(crate::archive::Error),
    Tree(crate::tree::Error),
    Fs(crate::fs::Error),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownEncoding => write!(f, "no attached archive matches the requested encoding"),
            Self::CommitFailed => write!(f, "hard commit failed; in-memory buffer preserved"),
            Self::Archive(e) => write!(f, "archive error: {e}"),
            Self::Tree(e) => write!(f, "tree error: {e}"),
            Self::Fs(e) => write!(f, "file-structure error: {e}"),
        }
    }
}

impl std::error::Error for Error {}

impl From<crate::archive::Error> for Error {
    fn from(value: crate::archive::Error) -> Self {
        Self::Archive(value)
    }
}

impl From<crate::tree::Error> for Error {
    fn from(value: crate::tree::Error) -> Self {
        Self::Tree(value)
    }
}

impl From<crate::fs::Error> for Error {
    fn from(value: crate::fs::Error) -> Self {
        Self::Fs(value)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
