// Copyright (c) 2024-present, snapdb
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

/// Errors raised by the archive table layer (component E).
#[derive(Debug)]
pub enum Error {
    /// No sub-file in the archive matches the requested `(key_type,
    /// value_type)` encoding definition.
    EncodingNotFound,

    /// The bulk writer's ascending-key contract was violated.
    OutOfOrder,

    Tree(crate::tree::Error),
    Fs(crate::fs::Error),
    Io(std::io::Error),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EncodingNotFound => write!(f, "no sub-file matches the requested encoding definition"),
            Self::OutOfOrder => write!(f, "bulk writer requires strictly ascending keys"),
            Self::Tree(e) => write!(f, "sorted-tree error: {e}"),
            Self::Fs(e) => write!(f, "file-structure error: {e}"),
            Self::Io(e) => write!(f, "I/O error: {e}"),
        }
    }
}

impl std::error::Error for Error {}

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

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
