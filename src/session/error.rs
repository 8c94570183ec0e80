// Copyright (c) 2024-present, snapdb
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

/// Errors raised while driving the per-connection state machine
/// (component I). Every variant eventually maps to a wire response byte
/// or closes the connection; `spec.md` §7's "at the wire boundary every
/// uncaught exception is serialized as `UnhandledException[text]`" is
/// implemented one level up, in `server`, by catching this type.
#[derive(Debug)]
pub enum Error {
    DatabaseDoesNotExist,
    DatabaseKeyUnknown,
    DatabaseValueUnknown,
    UnknownEncodingMethod,
    UnknownOrCorruptSeekFilter,
    UnknownOrCorruptMatchFilter,
    UnknownOrCorruptReaderOptions,
    NotAuthenticated,
    Wire(crate::wire::Error),
    Engine(crate::engine::Error),
    Io(std::io::Error),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DatabaseDoesNotExist => write!(f, "database does not exist"),
            Self::DatabaseKeyUnknown => write!(f, "unknown key type"),
            Self::DatabaseValueUnknown => write!(f, "unknown value type"),
            Self::UnknownEncodingMethod => write!(f, "unknown encoding method"),
            Self::UnknownOrCorruptSeekFilter => write!(f, "unknown or corrupt seek filter"),
            Self::UnknownOrCorruptMatchFilter => write!(f, "unknown or corrupt match filter"),
            Self::UnknownOrCorruptReaderOptions => write!(f, "unknown or corrupt reader options"),
            Self::NotAuthenticated => write!(f, "not authenticated"),
            Self::Wire(e) => write!(f, "wire error: {e}"),
            Self::Engine(e) => write!(f, "engine error: {e}"),
            Self::Io(e) => write!(f, "I/O error: {e}"),
        }
    }
}

impl std::error::Error for Error {}

impl From<crate::wire::Error> for Error {
    fn from(value: crate::wire::Error) -> Self {
        Self::Wire(value)
    }
}

impl From<crate::engine::Error> for Error {
    fn from(value: crate::engine::Error) -> Self {
        Self::Engine(value)
    }
}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
