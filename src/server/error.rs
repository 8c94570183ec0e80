// Copyright (c) 2024-present, snapdb
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

#[derive(Debug)]
pub enum Error {
    Io(std::io::Error),
    Security(crate::security::Error),
    Session(crate::session::Error),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "{e}"),
            Self::Security(e) => write!(f, "{e}"),
            Self::Session(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<crate::security::Error> for Error {
    fn from(value: crate::security::Error) -> Self {
        Self::Security(value)
    }
}

impl From<crate::session::Error> for Error {
    fn from(value: crate::session::Error) -> Self {
        Self::Session(value)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
