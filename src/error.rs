// Copyright (c) 2024-present, snapdb
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! The crate-level error aggregate. Each component's own error type
//! (`coding::Error`, `fs::Error`, ...) is the one callers inside that
//! layer should match on; this type exists for crate consumers and the
//! `server` binary that cut across every layer.

#[derive(Debug)]
#[non_exhaustive]
pub enum Error {
    Coding(crate::coding::Error),
    Fs(crate::fs::Error),
    Tree(crate::tree::Error),
    Archive(crate::archive::Error),
    Engine(crate::engine::Error),
    Wire(crate::wire::Error),
    Security(crate::security::Error),
    Session(crate::session::Error),
    Io(std::io::Error),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Coding(e) => write!(f, "{e}"),
            Self::Fs(e) => write!(f, "{e}"),
            Self::Tree(e) => write!(f, "{e}"),
            Self::Archive(e) => write!(f, "{e}"),
            Self::Engine(e) => write!(f, "{e}"),
            Self::Wire(e) => write!(f, "{e}"),
            Self::Security(e) => write!(f, "{e}"),
            Self::Session(e) => write!(f, "{e}"),
            Self::Io(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for Error {}

macro_rules! from_layer_error {
    ($variant:ident, $ty:path) => {
        impl From<$ty> for Error {
            fn from(value: $ty) -> Self {
                Self::$variant(value)
            }
        }
    };
}

from_layer_error!(Coding, crate::coding::Error);
from_layer_error!(Fs, crate::fs::Error);
from_layer_error!(Tree, crate::tree::Error);
from_layer_error!(Archive, crate::archive::Error);
from_layer_error!(Engine, crate::engine::Error);
from_layer_error!(Wire, crate::wire::Error);
from_layer_error!(Security, crate::security::Error);
from_layer_error!(Session, crate::session::Error);
from_layer_error!(Io, std::io::Error);

pub type Result<T> = std::result::Result<T, Error>;
