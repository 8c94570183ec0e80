// Copyright (c) 2024-present, snapdb
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! The sorted-tree node layer (component D): leaf/internal node formats,
//! the sparse index, and the pluggable record [`Encoding`] selected at
//! tree creation/open time by GUID, with `FixedSizeCombined` as the sole
//! built-in implementation.

pub mod encoding;
mod error;
pub mod node;
pub mod sorted_tree;
pub mod sparse_index;

pub use encoding::{Encoding, FixedSizeCombined, FIXED_SIZE_COMBINED};
pub use error::{Error, Result};
pub use sorted_tree::{Scanner, SortedTree};
pub use sparse_index::SparseIndex;
