// Copyright (c) 2025 Skiff Developers
// Distributed under the MIT software license

//! Prelude

#![allow(unknown_lints)]
#![allow(ambiguous_glob_reexports)]
#![doc(hidden)]

pub use skiff::prelude::*;

pub use crate::error::*;
pub use crate::*;
