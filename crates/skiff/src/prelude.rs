// Copyright (c) 2025 Skiff Developers
// Distributed under the MIT software license

//! Prelude

#![allow(unknown_lints)]
#![allow(ambiguous_glob_reexports)]
#![doc(hidden)]

pub use crate::address::*;
pub use crate::event::id::*;
pub use crate::event::kind::*;
pub use crate::event::tag::*;
pub use crate::event::unsigned::*;
pub use crate::event::*;
pub use crate::filter::*;
pub use crate::key::*;
pub use crate::message::client::*;
pub use crate::message::relay::*;
pub use crate::message::*;
pub use crate::signer::*;
pub use crate::types::time::*;
pub use crate::types::url::*;
pub use crate::util::*;
