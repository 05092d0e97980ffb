// Copyright (c) 2025 Skiff Developers
// Distributed under the MIT software license

//! Prelude

#![allow(unknown_lints)]
#![allow(ambiguous_glob_reexports)]
#![doc(hidden)]

pub use skiff::prelude::*;
pub use skiff_router::*;
pub use skiff_store::prelude::*;

pub use crate::auth::*;
pub use crate::connection::*;
pub use crate::engine::*;
pub use crate::error::*;
pub use crate::pool::*;
pub use crate::publish::*;
pub use crate::socket::*;
pub use crate::stats::*;
pub use crate::subscription::*;
pub use crate::tracker::*;
pub use crate::transport::*;
