// Copyright (c) 2025 Skiff Developers
// Distributed under the MIT software license

//! Basic types

pub mod time;
pub mod url;

pub use self::time::Timestamp;
pub use self::url::RelayUrl;
