// Copyright (c) 2025 Skiff Developers
// Distributed under the MIT software license

//! Utilities

use core::future::Future;
use core::pin::Pin;

/// Boxed future
pub type BoxedFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Helpers for types that (de)serialize as JSON.
pub trait JsonUtil: Sized + serde::Serialize + serde::de::DeserializeOwned {
    /// Error produced when deserialization fails
    type Err: From<serde_json::Error>;

    /// Deserialize from a JSON string
    fn from_json<T>(json: T) -> Result<Self, Self::Err>
    where
        T: AsRef<[u8]>,
    {
        Ok(serde_json::from_slice(json.as_ref())?)
    }

    /// Serialize to a JSON string
    fn as_json(&self) -> String {
        // Serialization of the types in this crate can't fail
        serde_json::to_string(self).unwrap_or_default()
    }
}
