// Copyright (c) 2025 Skiff Developers
// Distributed under the MIT software license

//! Signer seam
//!
//! Cryptography is an external collaborator: the engine hands a draft to a
//! [`Signer`] and trusts whatever comes back.

use core::fmt;

use crate::event::unsigned::UnsignedEvent;
use crate::event::Event;
use crate::key::PublicKey;
use crate::util::BoxedFuture;

/// Signer error
#[derive(Debug)]
pub struct SignerError(Box<dyn std::error::Error + Send + Sync>);

impl SignerError {
    /// Wrap a backend error
    pub fn backend<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self(Box::new(error))
    }
}

impl std::error::Error for SignerError {}

impl fmt::Display for SignerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Event signer.
///
/// Implementations compute the event id and signature; the engine never
/// inspects either.
pub trait Signer: fmt::Debug + Send + Sync {
    /// The public key this signer signs as
    fn public_key(&self) -> PublicKey;

    /// Sign an event draft
    fn sign_event<'a>(&'a self, draft: UnsignedEvent) -> BoxedFuture<'a, Result<Event, SignerError>>;
}
