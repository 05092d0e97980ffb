// Copyright (c) 2025 Skiff Developers
// Distributed under the MIT software license

//! In-memory transport and signer for tests.

use std::collections::{HashMap, HashSet};
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context, Poll};
use std::time::Duration;

use futures_util::{Sink, Stream};
use skiff::util::BoxedFuture;
use skiff::{
    ClientMessage, Event, EventId, PublicKey, RelayMessage, RelayUrl, Signer, SignerError,
    UnsignedEvent,
};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use crate::transport::{BoxSink, BoxStream, Transport, TransportError, TransportMessage};

/// Sender a mock relay uses to push frames (or transport errors) to the
/// client.
pub(crate) type RelayReply = UnboundedSender<Result<TransportMessage, TransportError>>;

type Behavior = Arc<dyn Fn(ClientMessage, RelayReply) + Send + Sync>;

/// Push a relay message frame to the client.
pub(crate) fn reply(tx: &RelayReply, message: RelayMessage) {
    let _ = tx.send(Ok(TransportMessage::Text(message.as_json())));
}

/// In-memory transport: each url gets a scripted behavior invoked for every
/// decoded client message. Connects and sent messages are recorded.
#[derive(Default)]
pub(crate) struct MockTransport {
    behaviors: Mutex<HashMap<RelayUrl, Behavior>>,
    refuse: Mutex<HashSet<RelayUrl>>,
    sent: Arc<Mutex<Vec<(RelayUrl, ClientMessage)>>>,
    connects: Arc<Mutex<Vec<RelayUrl>>>,
}

impl std::fmt::Debug for MockTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockTransport").finish_non_exhaustive()
    }
}

impl MockTransport {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Script the relay at `url`.
    pub(crate) fn behavior<F>(&self, url: &RelayUrl, behavior: F)
    where
        F: Fn(ClientMessage, RelayReply) + Send + Sync + 'static,
    {
        let mut behaviors = self
            .behaviors
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        behaviors.insert(url.clone(), Arc::new(behavior));
    }

    /// Refuse connections to `url`.
    pub(crate) fn refuse(&self, url: &RelayUrl) {
        let mut refuse = self.refuse.lock().unwrap_or_else(PoisonError::into_inner);
        refuse.insert(url.clone());
    }

    /// Every client message sent so far, in send order.
    pub(crate) fn sent(&self) -> Vec<(RelayUrl, ClientMessage)> {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Messages sent to one url.
    pub(crate) fn sent_to(&self, url: &RelayUrl) -> Vec<ClientMessage> {
        self.sent()
            .into_iter()
            .filter(|(sent_url, ..)| sent_url == url)
            .map(|(.., message)| message)
            .collect()
    }

    /// Urls successfully connected to, in connect order.
    pub(crate) fn connects(&self) -> Vec<RelayUrl> {
        self.connects
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Transport for MockTransport {
    fn connect<'a>(
        &'a self,
        url: &'a RelayUrl,
        _timeout: Duration,
    ) -> BoxedFuture<'a, Result<(BoxSink, BoxStream), TransportError>> {
        Box::pin(async move {
            {
                let refuse = self.refuse.lock().unwrap_or_else(PoisonError::into_inner);
                if refuse.contains(url) {
                    return Err(TransportError::backend(std::io::Error::new(
                        std::io::ErrorKind::ConnectionRefused,
                        "connection refused",
                    )));
                }
            }

            {
                let mut connects = self
                    .connects
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner);
                connects.push(url.clone());
            }

            let behavior: Option<Behavior> = {
                let behaviors = self
                    .behaviors
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner);
                behaviors.get(url).cloned()
            };

            let (tx, rx) = mpsc::unbounded_channel();

            let sink: BoxSink = Box::new(MockSink {
                url: url.clone(),
                behavior,
                relay_reply: tx,
                sent: self.sent.clone(),
            }) as BoxSink;
            let stream: BoxStream = Box::new(MockStream { rx }) as BoxStream;

            Ok((sink, stream))
        })
    }
}

struct MockSink {
    url: RelayUrl,
    behavior: Option<Behavior>,
    relay_reply: RelayReply,
    sent: Arc<Mutex<Vec<(RelayUrl, ClientMessage)>>>,
}

impl Sink<TransportMessage> for MockSink {
    type Error = TransportError;

    fn poll_ready(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn start_send(self: Pin<&mut Self>, item: TransportMessage) -> Result<(), Self::Error> {
        if let TransportMessage::Text(json) = item {
            if let Ok(message) = ClientMessage::from_json(&json) {
                {
                    let mut sent = self.sent.lock().unwrap_or_else(PoisonError::into_inner);
                    sent.push((self.url.clone(), message.clone()));
                }

                if let Some(behavior) = &self.behavior {
                    behavior(message, self.relay_reply.clone());
                }
            }
        }
        Ok(())
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn poll_close(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }
}

struct MockStream {
    rx: UnboundedReceiver<Result<TransportMessage, TransportError>>,
}

impl Stream for MockStream {
    type Item = Result<TransportMessage, TransportError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().rx.poll_recv(cx)
    }
}

static SIGN_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Signer producing deterministic fake ids/signatures.
#[derive(Debug)]
pub(crate) struct TestSigner {
    public_key: PublicKey,
}

impl TestSigner {
    pub(crate) fn new(byte: u8) -> Self {
        Self {
            public_key: PublicKey::from_bytes([byte; 32]),
        }
    }
}

impl Signer for TestSigner {
    fn public_key(&self) -> PublicKey {
        self.public_key
    }

    fn sign_event<'a>(
        &'a self,
        draft: UnsignedEvent,
    ) -> BoxedFuture<'a, Result<Event, SignerError>> {
        Box::pin(async move {
            let counter: u64 = SIGN_COUNTER.fetch_add(1, Ordering::SeqCst);
            let mut id: [u8; 32] = [0u8; 32];
            id[..8].copy_from_slice(&counter.to_be_bytes());
            id[8] = 0xff;

            Ok(Event {
                id: EventId::from_bytes(id),
                pubkey: draft.pubkey,
                created_at: draft.created_at,
                kind: draft.kind,
                tags: draft.tags,
                content: draft.content,
                sig: String::from("test-signature"),
            })
        })
    }
}

/// A test event with a deterministic id.
pub(crate) fn test_event(byte: u8, created_at: u64) -> Event {
    Event {
        id: EventId::from_bytes([byte; 32]),
        pubkey: PublicKey::from_bytes([0xaa; 32]),
        created_at: created_at.into(),
        kind: skiff::Kind::TEXT_NOTE,
        tags: skiff::Tags::default(),
        content: format!("event {byte}"),
        sig: String::from("test-signature"),
    }
}
