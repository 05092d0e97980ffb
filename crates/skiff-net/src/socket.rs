// Copyright (c) 2025 Skiff Developers
// Distributed under the MIT software license

//! Socket
//!
//! One framed transport connection to one relay: a small state machine, a
//! FIFO queue for messages sent before the connection is open, and typed
//! decoding of inbound frames. Malformed frames are dropped and logged,
//! never fatal. There is no reconnect loop here: reconnection happens
//! lazily, when a consumer calls [`Socket::open`] again.

use core::fmt;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use skiff::{ClientMessage, RelayMessage, RelayUrl};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::{broadcast, Notify};

use crate::transport::{BoxSink, BoxStream, Transport, TransportMessage};

/// Socket status
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SocketStatus {
    /// Just created, never opened
    Pending = 0,
    /// Trying to connect
    Connecting = 1,
    /// Connected
    Open = 2,
    /// Shutting down
    Closing = 3,
    /// Closed; can be reopened
    Closed = 4,
    /// The transport failed; can be reopened
    Error = 5,
}

impl SocketStatus {
    /// Check if the socket is open
    #[inline]
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Open)
    }

    /// Check if the socket is closed, errored or was never opened
    #[inline]
    pub fn is_disconnected(&self) -> bool {
        matches!(self, Self::Pending | Self::Closed | Self::Error)
    }
}

impl fmt::Display for SocketStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "Pending"),
            Self::Connecting => write!(f, "Connecting"),
            Self::Open => write!(f, "Open"),
            Self::Closing => write!(f, "Closing"),
            Self::Closed => write!(f, "Closed"),
            Self::Error => write!(f, "Error"),
        }
    }
}

#[derive(Debug, Default)]
struct AtomicSocketStatus {
    value: AtomicU8,
}

impl AtomicSocketStatus {
    fn set(&self, status: SocketStatus) {
        self.value.store(status as u8, Ordering::SeqCst);
    }

    fn load(&self) -> SocketStatus {
        match self.value.load(Ordering::SeqCst) {
            0 => SocketStatus::Pending,
            1 => SocketStatus::Connecting,
            2 => SocketStatus::Open,
            3 => SocketStatus::Closing,
            4 => SocketStatus::Closed,
            5 => SocketStatus::Error,
            _ => unreachable!(),
        }
    }

    /// Move to `Connecting` if the current status allows starting a
    /// connection. Returns `false` if some other caller got there first or
    /// the socket is already connecting/open/closing.
    fn begin_connecting(&self) -> bool {
        for from in [SocketStatus::Pending, SocketStatus::Closed, SocketStatus::Error] {
            if self
                .value
                .compare_exchange(
                    from as u8,
                    SocketStatus::Connecting as u8,
                    Ordering::SeqCst,
                    Ordering::SeqCst,
                )
                .is_ok()
            {
                return true;
            }
        }
        false
    }
}

/// Typed socket notification.
#[derive(Debug, Clone)]
pub enum SocketEvent {
    /// The status changed
    Status(SocketStatus),
    /// A decoded inbound message
    Message(RelayMessage),
}

#[derive(Debug)]
struct InnerSocket {
    url: RelayUrl,
    transport: Arc<dyn Transport>,
    connection_timeout: Duration,
    status: AtomicSocketStatus,
    /// Messages sent while not open, flushed FIFO on open
    queue: Mutex<VecDeque<String>>,
    /// Sender into the writer half of the running io task
    writer: Mutex<Option<UnboundedSender<String>>>,
    terminate: Notify,
    events: broadcast::Sender<SocketEvent>,
}

/// One framed connection to one relay.
#[derive(Debug, Clone)]
pub struct Socket {
    inner: Arc<InnerSocket>,
}

impl Socket {
    pub(crate) fn new(
        url: RelayUrl,
        transport: Arc<dyn Transport>,
        connection_timeout: Duration,
        channel_size: usize,
    ) -> Self {
        let (events, ..) = broadcast::channel(channel_size);

        Self {
            inner: Arc::new(InnerSocket {
                url,
                transport,
                connection_timeout,
                status: AtomicSocketStatus::default(),
                queue: Mutex::new(VecDeque::new()),
                writer: Mutex::new(None),
                terminate: Notify::new(),
                events,
            }),
        }
    }

    /// Relay url
    #[inline]
    pub fn url(&self) -> &RelayUrl {
        &self.inner.url
    }

    /// Current status
    #[inline]
    pub fn status(&self) -> SocketStatus {
        self.inner.status.load()
    }

    /// Subscribe to socket notifications
    #[inline]
    pub fn notifications(&self) -> broadcast::Receiver<SocketEvent> {
        self.inner.events.subscribe()
    }

    /// Start connecting if not already connecting or open.
    ///
    /// Returns immediately: the handshake runs on a background task, and its
    /// outcome surfaces as a [`SocketEvent::Status`] notification.
    pub fn open(&self) {
        if !self.inner.status.begin_connecting() {
            return;
        }

        self.inner.emit_status(SocketStatus::Connecting);

        let inner: Arc<InnerSocket> = self.inner.clone();
        tokio::spawn(async move { inner.io_task().await });
    }

    /// Queue a message.
    ///
    /// Delivered immediately when open, buffered in FIFO order otherwise and
    /// flushed on the next successful open.
    pub fn send(&self, message: &ClientMessage) {
        let json: String = message.as_json();

        let writer = self
            .inner
            .writer
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        match writer.as_ref() {
            Some(tx) if tx.send(json.clone()).is_ok() => {}
            _ => {
                let mut queue = self
                    .inner
                    .queue
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner);
                queue.push_back(json);
            }
        }
    }

    /// Close the connection and release the transport. Idempotent.
    ///
    /// Nothing queued is flushed after this point; the socket can be
    /// reopened later with [`Socket::open`].
    pub fn close(&self) {
        match self.status() {
            SocketStatus::Connecting | SocketStatus::Open => {
                self.inner.set_status(SocketStatus::Closing);
                self.inner.terminate.notify_one();
            }
            SocketStatus::Pending | SocketStatus::Error => {
                self.inner.set_status(SocketStatus::Closed);
            }
            SocketStatus::Closing | SocketStatus::Closed => {}
        }
    }
}

impl InnerSocket {
    fn set_status(&self, status: SocketStatus) {
        self.status.set(status);
        self.emit_status(status);
    }

    fn emit_status(&self, status: SocketStatus) {
        match status {
            SocketStatus::Connecting => tracing::debug!("Connecting to '{}'", self.url),
            SocketStatus::Open => tracing::info!("Connected to '{}'", self.url),
            SocketStatus::Closed => tracing::info!("Disconnected from '{}'", self.url),
            SocketStatus::Error => tracing::debug!(url = %self.url, "Socket error."),
            _ => {}
        }

        let _ = self.events.send(SocketEvent::Status(status));
    }

    async fn io_task(self: Arc<Self>) {
        let connect = self.transport.connect(&self.url, self.connection_timeout);

        let (mut sink, stream): (BoxSink, BoxStream) = tokio::select! {
            result = connect => match result {
                Ok(halves) => halves,
                Err(e) => {
                    tracing::warn!(url = %self.url, error = %e, "Connection failed.");
                    self.set_status(SocketStatus::Error);
                    return;
                }
            },
            // Termination requested during the handshake
            _ = self.terminate.notified() => {
                self.set_status(SocketStatus::Closed);
                return;
            }
        };

        // Install the writer and flush everything queued while disconnected,
        // under both locks so concurrent sends can't jump the queue.
        let (tx, rx) = mpsc::unbounded_channel::<String>();
        {
            let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
            let mut queue = self.queue.lock().unwrap_or_else(PoisonError::into_inner);
            for json in queue.drain(..) {
                let _ = tx.send(json);
            }
            *writer = Some(tx);
        }

        self.set_status(SocketStatus::Open);

        let exit_status: SocketStatus = self.run(&mut sink, stream, rx).await;

        {
            let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
            *writer = None;
        }

        self.set_status(exit_status);
    }

    async fn run(
        &self,
        sink: &mut BoxSink,
        mut stream: BoxStream,
        mut rx: UnboundedReceiver<String>,
    ) -> SocketStatus {
        loop {
            tokio::select! {
                _ = self.terminate.notified() => {
                    let _ = sink.close().await;
                    break SocketStatus::Closed;
                }
                outgoing = rx.recv() => match outgoing {
                    Some(json) => {
                        tracing::debug!("Sending '{json}' to '{}'", self.url);
                        if let Err(e) = sink.send(TransportMessage::Text(json)).await {
                            tracing::warn!(url = %self.url, error = %e, "Send failed.");
                            break SocketStatus::Error;
                        }
                    }
                    None => break SocketStatus::Closed,
                },
                incoming = stream.next() => match incoming {
                    Some(Ok(TransportMessage::Text(json))) => self.handle_frame(&json),
                    Some(Ok(TransportMessage::Close)) | None => break SocketStatus::Closed,
                    Some(Err(e)) => {
                        tracing::warn!(url = %self.url, error = %e, "Transport error.");
                        break SocketStatus::Error;
                    }
                },
            }
        }
    }

    fn handle_frame(&self, json: &str) {
        tracing::trace!(url = %self.url, msg = %json, "Received frame.");

        match RelayMessage::from_json(json) {
            Ok(message) => {
                let _ = self.events.send(SocketEvent::Message(message));
            }
            // A malformed frame never kills the connection
            Err(e) => {
                tracing::warn!(url = %self.url, msg = %json, error = %e, "Dropping malformed frame.")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use skiff::SubscriptionId;

    use super::*;
    use crate::testing::{reply, MockTransport};

    fn url(s: &str) -> RelayUrl {
        RelayUrl::parse(s).unwrap()
    }

    fn socket_with(transport: &Arc<MockTransport>, relay: &RelayUrl) -> Socket {
        Socket::new(
            relay.clone(),
            transport.clone(),
            Duration::from_secs(5),
            64,
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_queue_flushes_fifo_on_open() {
        let transport = MockTransport::new();
        let relay = url("wss://a.example");
        transport.behavior(&relay, |_, _| {});

        let socket = socket_with(&transport, &relay);
        assert_eq!(socket.status(), SocketStatus::Pending);

        for name in ["one", "two", "three"] {
            socket.send(&ClientMessage::close(SubscriptionId::new(name)));
        }
        assert!(transport.sent().is_empty());

        socket.open();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(socket.status(), SocketStatus::Open);

        let names: Vec<String> = transport
            .sent_to(&relay)
            .into_iter()
            .filter_map(|message| match message {
                ClientMessage::Close(id) => Some(id.as_str().to_string()),
                _ => None,
            })
            .collect();
        assert_eq!(names, vec!["one", "two", "three"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_is_idempotent() {
        let transport = MockTransport::new();
        let relay = url("wss://a.example");
        transport.behavior(&relay, |_, _| {});

        let socket = socket_with(&transport, &relay);
        socket.open();
        socket.open();
        tokio::time::sleep(Duration::from_millis(20)).await;
        socket.open();
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(transport.connects().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reopen_after_close() {
        let transport = MockTransport::new();
        let relay = url("wss://a.example");
        transport.behavior(&relay, |_, _| {});

        let socket = socket_with(&transport, &relay);
        socket.open();
        tokio::time::sleep(Duration::from_millis(20)).await;

        socket.close();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(socket.status(), SocketStatus::Closed);

        socket.open();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(socket.status(), SocketStatus::Open);
        assert_eq!(transport.connects().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_failure_sets_error_status() {
        let transport = MockTransport::new();
        let relay = url("wss://a.example");
        transport.refuse(&relay);

        let socket = socket_with(&transport, &relay);
        let mut notifications = socket.notifications();
        socket.open();

        loop {
            match notifications.recv().await.unwrap() {
                SocketEvent::Status(SocketStatus::Error) => break,
                SocketEvent::Status(..) => {}
                SocketEvent::Message(message) => panic!("unexpected message: {message:?}"),
            }
        }
        assert_eq!(socket.status(), SocketStatus::Error);
    }

    #[tokio::test(start_paused = true)]
    async fn test_malformed_frame_is_dropped_not_fatal() {
        let transport = MockTransport::new();
        let relay = url("wss://a.example");
        transport.behavior(&relay, |message, tx| {
            if matches!(message, ClientMessage::Close(..)) {
                let _ = tx.send(Ok(TransportMessage::Text(String::from("not json"))));
                reply(&tx, RelayMessage::Notice(String::from("still alive")));
            }
        });

        let socket = socket_with(&transport, &relay);
        let mut notifications = socket.notifications();
        socket.open();
        socket.send(&ClientMessage::close(SubscriptionId::new("x")));

        loop {
            match notifications.recv().await.unwrap() {
                SocketEvent::Message(RelayMessage::Notice(notice)) => {
                    assert_eq!(notice, "still alive");
                    break;
                }
                _ => {}
            }
        }
        assert_eq!(socket.status(), SocketStatus::Open);
    }
}
