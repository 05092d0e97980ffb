// Copyright (c) 2025 Skiff Developers
// Distributed under the MIT software license

//! Transport seam
//!
//! A [`Transport`] produces the boxed sink/stream halves of one framed
//! connection. The default implementation speaks websocket; tests plug in an
//! in-memory one.

use std::fmt;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use futures_util::stream::SplitSink;
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use skiff::util::BoxedFuture;
use skiff::RelayUrl;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

/// Transport error
#[derive(Debug)]
pub struct TransportError(Box<dyn std::error::Error + Send + Sync>);

impl TransportError {
    /// Wrap a backend error
    pub fn backend<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self(Box::new(error))
    }

    /// Timeout while connecting
    pub fn timeout() -> Self {
        Self::backend(std::io::Error::new(
            std::io::ErrorKind::TimedOut,
            "connection timed out",
        ))
    }
}

impl std::error::Error for TransportError {}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One frame on the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportMessage {
    /// A text frame carrying one JSON message
    Text(String),
    /// The peer closed the connection
    Close,
}

/// Transport sink half
pub type BoxSink = Box<dyn Sink<TransportMessage, Error = TransportError> + Send + Unpin>;
/// Transport stream half
pub type BoxStream = Box<dyn Stream<Item = Result<TransportMessage, TransportError>> + Send + Unpin>;

/// Connection transport.
pub trait Transport: fmt::Debug + Send + Sync {
    /// Open a connection to the relay at `url`.
    fn connect<'a>(
        &'a self,
        url: &'a RelayUrl,
        timeout: Duration,
    ) -> BoxedFuture<'a, Result<(BoxSink, BoxStream), TransportError>>;
}

/// Default websocket transport
#[derive(Debug, Clone, Copy, Default)]
pub struct WebSocketTransport;

impl Transport for WebSocketTransport {
    fn connect<'a>(
        &'a self,
        url: &'a RelayUrl,
        timeout: Duration,
    ) -> BoxedFuture<'a, Result<(BoxSink, BoxStream), TransportError>> {
        Box::pin(async move {
            let (socket, _response) = tokio::time::timeout(timeout, connect_async(url.as_str()))
                .await
                .map_err(|_| TransportError::timeout())?
                .map_err(TransportError::backend)?;

            let (tx, rx) = socket.split();

            let sink: BoxSink = Box::new(WebSocketSink(tx)) as BoxSink;
            let stream: BoxStream = Box::new(rx.filter_map(|message| {
                futures_util::future::ready(match message {
                    Ok(Message::Text(text)) => Some(Ok(TransportMessage::Text(text))),
                    Ok(Message::Close(..)) => Some(Ok(TransportMessage::Close)),
                    // Ping/pong is handled by tungstenite, binary frames are
                    // not part of the protocol
                    Ok(..) => None,
                    Err(e) => Some(Err(TransportError::backend(e))),
                })
            })) as BoxStream;

            Ok((sink, stream))
        })
    }
}

struct WebSocketSink(SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>);

impl Sink<TransportMessage> for WebSocketSink {
    type Error = TransportError;

    fn poll_ready(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.0.poll_ready_unpin(cx).map_err(TransportError::backend)
    }

    fn start_send(mut self: Pin<&mut Self>, item: TransportMessage) -> Result<(), Self::Error> {
        let message: Message = match item {
            TransportMessage::Text(text) => Message::Text(text),
            TransportMessage::Close => Message::Close(None),
        };
        self.0.start_send_unpin(message).map_err(TransportError::backend)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.0.poll_flush_unpin(cx).map_err(TransportError::backend)
    }

    fn poll_close(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.0.poll_close_unpin(cx).map_err(TransportError::backend)
    }
}
