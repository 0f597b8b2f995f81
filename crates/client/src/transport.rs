// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Transport abstraction for the agent link.
//!
//! Provides a trait-based transport layer that enables:
//! - Real WebSocket connections for production
//! - Mock transports for unit testing
//!
//! Opening a transport yields a [`Link`] handle for outbound traffic and a
//! channel of [`LinkEvent`]s for everything the socket receives.

use std::future::Future;
use std::io;
use std::pin::Pin;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::error::ProtocolError;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, trace};

/// Boxed future returned by transport operations.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Close code sent on a deliberate disconnect.
pub const NORMAL_CLOSURE: u16 = 1000;

const COMMAND_BUFFER: usize = 32;

/// Error type for transport operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// Connection could not be established.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// Connection closed.
    #[error("connection closed")]
    ConnectionClosed,

    /// Peer went away without a closing handshake.
    #[error("connection reset without closing handshake")]
    ResetWithoutHandshake,

    /// Socket-level I/O failure.
    #[error("{message}")]
    Io { kind: io::ErrorKind, message: String },

    /// Send failed.
    #[error("send failed: {0}")]
    SendFailed(String),

    /// The target is not a usable WebSocket URL.
    #[error("invalid url: {0}")]
    InvalidUrl(String),

    /// The link stopped carrying traffic.
    #[error("connection stale: {0}")]
    Stale(String),
}

impl TransportError {
    /// Returns true for failures that a reconnect is expected to heal.
    ///
    /// Transient failures on an established link skip the `Failed` state and
    /// go straight to reconnecting.
    pub fn is_transient(&self) -> bool {
        match self {
            TransportError::ConnectionClosed
            | TransportError::ResetWithoutHandshake
            | TransportError::Stale(_) => true,
            TransportError::Io { kind, .. } => matches!(
                kind,
                io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::TimedOut
                    | io::ErrorKind::NotConnected
                    | io::ErrorKind::BrokenPipe
                    | io::ErrorKind::UnexpectedEof
            ),
            TransportError::ConnectionFailed(_)
            | TransportError::SendFailed(_)
            | TransportError::InvalidUrl(_) => false,
        }
    }
}

impl From<io::Error> for TransportError {
    fn from(err: io::Error) -> Self {
        TransportError::Io {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

impl From<tungstenite::Error> for TransportError {
    fn from(err: tungstenite::Error) -> Self {
        match err {
            tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed => {
                TransportError::ConnectionClosed
            }
            tungstenite::Error::Io(e) => e.into(),
            tungstenite::Error::Protocol(ProtocolError::ResetWithoutClosingHandshake) => {
                TransportError::ResetWithoutHandshake
            }
            tungstenite::Error::Url(e) => TransportError::InvalidUrl(e.to_string()),
            other => TransportError::ConnectionFailed(other.to_string()),
        }
    }
}

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;

/// Something the socket delivered or reported.
#[derive(Debug, Clone, PartialEq)]
pub enum LinkEvent {
    /// A text frame (possibly several newline-delimited records).
    Frame(String),
    /// The peer closed the link.
    Closed { code: Option<u16>, reason: String },
    /// The link failed.
    Failed(TransportError),
}

/// Outbound half of an open link.
pub trait Link: Send + Sync {
    /// Send one text frame.
    fn send(&self, frame: String) -> BoxFuture<'_, TransportResult<()>>;

    /// Transport-level liveness probe. Resolves when the peer acknowledges.
    fn ping(&self) -> BoxFuture<'_, TransportResult<()>>;

    /// Close the link with a close code and reason.
    fn close(&self, code: u16, reason: String) -> BoxFuture<'_, ()>;
}

/// A freshly opened link and its inbound event stream.
pub struct Opened {
    pub link: Arc<dyn Link>,
    pub events: mpsc::UnboundedReceiver<LinkEvent>,
}

impl std::fmt::Debug for Opened {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Opened").field("link", &"<link>").finish()
    }
}

/// Transport trait for opening links to the agent.
///
/// This trait abstracts over the actual socket, allowing for easy testing
/// with mock implementations. The returned future must not borrow `url`.
pub trait Transport: Send + Sync + 'static {
    /// Open a link to `url`.
    fn open(&self, url: &str) -> BoxFuture<'_, TransportResult<Opened>>;
}

/// WebSocket transport implementation using tokio-tungstenite.
///
/// Each opened link is driven by one background task that owns the socket.
#[derive(Debug, Clone, Copy, Default)]
pub struct WebSocketTransport;

impl WebSocketTransport {
    /// Create a new WebSocket transport.
    pub fn new() -> Self {
        WebSocketTransport
    }
}

impl Transport for WebSocketTransport {
    fn open(&self, url: &str) -> BoxFuture<'_, TransportResult<Opened>> {
        let url = url.to_string();
        Box::pin(async move {
            let (socket, _) = tokio_tungstenite::connect_async(url.as_str()).await?;
            debug!(url = %url, "websocket open");

            let (command_tx, command_rx) = mpsc::channel(COMMAND_BUFFER);
            let (event_tx, event_rx) = mpsc::unbounded_channel();
            tokio::spawn(drive_socket(socket, command_rx, event_tx));

            Ok(Opened {
                link: Arc::new(WebSocketLink {
                    commands: command_tx,
                }),
                events: event_rx,
            })
        })
    }
}

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

enum Command {
    Send {
        frame: String,
        reply: oneshot::Sender<TransportResult<()>>,
    },
    Ping {
        reply: oneshot::Sender<TransportResult<()>>,
    },
    Close {
        code: u16,
        reason: String,
    },
}

struct WebSocketLink {
    commands: mpsc::Sender<Command>,
}

impl WebSocketLink {
    async fn round_trip(
        &self,
        command: impl FnOnce(oneshot::Sender<TransportResult<()>>) -> Command,
    ) -> TransportResult<()> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(command(reply))
            .await
            .map_err(|_| TransportError::ConnectionClosed)?;
        rx.await.map_err(|_| TransportError::ConnectionClosed)?
    }
}

impl Link for WebSocketLink {
    fn send(&self, frame: String) -> BoxFuture<'_, TransportResult<()>> {
        Box::pin(self.round_trip(|reply| Command::Send { frame, reply }))
    }

    fn ping(&self) -> BoxFuture<'_, TransportResult<()>> {
        Box::pin(self.round_trip(|reply| Command::Ping { reply }))
    }

    fn close(&self, code: u16, reason: String) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            let _ = self.commands.send(Command::Close { code, reason }).await;
        })
    }
}

/// Owns the socket: writes commands, reads frames, matches pongs to pings.
///
/// Stops when the socket ends, a write fails, or every link handle is gone.
async fn drive_socket(
    socket: Socket,
    mut commands: mpsc::Receiver<Command>,
    events: mpsc::UnboundedSender<LinkEvent>,
) {
    let (mut sink, mut stream) = socket.split();
    let mut pings: Vec<(Vec<u8>, oneshot::Sender<TransportResult<()>>)> = Vec::new();
    let mut nonce: u64 = 0;

    loop {
        tokio::select! {
            command = commands.recv() => match command {
                Some(Command::Send { frame, reply }) => {
                    if let Err(e) = sink.send(Message::Text(frame.into())).await {
                        let err = TransportError::from(e);
                        let _ = reply.send(Err(TransportError::SendFailed(err.to_string())));
                        let _ = events.send(LinkEvent::Failed(err));
                        break;
                    }
                    let _ = reply.send(Ok(()));
                }
                Some(Command::Ping { reply }) => {
                    nonce = nonce.wrapping_add(1);
                    let payload = nonce.to_be_bytes().to_vec();
                    pings.retain(|(_, waiting)| !waiting.is_closed());
                    if let Err(e) = sink.send(Message::Ping(payload.clone().into())).await {
                        let err = TransportError::from(e);
                        let _ = reply.send(Err(err.clone()));
                        let _ = events.send(LinkEvent::Failed(err));
                        break;
                    }
                    pings.push((payload, reply));
                }
                Some(Command::Close { code, reason }) => {
                    let frame = CloseFrame {
                        code: CloseCode::from(code),
                        reason: reason.into(),
                    };
                    let _ = sink.send(Message::Close(Some(frame))).await;
                    break;
                }
                None => {
                    let _ = sink.close().await;
                    break;
                }
            },
            message = stream.next() => match message {
                Some(Ok(Message::Text(text))) => {
                    let _ = events.send(LinkEvent::Frame(text.as_str().to_owned()));
                }
                Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes.to_vec()) {
                    Ok(text) => {
                        let _ = events.send(LinkEvent::Frame(text));
                    }
                    Err(_) => debug!(len = bytes.len(), "dropping non-utf8 binary frame"),
                },
                Some(Ok(Message::Pong(payload))) => {
                    if let Some(pos) = pings.iter().position(|(p, _)| p.as_slice() == &payload[..]) {
                        let (_, reply) = pings.swap_remove(pos);
                        let _ = reply.send(Ok(()));
                    } else {
                        trace!("unsolicited pong");
                    }
                }
                Some(Ok(Message::Close(frame))) => {
                    let (code, reason) = match frame {
                        Some(f) => (Some(u16::from(f.code)), f.reason.as_str().to_owned()),
                        None => (None, String::new()),
                    };
                    let _ = events.send(LinkEvent::Closed { code, reason });
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    let _ = events.send(LinkEvent::Failed(e.into()));
                    break;
                }
                None => {
                    let _ = events.send(LinkEvent::Closed { code: None, reason: String::new() });
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "transport_tests.rs"]
mod tests;
