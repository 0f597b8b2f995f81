// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! WebSocket agent implementation.
//!
//! Accepts sockets, answers requests, pushes heartbeats and fans out events
//! to the connections watching their session.

use std::net::SocketAddr;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use tether_core::protocol::methods;
use tether_core::{jsonl, ClientRequest, RpcResponse, ServerEvent};

use crate::state::{ConnectionId, StubState};

/// Echoes its params back as the result.
pub const ECHO: &str = "echo";

/// Error code for methods the stub does not implement.
pub const METHOD_NOT_FOUND: &str = "METHOD_NOT_FOUND";

/// Error code for requests with missing or malformed params.
pub const INVALID_PARAMS: &str = "INVALID_PARAMS";

/// Per-server settings.
#[derive(Debug, Clone, Copy)]
pub struct ServeOptions {
    /// Interval between `system.heartbeat` events; `None` disables them.
    pub heartbeat: Option<Duration>,
}

impl Default for ServeOptions {
    fn default() -> Self {
        ServeOptions {
            heartbeat: Some(Duration::from_secs(5)),
        }
    }
}

/// Bind `addr` and serve until `shutdown` is cancelled.
pub async fn run(
    addr: SocketAddr,
    state: StubState,
    options: ServeOptions,
    shutdown: CancellationToken,
) -> Result<(), Box<dyn std::error::Error>> {
    let listener = TcpListener::bind(addr).await?;
    info!(addr = %listener.local_addr()?, "listening");
    serve(listener, state, options, shutdown).await?;
    Ok(())
}

/// Accept loop over an already bound listener.
///
/// Cancelling `shutdown` stops accepting and drops every open socket.
pub async fn serve(
    listener: TcpListener,
    state: StubState,
    options: ServeOptions,
    shutdown: CancellationToken,
) -> std::io::Result<()> {
    loop {
        let (stream, peer_addr) = tokio::select! {
            _ = shutdown.cancelled() => return Ok(()),
            accepted = listener.accept() => accepted?,
        };
        let state = state.clone();
        let shutdown = shutdown.child_token();

        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, peer_addr, state, options, shutdown).await {
                error!(peer = %peer_addr, error = %e, "connection error");
            }
        });
    }
}

/// Handle a single WebSocket connection.
pub(crate) async fn handle_connection(
    stream: TcpStream,
    peer_addr: SocketAddr,
    state: StubState,
    options: ServeOptions,
    shutdown: CancellationToken,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let ws_stream = tokio_tungstenite::accept_async(stream).await?;

    // Subscribe before registering so a counted connection never misses a publish.
    let channels = Channels {
        events: state.subscribe(),
        kicks: state.kicks(),
    };
    let mut conn = Connection::new(state.register());
    info!(peer = %peer_addr, conn = conn.id, "new connection");

    let result = conn
        .serve(ws_stream, channels, peer_addr, &state, options, &shutdown)
        .await;
    state.unregister(conn.id);
    info!(peer = %peer_addr, conn = conn.id, "connection closed");
    result
}

struct Channels {
    events: broadcast::Receiver<ServerEvent>,
    kicks: broadcast::Receiver<()>,
}

/// Per-socket state.
#[derive(Debug)]
pub(crate) struct Connection {
    pub(crate) id: ConnectionId,
    pub(crate) watched: Option<String>,
}

impl Connection {
    pub(crate) fn new(id: ConnectionId) -> Self {
        Connection { id, watched: None }
    }

    async fn serve(
        &mut self,
        ws_stream: tokio_tungstenite::WebSocketStream<TcpStream>,
        channels: Channels,
        peer_addr: SocketAddr,
        state: &StubState,
        options: ServeOptions,
        shutdown: &CancellationToken,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let (mut ws_sink, mut ws_stream) = ws_stream.split();
        let Channels {
            mut events,
            mut kicks,
        } = channels;

        let period = options.heartbeat.unwrap_or(Duration::from_secs(3600));
        let mut heartbeat =
            tokio::time::interval_at(tokio::time::Instant::now() + period, period);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    debug!(conn = self.id, "shutdown, dropping socket");
                    return Ok(());
                }

                // No close frame: the client sees an abrupt reset.
                _ = kicks.recv() => {
                    info!(conn = self.id, "kicked");
                    return Ok(());
                }

                msg = ws_stream.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            let replies: Vec<RpcResponse> = jsonl::records(text.as_str())
                                .filter_map(|line| self.handle_request(line, state))
                                .collect();
                            if !replies.is_empty() {
                                let frame = jsonl::encode_batch(&replies)?;
                                ws_sink.send(Message::Text(frame.into())).await?;
                            }
                        }
                        Some(Ok(Message::Close(_))) => {
                            info!(peer = %peer_addr, "client closed");
                            break;
                        }
                        Some(Ok(Message::Ping(data))) => {
                            ws_sink.send(Message::Pong(data)).await?;
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            warn!(peer = %peer_addr, error = %e, "websocket error");
                            break;
                        }
                        None => break,
                    }
                }

                event = events.recv() => {
                    match event {
                        Ok(event) if self.delivers(&event) => {
                            let json = event.to_json()?;
                            if let Err(e) = ws_sink.send(Message::Text(json.into())).await {
                                warn!(peer = %peer_addr, error = %e, "failed to push event");
                                break;
                            }
                        }
                        Ok(_) => {}
                        Err(RecvError::Lagged(n)) => {
                            warn!(conn = self.id, skipped = n, "event fan-out lagged");
                        }
                        Err(RecvError::Closed) => break,
                    }
                }

                _ = heartbeat.tick(), if options.heartbeat.is_some() => {
                    if state.heartbeats_enabled() {
                        let json = ServerEvent::heartbeat().to_json()?;
                        ws_sink.send(Message::Text(json.into())).await?;
                    }
                }
            }
        }

        Ok(())
    }

    /// Whether an event reaches this connection.
    ///
    /// Untargeted events reach everyone.
    pub(crate) fn delivers(&self, event: &ServerEvent) -> bool {
        match event.session_id.as_deref() {
            None => true,
            Some(session) => self.watched.as_deref() == Some(session),
        }
    }

    /// Process one request record and return the response to send.
    pub(crate) fn handle_request(&mut self, line: &str, state: &StubState) -> Option<RpcResponse> {
        let request = match ClientRequest::from_json(line) {
            Ok(request) => request,
            Err(e) => {
                warn!(conn = self.id, error = %e, "ignoring malformed request");
                return None;
            }
        };
        debug!(conn = self.id, id = %request.id, method = %request.method, "request");
        state.record(request.clone());

        let id = request.id.as_str();
        let response = match request.method.as_str() {
            methods::PING => RpcResponse::success(id, json!({ "pong": true })),
            methods::WATCH => match session_param(request.params.as_ref()) {
                Some(session) => {
                    self.watched = Some(session.to_string());
                    state.set_watch(self.id, self.watched.clone());
                    RpcResponse::success(id, json!({ "sessionId": session }))
                }
                None => RpcResponse::error(id, INVALID_PARAMS, "sessionId is required"),
            },
            methods::UNWATCH => {
                self.watched = None;
                state.set_watch(self.id, None);
                RpcResponse::success(id, json!({}))
            }
            ECHO => RpcResponse::success(id, request.params.clone().unwrap_or(Value::Null)),
            other => RpcResponse::error(id, METHOD_NOT_FOUND, format!("unknown method: {other}")),
        };
        Some(response)
    }
}

fn session_param(params: Option<&Value>) -> Option<&str> {
    params?.get("sessionId")?.as_str().filter(|s| !s.is_empty())
}

#[cfg(test)]
#[path = "server_tests.rs"]
mod tests;
