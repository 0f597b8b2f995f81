// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! In-process agent for integration testing.
//!
//! Runs on a random port with fault injection for exercising client
//! reconnection against a real socket.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::error;

use crate::server::{self, ServeOptions};
use crate::state::StubState;

/// An agent bound to `127.0.0.1` on a random port.
///
/// Dropping the server stops it and closes every socket.
pub struct TestServer {
    addr: SocketAddr,
    shutdown: CancellationToken,
    state: StubState,
}

impl TestServer {
    /// Start with heartbeats disabled.
    pub async fn start() -> std::io::Result<Self> {
        Self::start_with(ServeOptions { heartbeat: None }).await
    }

    /// Start with explicit options.
    pub async fn start_with(options: ServeOptions) -> std::io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let state = StubState::new();
        let shutdown = CancellationToken::new();

        let serve_state = state.clone();
        let serve_shutdown = shutdown.clone();
        tokio::spawn(async move {
            if let Err(e) = server::serve(listener, serve_state, options, serve_shutdown).await {
                error!(error = %e, "test server failed");
            }
        });

        Ok(TestServer {
            addr,
            shutdown,
            state,
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// WebSocket URL for connecting to this server.
    pub fn ws_url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    /// Server state for verification and event injection.
    pub fn state(&self) -> &StubState {
        &self.state
    }

    /// Drop every open socket without a close frame; the listener keeps running.
    pub fn kick_all(&self) -> usize {
        self.state.kick_all()
    }

    /// Wait until `cond` holds, polling every 10ms for up to `timeout`.
    pub async fn wait_for(&self, timeout: Duration, cond: impl Fn(&StubState) -> bool) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        while tokio::time::Instant::now() < deadline {
            if cond(&self.state) {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        cond(&self.state)
    }

    /// Stop accepting and close every socket.
    pub fn shutdown(self) {
        self.shutdown.cancel();
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
