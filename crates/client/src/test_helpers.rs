// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Shared test helpers: a scripted in-memory transport.

#![allow(clippy::unwrap_used)]
#![allow(clippy::panic)]

use std::collections::VecDeque;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tether_core::{ClientRequest, RpcResponse, ServerEvent};
use tokio::sync::mpsc;

use crate::config::ClientConfig;
use crate::transport::{
    BoxFuture, Link, LinkEvent, Opened, Transport, TransportError, TransportResult,
};

/// What the next `open` call does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenBehavior {
    Accept,
    Refuse,
    Hang,
    /// Accept after the given delay.
    Slow(Duration),
}

/// How a mock link answers pings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PingBehavior {
    Ack,
    Fail,
    Hang,
}

#[derive(Default)]
struct MockState {
    script: Mutex<VecDeque<OpenBehavior>>,
    fallback: Mutex<Option<OpenBehavior>>,
    opens: AtomicUsize,
    links: Mutex<Vec<Arc<MockLink>>>,
}

/// Mock transport for testing without real sockets.
#[derive(Clone, Default)]
pub struct MockTransport {
    state: Arc<MockState>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue behaviors for the next `open` calls.
    pub fn script(&self, behaviors: &[OpenBehavior]) {
        self.state.script.lock().extend(behaviors.iter().copied());
    }

    /// Behavior once the script runs out (defaults to `Accept`).
    pub fn set_fallback(&self, behavior: OpenBehavior) {
        *self.state.fallback.lock() = Some(behavior);
    }

    pub fn opens(&self) -> usize {
        self.state.opens.load(Ordering::SeqCst)
    }

    pub fn link_count(&self) -> usize {
        self.state.links.lock().len()
    }

    pub fn link(&self, index: usize) -> Arc<MockLink> {
        Arc::clone(&self.state.links.lock()[index])
    }

    pub fn last_link(&self) -> Arc<MockLink> {
        Arc::clone(self.state.links.lock().last().unwrap())
    }
}

impl MockTransport {
    fn accept(&self) -> Opened {
        let (tx, rx) = mpsc::unbounded_channel();
        let link = Arc::new(MockLink::new(tx));
        self.state.links.lock().push(Arc::clone(&link));
        Opened { link, events: rx }
    }
}

impl Transport for MockTransport {
    fn open(&self, _url: &str) -> BoxFuture<'_, TransportResult<Opened>> {
        Box::pin(async move {
            self.state.opens.fetch_add(1, Ordering::SeqCst);
            let scripted = self.state.script.lock().pop_front();
            let behavior = scripted
                .or(*self.state.fallback.lock())
                .unwrap_or(OpenBehavior::Accept);
            match behavior {
                OpenBehavior::Accept => Ok(self.accept()),
                OpenBehavior::Slow(delay) => {
                    tokio::time::sleep(delay).await;
                    Ok(self.accept())
                }
                OpenBehavior::Refuse => Err(io::Error::new(
                    io::ErrorKind::ConnectionRefused,
                    "connection refused",
                )
                .into()),
                OpenBehavior::Hang => std::future::pending().await,
            }
        })
    }
}

/// In-memory link that records outbound frames.
pub struct MockLink {
    events: mpsc::UnboundedSender<LinkEvent>,
    sent: Mutex<Vec<String>>,
    ping: Mutex<PingBehavior>,
    pings: AtomicUsize,
    closed: Mutex<Option<(u16, String)>>,
}

impl MockLink {
    fn new(events: mpsc::UnboundedSender<LinkEvent>) -> Self {
        MockLink {
            events,
            sent: Mutex::new(Vec::new()),
            ping: Mutex::new(PingBehavior::Ack),
            pings: AtomicUsize::new(0),
            closed: Mutex::new(None),
        }
    }

    /// Deliver a raw frame as if the agent sent it.
    pub fn push_frame(&self, frame: &str) {
        let _ = self.events.send(LinkEvent::Frame(frame.to_string()));
    }

    pub fn push_heartbeat(&self) {
        self.push_frame(r#"{"type":"system.heartbeat"}"#);
    }

    pub fn push_event(&self, event: &ServerEvent) {
        self.push_frame(&event.to_json().unwrap());
    }

    pub fn push_response(&self, response: &RpcResponse) {
        self.push_frame(&response.to_json().unwrap());
    }

    /// Report a socket failure.
    pub fn fail(&self, err: TransportError) {
        let _ = self.events.send(LinkEvent::Failed(err));
    }

    /// Report a close initiated by the agent.
    pub fn close_remote(&self, code: u16, reason: &str) {
        let _ = self.events.send(LinkEvent::Closed {
            code: Some(code),
            reason: reason.to_string(),
        });
    }

    pub fn set_ping(&self, behavior: PingBehavior) {
        *self.ping.lock() = behavior;
    }

    /// Pings received, including the one confirming the open.
    pub fn pings(&self) -> usize {
        self.pings.load(Ordering::SeqCst)
    }

    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().clone()
    }

    /// Outbound frames parsed as requests.
    pub fn sent_requests(&self) -> Vec<ClientRequest> {
        self.sent()
            .iter()
            .filter_map(|frame| ClientRequest::from_json(frame).ok())
            .collect()
    }

    /// Outbound requests for one method.
    pub fn sent_method(&self, method: &str) -> Vec<ClientRequest> {
        self.sent_requests()
            .into_iter()
            .filter(|r| r.method == method)
            .collect()
    }

    /// `sessionId` params of outbound requests for one method.
    pub fn sent_sessions(&self, method: &str) -> Vec<String> {
        self.sent_method(method)
            .iter()
            .filter_map(|r| r.params.as_ref()?.get("sessionId")?.as_str().map(String::from))
            .collect()
    }

    pub fn closed_with(&self) -> Option<(u16, String)> {
        self.closed.lock().clone()
    }
}

impl Link for MockLink {
    fn send(&self, frame: String) -> BoxFuture<'_, TransportResult<()>> {
        Box::pin(async move {
            if self.closed.lock().is_some() {
                return Err(TransportError::ConnectionClosed);
            }
            self.sent.lock().push(frame);
            Ok(())
        })
    }

    fn ping(&self) -> BoxFuture<'_, TransportResult<()>> {
        Box::pin(async move {
            self.pings.fetch_add(1, Ordering::SeqCst);
            let behavior = *self.ping.lock();
            match behavior {
                PingBehavior::Ack => Ok(()),
                PingBehavior::Fail => Err(TransportError::ConnectionClosed),
                PingBehavior::Hang => std::future::pending().await,
            }
        })
    }

    fn close(&self, code: u16, reason: String) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            *self.closed.lock() = Some((code, reason));
        })
    }
}

/// Config with fast backoff for tests.
pub fn fast_config() -> ClientConfig {
    ClientConfig {
        max_attempts: 3,
        base_delay_ms: 100,
        max_delay_ms: 1000,
        ..ClientConfig::default()
    }
}

/// Poll `condition` on virtual time until it holds, or fail.
pub async fn eventually(what: &str, condition: impl Fn() -> bool) {
    for _ in 0..12_000 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition never held: {}", what);
}
