// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Shared agent state.
//!
//! Holds the event fan-out channel, the per-connection session watches and
//! the fault-injection switches used by tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::broadcast;

use tether_core::{ClientRequest, ServerEvent};

/// Identifier assigned to each accepted socket.
pub type ConnectionId = u64;

/// Shared state for every connection served by the stub agent.
#[derive(Clone)]
pub struct StubState {
    inner: Arc<StubStateInner>,
}

struct StubStateInner {
    /// Events fanned out to every connection.
    events_tx: broadcast::Sender<ServerEvent>,
    /// Signal that makes every connection drop its socket without a close frame.
    kick_tx: broadcast::Sender<()>,
    /// Session watched by each live connection.
    watches: Mutex<HashMap<ConnectionId, Option<String>>>,
    /// Every request received, in arrival order.
    requests: Mutex<Vec<ClientRequest>>,
    next_connection: AtomicU64,
    accepted: AtomicU64,
    heartbeats: AtomicBool,
}

impl StubState {
    /// Creates empty state with heartbeats enabled.
    pub fn new() -> Self {
        let (events_tx, _) = broadcast::channel(1024);
        let (kick_tx, _) = broadcast::channel(16);
        StubState {
            inner: Arc::new(StubStateInner {
                events_tx,
                kick_tx,
                watches: Mutex::new(HashMap::new()),
                requests: Mutex::new(Vec::new()),
                next_connection: AtomicU64::new(1),
                accepted: AtomicU64::new(0),
                heartbeats: AtomicBool::new(true),
            }),
        }
    }

    /// Publishes an event.
    ///
    /// Events without a session go to every connection; session events only
    /// reach connections watching that session. Returns the number of
    /// connections that received it before filtering.
    pub fn publish(&self, event: ServerEvent) -> usize {
        self.inner.events_tx.send(event).unwrap_or(0)
    }

    /// Subscribes to published events.
    pub fn subscribe(&self) -> broadcast::Receiver<ServerEvent> {
        self.inner.events_tx.subscribe()
    }

    /// Drops every open socket without a closing handshake.
    pub fn kick_all(&self) -> usize {
        self.inner.kick_tx.send(()).unwrap_or(0)
    }

    pub(crate) fn kicks(&self) -> broadcast::Receiver<()> {
        self.inner.kick_tx.subscribe()
    }

    /// Enables or disables periodic heartbeats on every connection.
    pub fn set_heartbeats(&self, enabled: bool) {
        self.inner.heartbeats.store(enabled, Ordering::SeqCst);
    }

    pub fn heartbeats_enabled(&self) -> bool {
        self.inner.heartbeats.load(Ordering::SeqCst)
    }

    /// Registers a newly accepted socket.
    pub(crate) fn register(&self) -> ConnectionId {
        let id = self.inner.next_connection.fetch_add(1, Ordering::SeqCst);
        self.inner.accepted.fetch_add(1, Ordering::SeqCst);
        self.inner.watches.lock().insert(id, None);
        id
    }

    pub(crate) fn unregister(&self, id: ConnectionId) {
        self.inner.watches.lock().remove(&id);
    }

    pub(crate) fn set_watch(&self, id: ConnectionId, session: Option<String>) {
        if let Some(slot) = self.inner.watches.lock().get_mut(&id) {
            *slot = session;
        }
    }

    pub(crate) fn record(&self, request: ClientRequest) {
        self.inner.requests.lock().push(request);
    }

    /// Number of currently open connections.
    pub fn connections(&self) -> usize {
        self.inner.watches.lock().len()
    }

    /// Total sockets accepted since start.
    pub fn accepted(&self) -> u64 {
        self.inner.accepted.load(Ordering::SeqCst)
    }

    /// Number of open connections watching `session`.
    pub fn watchers(&self, session: &str) -> usize {
        self.inner
            .watches
            .lock()
            .values()
            .filter(|watched| watched.as_deref() == Some(session))
            .count()
    }

    /// Snapshot of every request received so far.
    pub fn requests(&self) -> Vec<ClientRequest> {
        self.inner.requests.lock().clone()
    }

    /// Requests received for one method.
    pub fn requests_for(&self, method: &str) -> Vec<ClientRequest> {
        self.inner
            .requests
            .lock()
            .iter()
            .filter(|request| request.method == method)
            .cloned()
            .collect()
    }
}

impl Default for StubState {
    fn default() -> Self {
        Self::new()
    }
}
