// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Session watch tracking.
//!
//! A connection watches at most one session at a time. The watched id is
//! recorded locally before the agent is told, and re-sent after every
//! successful (re)connect. Backgrounding parks the id so foregrounding can
//! restore it.

use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::json;
use tether_core::protocol::methods;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::router::MessageRouter;

pub struct SessionWatchTracker {
    router: Arc<MessageRouter>,
    serial: tokio::sync::Mutex<()>,
    watched: Mutex<Option<String>>,
    parked: Mutex<Option<String>>,
}

impl SessionWatchTracker {
    pub fn new(router: Arc<MessageRouter>) -> Self {
        SessionWatchTracker {
            router,
            serial: tokio::sync::Mutex::new(()),
            watched: Mutex::new(None),
            parked: Mutex::new(None),
        }
    }

    /// Currently watched session.
    pub fn current(&self) -> Option<String> {
        self.watched.lock().clone()
    }

    /// Session released by [`suspend`](Self::suspend), if any.
    pub fn parked(&self) -> Option<String> {
        self.parked.lock().clone()
    }

    /// Watch `session_id`, replacing any previously watched session.
    ///
    /// Watching the current session again is a no-op. The id stays recorded
    /// even if sending fails, so the next reconnect re-sends it.
    pub async fn watch(&self, session_id: &str) -> Result<()> {
        let _serial = self.serial.lock().await;
        if self.watched.lock().as_deref() == Some(session_id) {
            debug!(session_id, "already watching");
            return Ok(());
        }
        if !self.router.is_attached() {
            return Err(Error::NotConnected);
        }

        let previous = self.watched.lock().take();
        if let Some(previous) = previous {
            self.send_unwatch(&previous).await;
        }

        *self.watched.lock() = Some(session_id.to_string());
        *self.parked.lock() = None;
        info!(session_id, "watching session");
        self.send_watch(session_id).await
    }

    /// Stop watching. No-op when nothing is watched.
    ///
    /// The local id is cleared before the agent is told; the unwatch command
    /// itself is best effort.
    pub async fn unwatch(&self) -> Result<()> {
        let _serial = self.serial.lock().await;
        let previous = self.watched.lock().take();
        let Some(previous) = previous else {
            return Ok(());
        };
        *self.parked.lock() = None;
        info!(session_id = %previous, "unwatching session");
        self.send_unwatch(&previous).await;
        Ok(())
    }

    /// Re-send the watch command after a (re)connect.
    pub async fn restore(&self) {
        let _serial = self.serial.lock().await;
        let current = self.watched.lock().clone();
        if let Some(session_id) = current {
            debug!(session_id = %session_id, "restoring session watch");
            if let Err(e) = self.send_watch(&session_id).await {
                warn!(session_id = %session_id, error = %e, "failed to restore session watch");
            }
        }
    }

    /// Unwatch and park the current session.
    pub async fn suspend(&self) {
        let _serial = self.serial.lock().await;
        let previous = self.watched.lock().take();
        if let Some(session_id) = previous {
            self.send_unwatch(&session_id).await;
            debug!(session_id = %session_id, "parked session watch");
            *self.parked.lock() = Some(session_id);
        }
    }

    /// Watch the parked session again. Returns false if nothing was parked.
    ///
    /// When not connected the id is only recorded; the next connect sends it.
    pub async fn resume(&self) -> bool {
        let _serial = self.serial.lock().await;
        let parked = self.parked.lock().take();
        let Some(session_id) = parked else {
            return false;
        };
        *self.watched.lock() = Some(session_id.clone());
        if self.router.is_attached() {
            if let Err(e) = self.send_watch(&session_id).await {
                warn!(session_id = %session_id, error = %e, "failed to resume session watch");
            }
        }
        true
    }

    async fn send_watch(&self, session_id: &str) -> Result<()> {
        self.router
            .notify(methods::WATCH, Some(json!({ "sessionId": session_id })))
            .await
    }

    async fn send_unwatch(&self, session_id: &str) {
        if !self.router.is_attached() {
            return;
        }
        if let Err(e) = self
            .router
            .notify(methods::UNWATCH, Some(json!({ "sessionId": session_id })))
            .await
        {
            debug!(session_id, error = %e, "unwatch not delivered");
        }
    }
}

#[cfg(test)]
#[path = "watch_tests.rs"]
mod tests;
