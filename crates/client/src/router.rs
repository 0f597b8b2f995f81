// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Inbound dispatch and request/response correlation.
//!
//! Every inbound frame touches the activity clock and is split into
//! newline-delimited records. Heartbeats stop there, responses resolve their
//! pending request, and events fan out to subscribers. Outbound requests get
//! a `req_<n>` id and wait for the matching response or their timeout.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use tether_core::jsonl;
use tether_core::{ClientRequest, InboundRecord, RpcResponse, ServerEvent};
use tokio::sync::oneshot;
use tracing::{debug, trace, warn};

use crate::activity::ActivityClock;
use crate::error::{Error, Result};
use crate::registry::SubscriberRegistry;
use crate::transport::Link;

type PendingTable = Mutex<HashMap<String, oneshot::Sender<RpcResponse>>>;

/// Routes traffic between the current link and its consumers.
pub struct MessageRouter {
    link: RwLock<Option<Arc<dyn Link>>>,
    pending: PendingTable,
    next_id: AtomicU64,
    events: SubscriberRegistry<ServerEvent>,
    activity: Arc<ActivityClock>,
}

impl MessageRouter {
    pub fn new(activity: Arc<ActivityClock>) -> Self {
        MessageRouter {
            link: RwLock::new(None),
            pending: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            events: SubscriberRegistry::new(),
            activity,
        }
    }

    /// Route outbound traffic through `link`.
    pub fn attach(&self, link: Arc<dyn Link>) {
        *self.link.write() = Some(link);
    }

    /// Stop routing outbound traffic. Pending requests keep waiting for
    /// their own timeout.
    pub fn detach(&self) -> Option<Arc<dyn Link>> {
        self.link.write().take()
    }

    pub fn is_attached(&self) -> bool {
        self.link.read().is_some()
    }

    /// Registry of inbound event subscribers.
    pub fn events(&self) -> &SubscriberRegistry<ServerEvent> {
        &self.events
    }

    /// Number of requests waiting for a response.
    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    /// Send a raw frame.
    pub async fn send(&self, frame: String) -> Result<()> {
        let link = self.current_link()?;
        link.send(frame).await?;
        Ok(())
    }

    /// Send a command without waiting for its response.
    ///
    /// Any response the agent sends is dropped as uncorrelated.
    pub async fn notify(&self, method: &str, params: Option<Value>) -> Result<()> {
        let request = ClientRequest::new(self.next_request_id(), method, params);
        trace!(id = %request.id, method, "notify");
        self.send(request.to_json()?).await
    }

    /// Send a request and wait for its response.
    ///
    /// The pending entry is registered before the frame is sent and removed
    /// exactly once, by the response or when this future completes or is
    /// dropped.
    pub async fn request(
        &self,
        method: &str,
        params: Option<Value>,
        timeout: Duration,
    ) -> Result<Value> {
        let link = self.current_link()?;
        let request = ClientRequest::new(self.next_request_id(), method, params);
        let frame = request.to_json()?;

        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(request.id.clone(), tx);
        let _guard = PendingGuard {
            pending: &self.pending,
            id: &request.id,
        };
        debug!(id = %request.id, method, "request");

        let exchange = async {
            link.send(frame).await?;
            rx.await.map_err(|_| Error::Cancelled)
        };
        let response = match tokio::time::timeout(timeout, exchange).await {
            Ok(result) => result?,
            Err(_) => {
                warn!(id = %request.id, method, ?timeout, "request timed out");
                return Err(Error::RequestTimeout {
                    method: method.to_string(),
                    timeout,
                });
            }
        };

        into_result(response)
    }

    /// Dispatch one inbound frame.
    pub fn handle_frame(&self, frame: &str) {
        self.activity.touch();
        for record in jsonl::records(frame) {
            match InboundRecord::parse(record) {
                Ok(InboundRecord::Heartbeat) => trace!("heartbeat"),
                Ok(InboundRecord::Response(response)) => self.resolve(response),
                Ok(InboundRecord::Event(event)) => {
                    trace!(event_type = %event.event_type, "event");
                    self.events.publish(&event);
                }
                Err(e) => warn!(error = %e, "skipping malformed record"),
            }
        }
    }

    fn resolve(&self, response: RpcResponse) {
        let waiter = self.pending.lock().remove(&response.id);
        match waiter {
            Some(tx) => {
                if tx.send(response).is_err() {
                    debug!("requester went away before its response arrived");
                }
            }
            None => debug!(id = %response.id, "dropping uncorrelated response"),
        }
    }

    fn current_link(&self) -> Result<Arc<dyn Link>> {
        self.link.read().as_ref().map(Arc::clone).ok_or(Error::NotConnected)
    }

    fn next_request_id(&self) -> String {
        format!("req_{}", self.next_id.fetch_add(1, Ordering::Relaxed))
    }
}

fn into_result(response: RpcResponse) -> Result<Value> {
    if response.success {
        return Ok(response.result.unwrap_or(Value::Null));
    }
    match response.error {
        Some(body) => Err(Error::Remote {
            code: body.code,
            message: body.message,
        }),
        None => Err(Error::Remote {
            code: "UNKNOWN".to_string(),
            message: "request failed without an error body".to_string(),
        }),
    }
}

/// Removes a pending entry when the waiting request finishes or is dropped.
struct PendingGuard<'a> {
    pending: &'a PendingTable,
    id: &'a str,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.pending.lock().remove(self.id);
    }
}

#[cfg(test)]
#[path = "router_tests.rs"]
mod tests;
