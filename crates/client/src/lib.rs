// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! tether: resilient real-time connection to a remote agent
//!
//! [`ConnectionManager`] keeps one bidirectional link to the agent alive
//! across flaky mobile networks. It detects stale links, reconnects with
//! bounded backoff, and multiplexes inbound events and outbound
//! request/response traffic over that single link.
//!
//! ```no_run
//! # async fn demo() -> tether::Result<()> {
//! use tether::{ClientConfig, ConnectionManager};
//!
//! let manager = ConnectionManager::new(ClientConfig::default());
//! let mut states = manager.state_stream();
//! manager.connect("ws://127.0.0.1:8082/ws").await?;
//! manager.watch("sess_1").await?;
//! let sessions = manager.request("session.list", None).await?;
//! # let _ = (states.try_recv(), sessions);
//! # Ok(())
//! # }
//! ```

pub mod activity;
pub mod backoff;
pub mod config;
pub mod connection;
pub mod error;
mod lifecycle;
pub mod reachability;
pub mod registry;
pub mod router;
pub mod transport;
pub mod watch;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use activity::ActivityClock;
pub use backoff::RetryBudget;
pub use config::ClientConfig;
pub use connection::ConnectionManager;
pub use error::{Error, Result};
pub use reachability::{Interface, NetworkPath, PathChange, ReachabilityObserver};
pub use registry::{CallbackHandle, SubscriberRegistry, Subscription};
pub use router::MessageRouter;
pub use transport::{
    Link, LinkEvent, Opened, Transport, TransportError, TransportResult, WebSocketTransport,
};
pub use watch::SessionWatchTracker;

pub use tether_core::{ConnectionState, Endpoint, ServerEvent};
