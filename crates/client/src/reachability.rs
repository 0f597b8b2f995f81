// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Network reachability observation.
//!
//! The host reports network path changes (typically from a platform path
//! monitor). When no such hook exists, [`ReachabilityObserver::spawn_probe`]
//! derives reachability from periodic TCP connects to the agent's address.

use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::{Error, Result};

/// Kind of network interface carrying the current path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Interface {
    Wifi,
    Cellular,
    Wired,
    Other,
}

/// The device's current network path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NetworkPath {
    Available(Interface),
    Unavailable,
}

impl NetworkPath {
    pub fn is_available(&self) -> bool {
        matches!(self, NetworkPath::Available(_))
    }
}

/// How a path report differs from the previous one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathChange {
    /// Path came back (or was first reported available).
    Restored,
    /// Path went away.
    Lost,
    /// Still available, but over a different interface.
    Handoff { from: Interface, to: Interface },
    Unchanged,
}

impl PathChange {
    pub fn between(previous: Option<NetworkPath>, current: NetworkPath) -> Self {
        match (previous, current) {
            (Some(NetworkPath::Available(from)), NetworkPath::Available(to)) if from != to => {
                PathChange::Handoff { from, to }
            }
            (Some(NetworkPath::Available(_)), NetworkPath::Available(_)) => PathChange::Unchanged,
            (_, NetworkPath::Available(_)) => PathChange::Restored,
            (Some(NetworkPath::Unavailable), NetworkPath::Unavailable) => PathChange::Unchanged,
            (_, NetworkPath::Unavailable) => PathChange::Lost,
        }
    }
}

/// Publishes the current network path to any number of watchers.
#[derive(Debug, Clone)]
pub struct ReachabilityObserver {
    tx: Arc<watch::Sender<NetworkPath>>,
}

impl ReachabilityObserver {
    pub fn new(initial: NetworkPath) -> Self {
        let (tx, _) = watch::channel(initial);
        ReachabilityObserver { tx: Arc::new(tx) }
    }

    /// Report the current path. Returns true if it changed.
    pub fn report(&self, path: NetworkPath) -> bool {
        self.tx.send_if_modified(|current| {
            if *current == path {
                return false;
            }
            *current = path;
            true
        })
    }

    pub fn current(&self) -> NetworkPath {
        *self.tx.borrow()
    }

    /// Receiver suitable for `ConnectionManager::observe_network`.
    pub fn subscribe(&self) -> watch::Receiver<NetworkPath> {
        self.tx.subscribe()
    }

    /// Probe `target` (a ws:// or wss:// URL) with a TCP connect every
    /// `interval` and report the outcome until `cancel` fires.
    pub fn spawn_probe(
        &self,
        target: &str,
        interval: Duration,
        cancel: CancellationToken,
    ) -> Result<JoinHandle<()>> {
        let (host, port) = probe_address(target)?;
        let observer = self.clone();
        info!(host = %host, port, "starting reachability probe");

        Ok(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    _ = ticker.tick() => {}
                }
                let reachable = matches!(
                    tokio::time::timeout(interval, TcpStream::connect((host.as_str(), port))).await,
                    Ok(Ok(_))
                );
                let path = if reachable {
                    NetworkPath::Available(Interface::Other)
                } else {
                    NetworkPath::Unavailable
                };
                if observer.report(path) {
                    debug!(?path, "probe observed path change");
                }
            }
        }))
    }
}

/// Host and port a probe connects to for the given agent URL.
pub fn probe_address(target: &str) -> Result<(String, u16)> {
    let url = url::Url::parse(target).map_err(|e| Error::Config(format!("{}: {}", target, e)))?;
    let host = url
        .host_str()
        .ok_or_else(|| Error::Config(format!("{}: missing host", target)))?
        .trim_start_matches('[')
        .trim_end_matches(']')
        .to_string();
    let port = url
        .port_or_known_default()
        .ok_or_else(|| Error::Config(format!("{}: missing port", target)))?;
    Ok((host, port))
}

#[cfg(test)]
#[path = "reachability_tests.rs"]
mod tests;
