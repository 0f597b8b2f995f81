// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! App lifecycle and network reachability hooks.

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use tether_core::ConnectionState;

use crate::connection::ConnectionManager;
use crate::reachability::{NetworkPath, PathChange};
use crate::transport::Transport;

impl<T: Transport> ConnectionManager<T> {
    /// The app came to the foreground.
    ///
    /// Re-enables automatic recovery with a fresh retry budget, verifies an
    /// existing link with a ping (reconnecting if it does not answer) and
    /// restores a session parked by [`enter_background`](Self::enter_background).
    pub async fn enter_foreground(&self) {
        let (link_id, wants_connection) = {
            let mut machine = self.inner.machine.lock();
            machine.auto_reconnect = true;
            machine.budget.reset();
            machine.cancel_cooldown();
            (machine.link_id(), machine.wants_connection)
        };
        info!("entering foreground");

        match link_id {
            Some(id) => {
                if self.verify_link(id).await {
                    self.resume_monitors(id);
                }
            }
            None if wants_connection => {
                self.reconnect();
            }
            None => {}
        }

        if self.inner.watch.resume().await {
            debug!("restored parked session watch");
        }
    }

    /// The app went to the background.
    ///
    /// Optionally parks the watched session first, then disables automatic
    /// recovery and stops the monitors, reconnect loop and cooldown. The
    /// link itself is left open.
    pub async fn enter_background(&self) {
        info!("entering background");
        if self.inner.config.unwatch_on_background {
            self.inner.watch.suspend().await;
        }

        let mut machine = self.inner.machine.lock();
        machine.auto_reconnect = false;
        machine.cancel_monitors();
        machine.cancel_reconnect_loop();
        machine.cancel_cooldown();
        if machine.state.is_reconnecting() {
            self.transition(&mut machine, ConnectionState::Disconnected);
        }
    }

    /// Report a network path change.
    pub async fn network_changed(&self, path: NetworkPath) {
        let (change, link_id) = {
            let mut machine = self.inner.machine.lock();
            let change = PathChange::between(machine.network, path);
            machine.network = Some(path);
            (change, machine.link_id())
        };

        match change {
            PathChange::Unchanged => {}
            PathChange::Lost => {
                info!("network path lost");
            }
            PathChange::Restored | PathChange::Handoff { .. } => {
                info!(?change, "network path available");
                match link_id {
                    Some(id) => {
                        self.verify_link(id).await;
                    }
                    None => self.restart_recovery(),
                }
            }
        }
    }

    /// Feed path changes from `paths` into
    /// [`network_changed`](Self::network_changed) until the sender is dropped.
    pub fn observe_network(&self, mut paths: watch::Receiver<NetworkPath>) -> JoinHandle<()> {
        let weak = std::sync::Arc::downgrade(&self.inner);
        tokio::spawn(async move {
            loop {
                let path = *paths.borrow_and_update();
                match weak.upgrade() {
                    Some(inner) => ConnectionManager { inner }.network_changed(path).await,
                    None => return,
                }
                if paths.changed().await.is_err() {
                    return;
                }
            }
        })
    }

    /// Fresh budget, no cooldown, new loop.
    fn restart_recovery(&self) {
        let mut machine = self.inner.machine.lock();
        if !(machine.wants_connection && machine.auto_reconnect) {
            return;
        }
        machine.cancel_reconnect_loop();
        machine.cancel_cooldown();
        machine.budget.reset();
        self.start_reconnect(&mut machine);
    }

    fn resume_monitors(&self, id: u64) {
        let token = {
            let mut machine = self.inner.machine.lock();
            if machine.link_id() != Some(id) || machine.monitors.is_some() {
                return;
            }
            self.install_monitors(&mut machine)
        };
        self.inner.activity.touch();
        self.spawn_monitors(id, token);
    }
}

#[cfg(test)]
#[path = "lifecycle_tests.rs"]
mod tests;
