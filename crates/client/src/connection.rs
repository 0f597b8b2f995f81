// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Connection state machine.
//!
//! [`ConnectionManager`] owns the single link to the agent. It opens and
//! confirms links, watches them for staleness, and runs the bounded
//! reconnect loop with a long cooldown once the retry budget is spent.
//!
//! Locking:
//! - `machine` (parking_lot) guards state, budget, intent and task tokens.
//!   It is never held across an `.await`, and state changes are published
//!   while it is held so every subscriber sees them in order.
//! - `connect_lock` (tokio) serializes link establishment.
//!
//! Every installed link gets a generation id. Reader and monitor tasks
//! compare it with the current link before acting, so events from a
//! replaced socket are ignored. Background tasks hold `Weak` references and
//! stop once every manager handle is dropped.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value;
use tether_core::{ConnectionState, Endpoint, ServerEvent};
use tokio::sync::mpsc;
use tokio::time::{interval_at, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::activity::ActivityClock;
use crate::backoff::RetryBudget;
use crate::config::{validate_url, ClientConfig};
use crate::error::{Error, Result};
use crate::reachability::NetworkPath;
use crate::registry::{CallbackHandle, SubscriberRegistry, Subscription};
use crate::router::MessageRouter;
use crate::transport::{
    Link, LinkEvent, Opened, Transport, TransportError, WebSocketTransport, NORMAL_CLOSURE,
};
use crate::watch::SessionWatchTracker;

/// Handle to the connection manager. Cheap to clone; all clones share one
/// connection.
pub struct ConnectionManager<T: Transport = WebSocketTransport> {
    pub(crate) inner: Arc<Inner<T>>,
}

impl<T: Transport> Clone for ConnectionManager<T> {
    fn clone(&self) -> Self {
        ConnectionManager {
            inner: Arc::clone(&self.inner),
        }
    }
}

pub(crate) struct Inner<T> {
    pub(crate) config: ClientConfig,
    transport: T,
    pub(crate) machine: Mutex<Machine>,
    connect_lock: tokio::sync::Mutex<()>,
    states: SubscriberRegistry<ConnectionState>,
    pub(crate) router: Arc<MessageRouter>,
    pub(crate) activity: Arc<ActivityClock>,
    pub(crate) watch: SessionWatchTracker,
    next_link: AtomicU64,
}

/// Mutable connection bookkeeping, guarded by `Inner::machine`.
pub(crate) struct Machine {
    pub(crate) state: ConnectionState,
    /// URL to (re)connect to.
    target: Option<String>,
    pub(crate) link: Option<ActiveLink>,
    pub(crate) budget: RetryBudget,
    /// Bumped by `disconnect` so in-flight establishes can tell they were
    /// abandoned.
    epoch: u64,
    reconnect_loop: Option<(u64, CancellationToken)>,
    loop_seq: u64,
    pub(crate) cooldown: Option<CancellationToken>,
    pub(crate) monitors: Option<CancellationToken>,
    /// Set by `connect`, cleared by `disconnect`.
    pub(crate) wants_connection: bool,
    /// Cleared while the app is in the background.
    pub(crate) auto_reconnect: bool,
    pub(crate) network: Option<NetworkPath>,
}

impl Machine {
    fn owns_loop(&self, loop_id: u64) -> bool {
        matches!(&self.reconnect_loop, Some((id, _)) if *id == loop_id)
    }

    /// Whether an establish started under `epoch`, by reconnect loop
    /// `loop_id` if any, may still install its link.
    fn may_install(&self, epoch: u64, loop_id: Option<u64>) -> bool {
        if self.epoch != epoch || !self.wants_connection {
            return false;
        }
        match loop_id {
            Some(id) => self.auto_reconnect && self.owns_loop(id),
            None => true,
        }
    }

    pub(crate) fn link_id(&self) -> Option<u64> {
        self.link.as_ref().map(|active| active.id)
    }

    pub(crate) fn cancel_reconnect_loop(&mut self) {
        if let Some((_, token)) = self.reconnect_loop.take() {
            token.cancel();
        }
    }

    pub(crate) fn cancel_cooldown(&mut self) {
        if let Some(token) = self.cooldown.take() {
            token.cancel();
        }
    }

    pub(crate) fn cancel_monitors(&mut self) {
        if let Some(token) = self.monitors.take() {
            token.cancel();
        }
    }
}

/// One installed link and its generation id.
pub(crate) struct ActiveLink {
    pub(crate) id: u64,
    pub(crate) link: Arc<dyn Link>,
}

impl ConnectionManager<WebSocketTransport> {
    /// Create a manager that connects over WebSocket.
    pub fn new(config: ClientConfig) -> Self {
        Self::with_transport(config, WebSocketTransport::new())
    }
}

impl<T: Transport> ConnectionManager<T> {
    /// Create a manager over a custom transport.
    pub fn with_transport(config: ClientConfig, transport: T) -> Self {
        let activity = Arc::new(ActivityClock::new());
        let router = Arc::new(MessageRouter::new(Arc::clone(&activity)));
        let budget = config.retry_budget();
        ConnectionManager {
            inner: Arc::new(Inner {
                transport,
                machine: Mutex::new(Machine {
                    state: ConnectionState::Disconnected,
                    target: config.url.clone(),
                    link: None,
                    budget,
                    epoch: 0,
                    reconnect_loop: None,
                    loop_seq: 0,
                    cooldown: None,
                    monitors: None,
                    wants_connection: false,
                    auto_reconnect: true,
                    network: None,
                }),
                connect_lock: tokio::sync::Mutex::new(()),
                states: SubscriberRegistry::new(),
                watch: SessionWatchTracker::new(Arc::clone(&router)),
                router,
                activity,
                next_link: AtomicU64::new(1),
                config,
            }),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        self.inner.machine.lock().state.clone()
    }

    /// Stream of state changes, starting with the current state.
    pub fn state_stream(&self) -> Subscription<ConnectionState> {
        let machine = self.inner.machine.lock();
        self.inner.states.subscribe_seeded(machine.state.clone())
    }

    /// Subscribe to inbound events (heartbeats excluded).
    pub fn subscribe_events(&self) -> Subscription<ServerEvent> {
        self.inner.router.events().subscribe()
    }

    /// Register an event callback. It runs on the reader task and must not
    /// block.
    pub fn on_event<F>(&self, callback: F) -> CallbackHandle
    where
        F: Fn(&ServerEvent) + Send + Sync + 'static,
    {
        self.inner.router.events().subscribe_with(callback)
    }

    /// Send a request with the configured default timeout.
    pub async fn request(&self, method: &str, params: Option<Value>) -> Result<Value> {
        self.request_with_timeout(method, params, self.inner.config.request_timeout())
            .await
    }

    pub async fn request_with_timeout(
        &self,
        method: &str,
        params: Option<Value>,
        timeout: Duration,
    ) -> Result<Value> {
        self.inner.router.request(method, params, timeout).await
    }

    /// Send a raw frame.
    pub async fn send(&self, frame: impl Into<String>) -> Result<()> {
        self.inner.router.send(frame.into()).await
    }

    /// Fire-and-forget command.
    pub async fn notify(&self, method: &str, params: Option<Value>) -> Result<()> {
        self.inner.router.notify(method, params).await
    }

    pub async fn watch(&self, session_id: &str) -> Result<()> {
        self.inner.watch.watch(session_id).await
    }

    pub async fn unwatch(&self) -> Result<()> {
        self.inner.watch.unwatch().await
    }

    pub fn watched_session(&self) -> Option<String> {
        self.inner.watch.current()
    }

    /// Attempts consumed from the retry budget.
    pub fn retry_attempts(&self) -> u32 {
        self.inner.machine.lock().budget.attempts()
    }

    /// Attempts allowed before the cooldown.
    pub fn max_attempts(&self) -> u32 {
        self.inner.machine.lock().budget.max_attempts()
    }

    /// True while a cooldown retry is scheduled.
    pub fn cooldown_pending(&self) -> bool {
        self.inner.machine.lock().cooldown.is_some()
    }

    /// True while the reconnect loop runs.
    pub fn reconnecting(&self) -> bool {
        self.inner.machine.lock().reconnect_loop.is_some()
    }

    /// Requests waiting for a response.
    pub fn pending_requests(&self) -> usize {
        self.inner.router.pending_count()
    }

    /// Connect to `url`.
    ///
    /// Opens a link and confirms it with a ping within the connect timeout.
    /// On failure the state becomes `Failed` and the error is returned;
    /// this call never starts the reconnect loop.
    pub async fn connect(&self, url: &str) -> Result<()> {
        validate_url(url)?;
        let epoch = {
            let mut machine = self.inner.machine.lock();
            if is_connected_to(&machine, url) {
                return Ok(());
            }
            machine.target = Some(url.to_string());
            machine.wants_connection = true;
            if machine.reconnect_loop.is_none() {
                machine.budget.reset();
            }
            machine.cancel_cooldown();
            self.transition(&mut machine, ConnectionState::Connecting);
            machine.epoch
        };
        info!(url, "connecting");

        match self.establish(url, epoch, None).await {
            Ok(()) => Ok(()),
            Err(Error::Cancelled) => Err(Error::Cancelled),
            Err(e) => {
                warn!(url, error = %e, "connect failed");
                let mut machine = self.inner.machine.lock();
                if machine.epoch == epoch && machine.link.is_none() {
                    self.transition(
                        &mut machine,
                        ConnectionState::Failed {
                            reason: e.to_string(),
                        },
                    );
                }
                Err(e)
            }
        }
    }

    /// Close the link and stop all recovery. Idempotent.
    pub async fn disconnect(&self) {
        let link = {
            let mut machine = self.inner.machine.lock();
            machine.wants_connection = false;
            machine.epoch += 1;
            machine.cancel_reconnect_loop();
            machine.cancel_cooldown();
            machine.cancel_monitors();
            self.inner.router.detach();
            self.transition(&mut machine, ConnectionState::Disconnected);
            machine.link.take()
        };
        if let Some(active) = link {
            info!(link = active.id, "disconnecting");
            active
                .link
                .close(NORMAL_CLOSURE, "client disconnect".to_string())
                .await;
        }
    }

    /// Start the reconnect loop.
    ///
    /// Returns false without doing anything when a loop is already running
    /// or no target is known. Must be called within a Tokio runtime.
    pub fn reconnect(&self) -> bool {
        let mut machine = self.inner.machine.lock();
        machine.wants_connection = machine.target.is_some();
        self.start_reconnect(&mut machine)
    }

    /// Ping the current link. Returns whether the peer answered within the
    /// ping timeout.
    pub async fn ping(&self) -> bool {
        let link = {
            let machine = self.inner.machine.lock();
            machine.link.as_ref().map(|active| Arc::clone(&active.link))
        };
        match link {
            Some(link) => self.check_link(link).await,
            None => false,
        }
    }

    async fn check_link(&self, link: Arc<dyn Link>) -> bool {
        let timeout = self.inner.config.ping_timeout();
        match tokio::time::timeout(timeout, link.ping()).await {
            Ok(Ok(())) => {
                self.inner.activity.record_ping();
                true
            }
            Ok(Err(e)) => {
                debug!(error = %e, "ping failed");
                false
            }
            Err(_) => {
                debug!(?timeout, "ping timed out");
                false
            }
        }
    }

    /// Ping link `id`; on failure treat it as lost. Returns whether it is
    /// still healthy.
    pub(crate) async fn verify_link(&self, id: u64) -> bool {
        let link = {
            let machine = self.inner.machine.lock();
            match &machine.link {
                Some(active) if active.id == id => Arc::clone(&active.link),
                _ => return false,
            }
        };
        if self.check_link(link).await {
            return true;
        }
        self.link_lost(id, TransportError::Stale("ping not acknowledged".into()));
        false
    }

    pub(crate) fn transition(&self, machine: &mut Machine, next: ConnectionState) {
        if machine.state == next {
            return;
        }
        info!(from = %machine.state, to = %next, "connection state");
        machine.state = next.clone();
        self.inner.states.publish(&next);
    }

    /// Open, confirm and install a link to `url`.
    ///
    /// `loop_id` names the reconnect loop making the attempt. Its link is
    /// discarded if the loop was cancelled while the open was in flight.
    async fn establish(&self, url: &str, epoch: u64, loop_id: Option<u64>) -> Result<()> {
        let _serial = self.inner.connect_lock.lock().await;
        {
            let machine = self.inner.machine.lock();
            if !machine.may_install(epoch, loop_id) {
                return Err(Error::Cancelled);
            }
            if is_connected_to(&machine, url) {
                return Ok(());
            }
        }

        let timeout = self.inner.config.connect_timeout();
        let attempt = async {
            let opened = self.inner.transport.open(url).await?;
            opened.link.ping().await?;
            Ok::<Opened, TransportError>(opened)
        };
        let Opened { link, events } = match tokio::time::timeout(timeout, attempt).await {
            Ok(result) => result?,
            Err(_) => return Err(Error::ConnectTimeout(timeout)),
        };

        let id = self.inner.next_link.fetch_add(1, Ordering::Relaxed);
        let installed = {
            let mut machine = self.inner.machine.lock();
            if !machine.may_install(epoch, loop_id) {
                None
            } else {
                let replaced = machine.link.replace(ActiveLink {
                    id,
                    link: Arc::clone(&link),
                });
                machine.budget.reset();
                machine.cancel_reconnect_loop();
                machine.cancel_cooldown();
                self.inner.router.attach(Arc::clone(&link));
                self.inner.activity.reset();
                let monitors = self.install_monitors(&mut machine);
                self.transition(&mut machine, ConnectionState::Connected(Endpoint::new(url)));
                Some((replaced, monitors))
            }
        };
        let Some((replaced, monitors)) = installed else {
            debug!(link = id, "connect abandoned");
            link.close(NORMAL_CLOSURE, "connect abandoned".to_string())
                .await;
            return Err(Error::Cancelled);
        };
        info!(url, link = id, "connected");

        if let Some(old) = replaced {
            old.link
                .close(NORMAL_CLOSURE, "replaced".to_string())
                .await;
        }
        self.spawn_reader(id, events);
        self.spawn_monitors(id, monitors);
        self.inner.watch.restore().await;
        Ok(())
    }

    /// Handle the loss of link `id`.
    ///
    /// Transient failures go straight to reconnecting; anything else is
    /// surfaced as `Failed` first. Reports about a replaced link are
    /// ignored.
    pub(crate) fn link_lost(&self, id: u64, err: TransportError) {
        let mut machine = self.inner.machine.lock();
        if machine.link_id() != Some(id) {
            debug!(link = id, error = %err, "ignoring report from replaced link");
            return;
        }
        machine.link = None;
        machine.cancel_monitors();
        self.inner.router.detach();

        let transient = err.is_transient();
        warn!(link = id, error = %err, transient, "link lost");
        let recover = machine.wants_connection && machine.auto_reconnect;
        if !transient || !recover {
            self.transition(
                &mut machine,
                ConnectionState::Failed {
                    reason: err.to_string(),
                },
            );
        }
        if recover {
            self.start_reconnect(&mut machine);
        }
    }

    /// Spawn the reconnect loop unless one is already running.
    pub(crate) fn start_reconnect(&self, machine: &mut Machine) -> bool {
        if machine.reconnect_loop.is_some() {
            debug!("reconnect loop already running");
            return false;
        }
        if machine.target.is_none() {
            warn!("reconnect requested without a target");
            return false;
        }
        machine.cancel_cooldown();
        if machine.budget.is_exhausted() {
            machine.budget.reset();
        }
        machine.loop_seq += 1;
        let loop_id = machine.loop_seq;
        let token = CancellationToken::new();
        machine.reconnect_loop = Some((loop_id, token.clone()));
        let attempt = machine.budget.attempts() + 1;
        self.transition(machine, ConnectionState::Reconnecting { attempt });

        let weak = Arc::downgrade(&self.inner);
        tokio::spawn(reconnect_loop(weak, loop_id, token));
        true
    }

    /// The budget ran out: surface `Failed` and schedule one cooldown retry.
    fn exhausted(&self, loop_id: u64) {
        let mut machine = self.inner.machine.lock();
        if !machine.owns_loop(loop_id) {
            return;
        }
        machine.reconnect_loop = None;
        let attempts = machine.budget.attempts();
        self.transition(
            &mut machine,
            ConnectionState::Failed {
                reason: format!("gave up after {} attempts", attempts),
            },
        );

        machine.cancel_cooldown();
        let token = CancellationToken::new();
        machine.cooldown = Some(token.clone());
        let delay = self.inner.config.cooldown();
        info!(?delay, "retry budget exhausted, scheduling cooldown retry");

        let weak = Arc::downgrade(&self.inner);
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => return,
                _ = tokio::time::sleep(delay) => {}
            }
            let Some(manager) = upgrade(&weak) else {
                return;
            };
            let mut machine = manager.inner.machine.lock();
            if token.is_cancelled() {
                return;
            }
            machine.cooldown = None;
            if machine.wants_connection && machine.auto_reconnect {
                info!("cooldown elapsed, retrying");
                machine.budget.reset();
                manager.start_reconnect(&mut machine);
            }
        });
    }

    fn finish_loop(&self, loop_id: u64) {
        let mut machine = self.inner.machine.lock();
        if machine.owns_loop(loop_id) {
            machine.reconnect_loop = None;
        }
    }

    /// Replace the monitor token for a newly installed or resumed link.
    pub(crate) fn install_monitors(&self, machine: &mut Machine) -> CancellationToken {
        machine.cancel_monitors();
        let token = CancellationToken::new();
        machine.monitors = Some(token.clone());
        token
    }

    fn spawn_reader(&self, id: u64, mut events: mpsc::UnboundedReceiver<LinkEvent>) {
        let weak = Arc::downgrade(&self.inner);
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                let Some(manager) = upgrade(&weak) else {
                    return;
                };
                if manager.inner.machine.lock().link_id() != Some(id) {
                    debug!(link = id, "reader stopping for replaced link");
                    return;
                }
                match event {
                    LinkEvent::Frame(frame) => manager.inner.router.handle_frame(&frame),
                    LinkEvent::Closed { code, reason } => {
                        info!(link = id, ?code, reason = %reason, "link closed by peer");
                        manager.link_lost(id, TransportError::ConnectionClosed);
                        return;
                    }
                    LinkEvent::Failed(err) => {
                        manager.link_lost(id, err);
                        return;
                    }
                }
            }
            if let Some(manager) = upgrade(&weak) {
                manager.link_lost(id, TransportError::ConnectionClosed);
            }
        });
    }

    /// Staleness check and periodic ping for link `id`.
    pub(crate) fn spawn_monitors(&self, id: u64, token: CancellationToken) {
        let weak = Arc::downgrade(&self.inner);
        let check_every = self.inner.config.stale_check_interval();
        let heartbeat_timeout = self.inner.config.heartbeat_timeout();
        let ping_every = self.inner.config.ping_interval();

        tokio::spawn(async move {
            let mut stale_tick = interval_at(Instant::now() + check_every, check_every);
            let mut ping_tick = ping_every.map(|every| interval_at(Instant::now() + every, every));
            loop {
                let ping_due = async {
                    match ping_tick.as_mut() {
                        Some(tick) => {
                            tick.tick().await;
                        }
                        None => std::future::pending::<()>().await,
                    }
                };
                tokio::select! {
                    _ = token.cancelled() => return,
                    _ = stale_tick.tick() => {
                        let Some(manager) = upgrade(&weak) else {
                            return;
                        };
                        if manager.inner.activity.is_stale(heartbeat_timeout) {
                            let silent = manager.inner.activity.since_inbound();
                            warn!(link = id, ?silent, "no inbound traffic, link is stale");
                            manager.link_lost(
                                id,
                                TransportError::Stale(format!("no inbound traffic for {:?}", silent)),
                            );
                            return;
                        }
                    }
                    _ = ping_due => {
                        let Some(manager) = upgrade(&weak) else {
                            return;
                        };
                        let recent = manager
                            .inner
                            .activity
                            .since_ping()
                            .zip(ping_every)
                            .is_some_and(|(age, every)| age < every);
                        if recent {
                            debug!(link = id, "link verified recently, skipping ping");
                            continue;
                        }
                        if !manager.verify_link(id).await {
                            return;
                        }
                    }
                }
            }
        });
    }
}

fn is_connected_to(machine: &Machine, url: &str) -> bool {
    machine.link.is_some()
        && matches!(&machine.state, ConnectionState::Connected(endpoint) if endpoint.url == url)
}

fn upgrade<T: Transport>(weak: &Weak<Inner<T>>) -> Option<ConnectionManager<T>> {
    weak.upgrade().map(|inner| ConnectionManager { inner })
}

/// Reconnect loop body.
///
/// Each iteration takes one attempt from the budget, tears down any stale
/// link, waits out the backoff (cancellable) and tries to establish.
async fn reconnect_loop<T: Transport>(
    weak: Weak<Inner<T>>,
    loop_id: u64,
    token: CancellationToken,
) {
    loop {
        let Some(manager) = upgrade(&weak) else {
            return;
        };
        let step = {
            let mut machine = manager.inner.machine.lock();
            if token.is_cancelled() || !machine.owns_loop(loop_id) {
                return;
            }
            match machine.budget.next_attempt() {
                Some(attempt) => {
                    let stale = machine.link.take();
                    if stale.is_some() {
                        machine.cancel_monitors();
                        manager.inner.router.detach();
                    }
                    manager.transition(&mut machine, ConnectionState::Reconnecting { attempt });
                    let delay = machine.budget.delay_for(attempt);
                    Some((attempt, delay, machine.target.clone(), machine.epoch, stale))
                }
                None => None,
            }
        };
        let Some((attempt, delay, target, epoch, stale)) = step else {
            manager.exhausted(loop_id);
            return;
        };
        if let Some(stale) = stale {
            stale
                .link
                .close(NORMAL_CLOSURE, "reconnecting".to_string())
                .await;
        }
        drop(manager);

        debug!(attempt, ?delay, "waiting before reconnect attempt");
        tokio::select! {
            _ = token.cancelled() => {
                debug!(attempt, "reconnect loop cancelled");
                return;
            }
            _ = tokio::time::sleep(delay) => {}
        }

        let Some(manager) = upgrade(&weak) else {
            return;
        };
        let Some(target) = target else {
            manager.finish_loop(loop_id);
            return;
        };
        match manager.establish(&target, epoch, Some(loop_id)).await {
            Ok(()) => {
                manager.finish_loop(loop_id);
                return;
            }
            Err(Error::Cancelled) => {
                manager.finish_loop(loop_id);
                return;
            }
            Err(e) => warn!(attempt, error = %e, "reconnect attempt failed"),
        }
    }
}

#[cfg(test)]
#[path = "connection_tests.rs"]
mod tests;
