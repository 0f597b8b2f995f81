// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Subscriber registry for fan-out of state changes and inbound events.
//!
//! Every subscriber gets its own unbounded queue (or a callback), keyed by a
//! generated id. Publishing snapshots the subscriber set under the lock and
//! delivers with the lock released, so subscribers may unsubscribe from
//! anywhere, including from inside their own callback.

use std::collections::BTreeMap;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::task::{Context, Poll};

use futures_util::Stream;
use parking_lot::Mutex;
use tokio::sync::mpsc;

type Callback<T> = Arc<dyn Fn(&T) + Send + Sync>;

enum Sink<T> {
    Channel(mpsc::UnboundedSender<T>),
    Callback(Callback<T>),
}

impl<T> Clone for Sink<T> {
    fn clone(&self) -> Self {
        match self {
            Sink::Channel(tx) => Sink::Channel(tx.clone()),
            Sink::Callback(f) => Sink::Callback(Arc::clone(f)),
        }
    }
}

struct Shared<T> {
    next_id: AtomicU64,
    sinks: Mutex<BTreeMap<u64, Sink<T>>>,
}

impl<T> Shared<T> {
    fn remove(&self, id: u64) -> bool {
        self.sinks.lock().remove(&id).is_some()
    }
}

/// Registry of independent subscribers to values of type `T`.
pub struct SubscriberRegistry<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for SubscriberRegistry<T> {
    fn clone(&self) -> Self {
        SubscriberRegistry {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T: Clone + Send + 'static> SubscriberRegistry<T> {
    pub fn new() -> Self {
        SubscriberRegistry {
            shared: Arc::new(Shared {
                next_id: AtomicU64::new(1),
                sinks: Mutex::new(BTreeMap::new()),
            }),
        }
    }

    /// Subscribe with a dedicated queue.
    pub fn subscribe(&self) -> Subscription<T> {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.insert(Sink::Channel(tx));
        Subscription {
            id,
            rx,
            registry: Arc::downgrade(&self.shared),
        }
    }

    /// Subscribe with a queue that already holds `initial`.
    ///
    /// Callers that need the seed to be ordered before later publishes must
    /// hold whatever lock serializes those publishes.
    pub fn subscribe_seeded(&self, initial: T) -> Subscription<T> {
        let (tx, rx) = mpsc::unbounded_channel();
        let _ = tx.send(initial);
        let id = self.insert(Sink::Channel(tx));
        Subscription {
            id,
            rx,
            registry: Arc::downgrade(&self.shared),
        }
    }

    /// Subscribe with a callback invoked on the publishing task.
    pub fn subscribe_with<F>(&self, callback: F) -> CallbackHandle
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let id = self.insert(Sink::Callback(Arc::new(callback)));
        let registry: Weak<Shared<T>> = Arc::downgrade(&self.shared);
        CallbackHandle {
            id,
            cancel: Some(Box::new(move |id| {
                if let Some(shared) = registry.upgrade() {
                    shared.remove(id);
                }
            })),
        }
    }

    /// Remove a subscriber. Returns false if it was already gone.
    pub fn unsubscribe(&self, id: u64) -> bool {
        self.shared.remove(id)
    }

    /// Deliver `value` to every current subscriber.
    pub fn publish(&self, value: &T) {
        let snapshot: Vec<(u64, Sink<T>)> = self
            .shared
            .sinks
            .lock()
            .iter()
            .map(|(id, sink)| (*id, sink.clone()))
            .collect();

        let mut closed = Vec::new();
        for (id, sink) in snapshot {
            if !self.shared.sinks.lock().contains_key(&id) {
                continue;
            }
            match sink {
                Sink::Channel(tx) => {
                    if tx.send(value.clone()).is_err() {
                        closed.push(id);
                    }
                }
                Sink::Callback(callback) => callback(value),
            }
        }

        if !closed.is_empty() {
            let mut sinks = self.shared.sinks.lock();
            for id in closed {
                sinks.remove(&id);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.shared.sinks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn insert(&self, sink: Sink<T>) -> u64 {
        let id = self.shared.next_id.fetch_add(1, Ordering::Relaxed);
        self.shared.sinks.lock().insert(id, sink);
        id
    }
}

impl<T: Clone + Send + 'static> Default for SubscriberRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// A queue-backed subscription. Dropping it unsubscribes.
pub struct Subscription<T> {
    id: u64,
    rx: mpsc::UnboundedReceiver<T>,
    registry: Weak<Shared<T>>,
}

impl<T> Subscription<T> {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Wait for the next value. Returns `None` once the registry is gone.
    pub async fn recv(&mut self) -> Option<T> {
        self.rx.recv().await
    }

    /// Take the next value if one is already queued.
    pub fn try_recv(&mut self) -> Option<T> {
        self.rx.try_recv().ok()
    }
}

impl<T> Stream for Subscription<T> {
    type Item = T;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<T>> {
        self.get_mut().rx.poll_recv(cx)
    }
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        if let Some(shared) = self.registry.upgrade() {
            shared.remove(self.id);
        }
    }
}

impl<T> std::fmt::Debug for Subscription<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}

/// Handle for a callback subscriber. Dropping it unsubscribes.
pub struct CallbackHandle {
    id: u64,
    cancel: Option<Box<dyn FnOnce(u64) + Send + Sync>>,
}

impl CallbackHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Remove the callback. Safe to call from inside the callback itself.
    pub fn cancel(mut self) {
        self.run_cancel();
    }

    fn run_cancel(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel(self.id);
        }
    }
}

impl Drop for CallbackHandle {
    fn drop(&mut self) {
        self.run_cancel();
    }
}

impl std::fmt::Debug for CallbackHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackHandle").field("id", &self.id).finish()
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
