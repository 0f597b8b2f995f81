// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Activity clock for staleness detection.

use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;

/// Tracks when the link last carried inbound traffic and when a ping last
/// succeeded.
#[derive(Debug)]
pub struct ActivityClock {
    marks: Mutex<Marks>,
}

#[derive(Debug, Clone, Copy)]
struct Marks {
    last_inbound: Instant,
    last_ping: Option<Instant>,
}

impl ActivityClock {
    pub fn new() -> Self {
        ActivityClock {
            marks: Mutex::new(Marks {
                last_inbound: Instant::now(),
                last_ping: None,
            }),
        }
    }

    /// Record inbound traffic (any frame, heartbeats included).
    pub fn touch(&self) {
        self.marks.lock().last_inbound = Instant::now();
    }

    /// Record a successful ping.
    pub fn record_ping(&self) {
        self.marks.lock().last_ping = Some(Instant::now());
    }

    /// Restart both marks for a newly installed link.
    pub fn reset(&self) {
        let mut marks = self.marks.lock();
        marks.last_inbound = Instant::now();
        marks.last_ping = None;
    }

    pub fn since_inbound(&self) -> Duration {
        self.marks.lock().last_inbound.elapsed()
    }

    /// Time since the last successful ping, if any ping succeeded on this link.
    pub fn since_ping(&self) -> Option<Duration> {
        self.marks.lock().last_ping.map(|at| at.elapsed())
    }

    /// True when no inbound traffic arrived within `timeout`.
    pub fn is_stale(&self, timeout: Duration) -> bool {
        self.since_inbound() > timeout
    }
}

impl Default for ActivityClock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[path = "activity_tests.rs"]
mod tests;
