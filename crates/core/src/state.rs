// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Connection state model.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The endpoint of an established connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    /// URL the link was opened against.
    pub url: String,
    /// When the link was confirmed.
    pub connected_at: DateTime<Utc>,
}

impl Endpoint {
    pub fn new(url: impl Into<String>) -> Self {
        Endpoint {
            url: url.into(),
            connected_at: Utc::now(),
        }
    }
}

/// Current state of the connection to the remote agent.
///
/// Exactly one state is current at a time. Only the connection manager
/// performs transitions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ConnectionState {
    /// No link and no intent to connect.
    #[default]
    Disconnected,
    /// A fresh connection attempt is in progress.
    Connecting,
    /// Link established and confirmed.
    Connected(Endpoint),
    /// Automatic recovery is running; `attempt` starts at 1.
    Reconnecting { attempt: u32 },
    /// The last attempt failed.
    Failed { reason: String },
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected(_))
    }

    pub fn is_reconnecting(&self) -> bool {
        matches!(self, ConnectionState::Reconnecting { .. })
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, ConnectionState::Failed { .. })
    }

    /// Returns the endpoint when connected.
    pub fn endpoint(&self) -> Option<&Endpoint> {
        match self {
            ConnectionState::Connected(endpoint) => Some(endpoint),
            _ => None,
        }
    }

    /// Human-readable status line.
    ///
    /// `max_attempts` is shown next to the reconnect attempt counter.
    pub fn status_line(&self, max_attempts: u32) -> String {
        match self {
            ConnectionState::Disconnected => "disconnected".to_string(),
            ConnectionState::Connecting => "connecting".to_string(),
            ConnectionState::Connected(endpoint) => format!("connected to {}", endpoint.url),
            ConnectionState::Reconnecting { attempt } => {
                format!("reconnecting (attempt {}/{})", attempt, max_attempts)
            }
            ConnectionState::Failed { reason } => format!("unreachable: {}", reason),
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "disconnected"),
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Connected(endpoint) => write!(f, "connected ({})", endpoint.url),
            ConnectionState::Reconnecting { attempt } => write!(f, "reconnecting #{}", attempt),
            ConnectionState::Failed { reason } => write!(f, "failed: {}", reason),
        }
    }
}

#[cfg(test)]
#[path = "state_tests.rs"]
mod tests;
