// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Wire records exchanged with the remote agent.
//!
//! The protocol is simple:
//! - Client sends requests: `{"id", "method", "params"}`
//! - Agent answers with responses correlated by `id`
//! - Agent pushes events tagged with a `type`, some of which are heartbeats

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};

/// Event types the agent uses as liveness markers.
///
/// Heartbeats only reset the activity clock and are never forwarded to event
/// subscribers.
pub const HEARTBEAT_TYPES: &[&str] = &["heartbeat", "system.heartbeat", "connection.heartbeat"];

/// Method names used by the connection core itself.
pub mod methods {
    /// Subscribe this connection to targeted updates for one session.
    pub const WATCH: &str = "session.watch";
    /// Drop the current session subscription.
    pub const UNWATCH: &str = "session.unwatch";
    /// Application-level ping answered by the agent.
    pub const PING: &str = "system.ping";
}

/// A request sent from client to agent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ClientRequest {
    /// Correlation identifier echoed in the response.
    pub id: String,
    /// Method name (e.g. `session.watch`).
    pub method: String,
    /// Optional parameters object.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

/// A response sent from agent to client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RpcResponse {
    /// Echoed request identifier.
    pub id: String,
    /// Whether the call succeeded.
    pub success: bool,
    /// Result payload (present when `success == true`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Error payload (present when `success == false`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcErrorBody>,
}

/// Structured error body inside an [`RpcResponse`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RpcErrorBody {
    /// Machine-readable error code (e.g. `SESSION_NOT_FOUND`).
    pub code: String,
    /// Human-readable message.
    pub message: String,
}

/// An event pushed by the agent.
///
/// The payload is opaque to the connection core.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ServerEvent {
    /// Event type (e.g. `agent.text_delta`).
    #[serde(rename = "type")]
    pub event_type: String,
    /// Associated session, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    /// RFC 3339 timestamp assigned by the agent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    /// Event payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Classification of a single inbound record.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundRecord {
    /// Liveness marker.
    Heartbeat,
    /// Broadcast event for subscribers.
    Event(ServerEvent),
    /// Response to a request, correlated by id.
    Response(RpcResponse),
}

impl ClientRequest {
    /// Creates a request.
    pub fn new(id: impl Into<String>, method: impl Into<String>, params: Option<Value>) -> Self {
        ClientRequest {
            id: id.into(),
            method: method.into(),
            params,
        }
    }

    /// Serializes the request to a single JSON line.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Deserializes a request from JSON.
    pub fn from_json(s: &str) -> Result<Self> {
        Ok(serde_json::from_str(s)?)
    }
}

impl RpcResponse {
    /// Builds a success response.
    pub fn success(id: impl Into<String>, result: Value) -> Self {
        RpcResponse {
            id: id.into(),
            success: true,
            result: Some(result),
            error: None,
        }
    }

    /// Builds an error response.
    pub fn error(id: impl Into<String>, code: impl Into<String>, message: impl Into<String>) -> Self {
        RpcResponse {
            id: id.into(),
            success: false,
            result: None,
            error: Some(RpcErrorBody {
                code: code.into(),
                message: message.into(),
            }),
        }
    }

    /// Serializes the response to a single JSON line.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

impl ServerEvent {
    /// Creates an event stamped with the current UTC time.
    pub fn new(event_type: impl Into<String>, session_id: Option<String>, data: Option<Value>) -> Self {
        ServerEvent {
            event_type: event_type.into(),
            session_id,
            timestamp: Some(
                chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
            ),
            data,
        }
    }

    /// Creates a heartbeat event.
    pub fn heartbeat() -> Self {
        ServerEvent::new("system.heartbeat", None, None)
    }

    /// Returns true if this event is a liveness marker.
    pub fn is_heartbeat(&self) -> bool {
        HEARTBEAT_TYPES.contains(&self.event_type.as_str())
    }

    /// Serializes the event to a single JSON line.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

impl InboundRecord {
    /// Classifies one newline-delimited record.
    ///
    /// A record with a string `type` is an event (or heartbeat). Otherwise a
    /// record with an `id` and a `success`, `result` or `error` field is a
    /// response. Anything else is rejected.
    pub fn parse(line: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(line)?;
        let object = value.as_object().ok_or(Error::NotAnObject)?;

        if object.get("type").is_some_and(Value::is_string) {
            let event: ServerEvent = serde_json::from_value(value)?;
            if event.is_heartbeat() {
                return Ok(InboundRecord::Heartbeat);
            }
            return Ok(InboundRecord::Event(event));
        }

        let has_id = object.get("id").is_some_and(Value::is_string);
        let has_outcome = ["success", "result", "error"]
            .iter()
            .any(|key| object.contains_key(*key));
        if has_id && has_outcome {
            return Ok(InboundRecord::Response(serde_json::from_value(value)?));
        }

        Err(Error::UnrecognizedRecord(truncate(line, 120)))
    }
}

fn truncate(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}

#[cfg(test)]
#[path = "protocol_tests.rs"]
mod tests;
