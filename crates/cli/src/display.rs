// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Rendering of states, events and results for the terminal.

use serde_json::Value;
use tether::{ConnectionState, ServerEvent};

use crate::cli::OutputFormat;
use crate::error::Result;

pub fn state_line(state: &ConnectionState, max_attempts: u32) -> String {
    format!("-- {}", state.status_line(max_attempts))
}

/// One line per event.
///
/// Text output is `<timestamp> <type> [session] <data>`, omitting absent
/// parts; JSON output is the wire record.
pub fn event_line(event: &ServerEvent, format: OutputFormat) -> Result<String> {
    if format == OutputFormat::Json {
        return Ok(event.to_json().map_err(tether::Error::from)?);
    }
    let mut line = String::new();
    if let Some(ts) = &event.timestamp {
        line.push_str(ts);
        line.push(' ');
    }
    line.push_str(&event.event_type);
    if let Some(session) = &event.session_id {
        line.push_str(&format!(" [{}]", session));
    }
    if let Some(data) = &event.data {
        line.push(' ');
        line.push_str(&compact(data));
    }
    Ok(line)
}

/// Render a call result. Bare strings print unquoted in text mode.
pub fn result_text(value: &Value, format: OutputFormat) -> Result<String> {
    match (format, value) {
        (OutputFormat::Text, Value::String(s)) => Ok(s.clone()),
        (OutputFormat::Text, _) => Ok(serde_json::to_string_pretty(value)?),
        (OutputFormat::Json, _) => Ok(serde_json::to_string(value)?),
    }
}

fn compact(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
#[path = "display_tests.rs"]
mod tests;
