// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Newline-delimited JSON framing.
//!
//! A single transport frame may carry several logical records, one JSON
//! document per line. Blank lines are ignored on both sides.

use serde::Serialize;

use crate::error::Result;

/// Splits a frame into its non-empty records.
///
/// Lines are trimmed, so `\r\n` separators and trailing newlines are accepted.
pub fn records(frame: &str) -> impl Iterator<Item = &str> {
    frame.lines().map(str::trim).filter(|line| !line.is_empty())
}

/// Encodes several records into one frame, one record per line.
///
/// Used by agents that batch events into a single physical frame.
pub fn encode_batch<T: Serialize>(records: &[T]) -> Result<String> {
    let mut frame = String::new();
    for record in records {
        frame.push_str(&serde_json::to_string(record)?);
        frame.push('\n');
    }
    Ok(frame)
}

#[cfg(test)]
#[path = "jsonl_tests.rs"]
mod tests;
