// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Error types for tether-core operations.

use thiserror::Error;

/// Protocol-level errors raised while encoding or classifying wire records.
#[derive(Debug, Error)]
pub enum Error {
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unrecognized record: {0}\n  hint: expected an event with a 'type' or a response with an 'id'")]
    UnrecognizedRecord(String),

    #[error("record is not a JSON object")]
    NotAnObject,
}

/// A specialized Result type for tether-core operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
