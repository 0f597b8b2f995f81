// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Error types for the connection manager.

use std::time::Duration;

use thiserror::Error;

use crate::transport::TransportError;

/// Errors surfaced to callers of the connection manager.
#[derive(Debug, Error)]
pub enum Error {
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("protocol error: {0}")]
    Protocol(#[from] tether_core::Error),

    #[error("not connected\n  hint: call connect() first or wait for the connection to recover")]
    NotConnected,

    #[error("connect timed out after {0:?}")]
    ConnectTimeout(Duration),

    #[error("request '{method}' timed out after {timeout:?}")]
    RequestTimeout { method: String, timeout: Duration },

    #[error("remote error {code}: {message}")]
    Remote { code: String, message: String },

    #[error("operation cancelled")]
    Cancelled,

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Result type for connection manager operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
