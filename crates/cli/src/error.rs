// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

use thiserror::Error;

/// Errors reported by the `tether` command.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Client(#[from] tether::Error),

    #[error("no agent URL\n  hint: pass --url or set `url` in the config file")]
    MissingUrl,

    #[error("invalid params: {0}\n  hint: params must be a JSON value, e.g. '{{\"sessionId\":\"s1\"}}'")]
    InvalidParams(serde_json::Error),

    #[error("agent did not answer the ping")]
    NoPong,

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("could not render config: {0}")]
    ConfigRender(#[from] toml::ser::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
