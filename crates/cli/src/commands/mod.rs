// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

pub mod call;
pub mod config;
pub mod ping;
pub mod watch;

use std::path::Path;

use serde_json::Value;
use tether::ClientConfig;

use crate::cli::TargetArgs;
use crate::error::{Error, Result};

/// Load the config file, falling back to defaults when it does not exist.
pub fn load_config(path: Option<&Path>) -> Result<ClientConfig> {
    Ok(ClientConfig::load_or_default(path)?)
}

/// The URL to connect to: `--url` first, then the config file.
pub fn resolve_url(target: &TargetArgs, config: &ClientConfig) -> Result<String> {
    let url = target
        .url
        .clone()
        .or_else(|| config.url.clone())
        .ok_or(Error::MissingUrl)?;
    tether::config::validate_url(&url)?;
    Ok(url)
}

/// Parse optional JSON params given on the command line.
pub fn parse_params(raw: Option<&str>) -> Result<Option<Value>> {
    raw.map(|s| serde_json::from_str(s).map_err(Error::InvalidParams))
        .transpose()
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
