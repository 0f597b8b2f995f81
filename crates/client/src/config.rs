// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Client configuration.
//!
//! Configuration is stored in `<config_dir>/tether/config.toml` and every
//! field is optional:
//! - `url`: the agent endpoint (`ws://...` or `wss://...`)
//! - retry budget, timeouts and monitor intervals
//! - `unwatch_on_background`: release the watched session while suspended

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::backoff::RetryBudget;
use crate::error::{Error, Result};

const CONFIG_DIR_NAME: &str = "tether";
const CONFIG_FILE_NAME: &str = "config.toml";

/// Connection manager configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClientConfig {
    /// Agent URL used when a command does not name one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Reconnect attempts before entering the cooldown (default: 10).
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// First backoff delay in milliseconds (default: 1000).
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    /// Backoff cap in milliseconds (default: 30000).
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// Max time for open plus the confirming ping in milliseconds (default: 10000).
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// Inbound silence that marks the link stale in milliseconds (default: 15000).
    #[serde(default = "default_heartbeat_timeout_ms")]
    pub heartbeat_timeout_ms: u64,
    /// How often staleness is checked in milliseconds (default: 5000).
    #[serde(default = "default_stale_check_interval_ms")]
    pub stale_check_interval_ms: u64,
    /// Periodic ping interval in milliseconds (default: 30000). 0 = disabled.
    #[serde(default = "default_ping_interval_ms")]
    pub ping_interval_ms: u64,
    /// Max time to wait for a pong in milliseconds (default: 5000).
    #[serde(default = "default_ping_timeout_ms")]
    pub ping_timeout_ms: u64,
    /// Wait before the single retry after exhausting attempts, in seconds (default: 60).
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: u64,
    /// Default request timeout in milliseconds (default: 30000).
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// Unwatch the current session when entering the background (default: true).
    #[serde(default = "default_unwatch_on_background")]
    pub unwatch_on_background: bool,
}

fn default_max_attempts() -> u32 {
    10
}

fn default_base_delay_ms() -> u64 {
    1000
}

fn default_max_delay_ms() -> u64 {
    30_000
}

fn default_connect_timeout_ms() -> u64 {
    10_000
}

fn default_heartbeat_timeout_ms() -> u64 {
    15_000
}

fn default_stale_check_interval_ms() -> u64 {
    5000
}

fn default_ping_interval_ms() -> u64 {
    30_000
}

fn default_ping_timeout_ms() -> u64 {
    5000
}

fn default_cooldown_secs() -> u64 {
    60
}

fn default_request_timeout_ms() -> u64 {
    30_000
}

fn default_unwatch_on_background() -> bool {
    true
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            url: None,
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
            heartbeat_timeout_ms: default_heartbeat_timeout_ms(),
            stale_check_interval_ms: default_stale_check_interval_ms(),
            ping_interval_ms: default_ping_interval_ms(),
            ping_timeout_ms: default_ping_timeout_ms(),
            cooldown_secs: default_cooldown_secs(),
            request_timeout_ms: default_request_timeout_ms(),
            unwatch_on_background: default_unwatch_on_background(),
        }
    }
}

impl ClientConfig {
    /// Default config file location.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
    }

    /// Load and validate a config file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: ClientConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load `path`, or the default location, falling back to defaults when
    /// the file does not exist.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => match Self::default_path() {
                Some(p) => p,
                None => return Ok(ClientConfig::default()),
            },
        };
        if !path.exists() {
            return Ok(ClientConfig::default());
        }
        Self::load(&path)
    }

    /// Check value ranges and the URL scheme.
    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(Error::Config("max_attempts must be at least 1".into()));
        }
        if self.base_delay_ms == 0 {
            return Err(Error::Config("base_delay_ms must be positive".into()));
        }
        if self.max_delay_ms < self.base_delay_ms {
            return Err(Error::Config(format!(
                "max_delay_ms ({}) is below base_delay_ms ({})",
                self.max_delay_ms, self.base_delay_ms
            )));
        }
        for (name, value) in [
            ("connect_timeout_ms", self.connect_timeout_ms),
            ("heartbeat_timeout_ms", self.heartbeat_timeout_ms),
            ("stale_check_interval_ms", self.stale_check_interval_ms),
            ("ping_timeout_ms", self.ping_timeout_ms),
            ("request_timeout_ms", self.request_timeout_ms),
        ] {
            if value == 0 {
                return Err(Error::Config(format!("{} must be positive", name)));
            }
        }
        if let Some(url) = &self.url {
            validate_url(url)?;
        }
        Ok(())
    }

    pub fn retry_budget(&self) -> RetryBudget {
        RetryBudget::new(
            self.max_attempts,
            Duration::from_millis(self.base_delay_ms),
            Duration::from_millis(self.max_delay_ms),
        )
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_millis(self.heartbeat_timeout_ms)
    }

    pub fn stale_check_interval(&self) -> Duration {
        Duration::from_millis(self.stale_check_interval_ms)
    }

    /// Periodic ping interval, `None` when disabled.
    pub fn ping_interval(&self) -> Option<Duration> {
        (self.ping_interval_ms > 0).then(|| Duration::from_millis(self.ping_interval_ms))
    }

    pub fn ping_timeout(&self) -> Duration {
        Duration::from_millis(self.ping_timeout_ms)
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Accept only `ws://` and `wss://` URLs with a host.
pub fn validate_url(target: &str) -> Result<()> {
    let url = url::Url::parse(target)
        .map_err(|e| Error::Config(format!("invalid url '{}': {}", target, e)))?;
    if !matches!(url.scheme(), "ws" | "wss") {
        return Err(Error::Config(format!(
            "invalid url '{}': scheme must be ws:// or wss://",
            target
        )));
    }
    if url.host_str().is_none() {
        return Err(Error::Config(format!("invalid url '{}': missing host", target)));
    }
    Ok(())
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
