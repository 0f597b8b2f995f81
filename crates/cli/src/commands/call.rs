// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

use std::time::Duration;

use tether::{ClientConfig, ConnectionManager};

use super::{parse_params, resolve_url};
use crate::cli::{OutputFormat, TargetArgs};
use crate::display;
use crate::error::Result;

pub async fn run(
    config: ClientConfig,
    target: &TargetArgs,
    method: &str,
    params: Option<&str>,
    timeout_ms: Option<u64>,
    output: OutputFormat,
) -> Result<()> {
    let url = resolve_url(target, &config)?;
    let params = parse_params(params)?;
    let timeout = timeout_ms
        .map(Duration::from_millis)
        .unwrap_or_else(|| config.request_timeout());

    let manager = ConnectionManager::new(config);
    manager.connect(&url).await?;
    let result = manager.request_with_timeout(method, params, timeout).await;
    manager.disconnect().await;

    println!("{}", display::result_text(&result?, output)?);
    Ok(())
}
