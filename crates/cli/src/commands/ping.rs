// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

use tether::{ClientConfig, ConnectionManager};
use tokio::time::Instant;

use super::resolve_url;
use crate::cli::TargetArgs;
use crate::error::{Error, Result};

pub async fn run(config: ClientConfig, target: &TargetArgs) -> Result<()> {
    let url = resolve_url(target, &config)?;
    let manager = ConnectionManager::new(config);

    let started = Instant::now();
    manager.connect(&url).await?;
    let connected_in = started.elapsed();

    let started = Instant::now();
    let answered = manager.ping().await;
    let round_trip = started.elapsed();
    manager.disconnect().await;

    if !answered {
        return Err(Error::NoPong);
    }
    println!(
        "pong from {} (connect {}ms, round trip {}ms)",
        url,
        connected_in.as_millis(),
        round_trip.as_millis()
    );
    Ok(())
}
