// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! tether-cli: command-line host for the tether connection manager.
//!
//! Drives a [`tether::ConnectionManager`] against a real agent so that
//! reconnection, session watches and lifecycle handling can be exercised
//! outside a mobile app.

mod cli;
mod commands;
mod display;

pub mod error;

pub use cli::{Cli, Command, OutputFormat, TargetArgs};
pub use error::{Error, Result};

use tracing_subscriber::EnvFilter;

/// Install the stderr log subscriber.
///
/// `RUST_LOG` wins unless `verbose` forces debug output.
pub fn setup_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

pub async fn run(cli: Cli) -> Result<()> {
    let config = commands::load_config(cli.config.as_deref())?;
    match cli.command {
        Command::Watch {
            target,
            session,
            probe_secs,
            output,
        } => commands::watch::run(config, &target, session, probe_secs, output).await,
        Command::Call {
            target,
            method,
            params,
            timeout_ms,
            output,
        } => {
            commands::call::run(
                config,
                &target,
                &method,
                params.as_deref(),
                timeout_ms,
                output,
            )
            .await
        }
        Command::Ping { target } => commands::ping::run(config, &target).await,
        Command::Config => commands::config::run(&config),
    }
}
