// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! tether-stub: development agent for the tether connection manager.
//!
//! # Usage
//!
//! ```text
//! tether-stub [--bind <ADDR>] [--heartbeat-ms <MS>] [--demo-session <ID>]
//! ```

use std::net::SocketAddr;
use std::time::Duration;

use clap::Parser;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

use tether_core::ServerEvent;
use tether_stub::{ServeOptions, StubState};

/// Stub agent for local development.
#[derive(Parser, Debug)]
#[command(name = "tether-stub", version, about)]
struct Args {
    /// Address to bind to.
    #[arg(short, long, default_value = "127.0.0.1:8082")]
    bind: SocketAddr,

    /// Heartbeat interval in milliseconds (0 disables heartbeats).
    #[arg(long, default_value_t = 5000)]
    heartbeat_ms: u64,

    /// Publish a text delta to this session every second.
    #[arg(long)]
    demo_session: Option<String>,

    /// Enable verbose logging.
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    setup_logging(args.verbose);

    let state = StubState::new();
    let options = ServeOptions {
        heartbeat: (args.heartbeat_ms > 0).then(|| Duration::from_millis(args.heartbeat_ms)),
    };
    let shutdown = CancellationToken::new();

    if let Some(session) = args.demo_session.clone() {
        tokio::spawn(demo_events(state.clone(), session, shutdown.clone()));
    }

    let ctrl_c = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupted, shutting down");
            ctrl_c.cancel();
        }
    });

    tether_stub::run(args.bind, state, options, shutdown).await
}

fn setup_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn demo_events(state: StubState, session: String, shutdown: CancellationToken) {
    let mut tick = tokio::time::interval(Duration::from_secs(1));
    let mut seq: u64 = 0;
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => return,
            _ = tick.tick() => {
                seq += 1;
                let event = ServerEvent::new(
                    "agent.text_delta",
                    Some(session.clone()),
                    Some(json!({ "seq": seq, "text": format!("chunk {seq}") })),
                );
                state.publish(event);
            }
        }
    }
}
