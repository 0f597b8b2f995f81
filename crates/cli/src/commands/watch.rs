// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Long-running watch: the command-line stand-in for a foreground app.
//!
//! On Unix, `SIGUSR1` moves the connection to the background and `SIGUSR2`
//! brings it back, so lifecycle handling can be exercised from a shell.

use std::time::Duration;

use tether::{ClientConfig, ConnectionManager, Interface, NetworkPath, ReachabilityObserver};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::resolve_url;
use crate::cli::{OutputFormat, TargetArgs};
use crate::display;
use crate::error::Result;

/// App lifecycle transitions delivered by signals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Background,
    Foreground,
}

pub async fn run(
    config: ClientConfig,
    target: &TargetArgs,
    session: Option<String>,
    probe_secs: Option<u64>,
    output: OutputFormat,
) -> Result<()> {
    let url = resolve_url(target, &config)?;
    let manager = ConnectionManager::new(config);
    let max_attempts = manager.max_attempts();
    let mut states = manager.state_stream();
    let mut events = manager.subscribe_events();

    let probe = CancellationToken::new();
    let observing = match probe_secs {
        Some(secs) => {
            let observer = ReachabilityObserver::new(NetworkPath::Available(Interface::Other));
            let prober =
                observer.spawn_probe(&url, Duration::from_secs(secs.max(1)), probe.clone())?;
            Some((prober, manager.observe_network(observer.subscribe())))
        }
        None => None,
    };

    if let Err(e) = manager.connect(&url).await {
        warn!(error = %e, "initial connect failed, retrying in the background");
        manager.reconnect();
    }

    let mut lifecycle = lifecycle_signals();
    let mut pending_session = session;
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                info!("interrupted");
                break;
            }

            state = states.recv() => {
                let Some(state) = state else { break };
                println!("{}", display::state_line(&state, max_attempts));
                if state.is_connected() {
                    if let Some(session) = pending_session.take() {
                        if let Err(e) = manager.watch(&session).await {
                            warn!(session = %session, error = %e, "watch failed");
                            pending_session = Some(session);
                        }
                    }
                }
            }

            event = events.recv() => {
                let Some(event) = event else { break };
                println!("{}", display::event_line(&event, output)?);
            }

            Some(transition) = lifecycle.recv() => {
                info!(?transition, "lifecycle");
                match transition {
                    Lifecycle::Background => manager.enter_background().await,
                    Lifecycle::Foreground => manager.enter_foreground().await,
                }
            }
        }
    }

    probe.cancel();
    if let Some((prober, observer)) = observing {
        observer.abort();
        let _ = prober.await;
    }
    manager.disconnect().await;
    Ok(())
}

#[cfg(unix)]
fn lifecycle_signals() -> mpsc::UnboundedReceiver<Lifecycle> {
    use tokio::signal::unix::{signal, SignalKind};

    let (tx, rx) = mpsc::unbounded_channel();
    let (background, foreground) = match (
        signal(SignalKind::user_defined1()),
        signal(SignalKind::user_defined2()),
    ) {
        (Ok(bg), Ok(fg)) => (bg, fg),
        (Err(e), _) | (_, Err(e)) => {
            warn!(error = %e, "lifecycle signals unavailable");
            return rx;
        }
    };

    tokio::spawn(async move {
        let (mut background, mut foreground) = (background, foreground);
        loop {
            let transition = tokio::select! {
                Some(()) = background.recv() => Lifecycle::Background,
                Some(()) = foreground.recv() => Lifecycle::Foreground,
                else => return,
            };
            if tx.send(transition).is_err() {
                return;
            }
        }
    });
    rx
}

#[cfg(not(unix))]
fn lifecycle_signals() -> mpsc::UnboundedReceiver<Lifecycle> {
    mpsc::unbounded_channel().1
}
