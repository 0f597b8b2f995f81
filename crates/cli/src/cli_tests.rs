// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

#![allow(clippy::unwrap_used)]
#![allow(clippy::panic)]

use super::*;
use yare::parameterized;

fn parse(args: &[&str]) -> Result<Cli, clap::Error> {
    Cli::try_parse_from(args)
}

#[test]
fn verify_cli() {
    use clap::CommandFactory;
    Cli::command().debug_assert();
}

#[test]
fn watch_with_session_and_probe() {
    let cli = parse(&["tether", "watch", "-u", "ws://h:1", "-s", "s1", "--probe-secs", "5"]).unwrap();
    match cli.command {
        Command::Watch {
            target,
            session,
            probe_secs,
            output,
        } => {
            assert_eq!(target.url.as_deref(), Some("ws://h:1"));
            assert_eq!(session.as_deref(), Some("s1"));
            assert_eq!(probe_secs, Some(5));
            assert_eq!(output, OutputFormat::Text);
        }
        other => panic!("expected watch, got {other:?}"),
    }
}

#[test]
fn call_with_params() {
    let cli = parse(&["tether", "call", "echo", r#"{"a":1}"#, "-t", "500", "-o", "json"]).unwrap();
    match cli.command {
        Command::Call {
            target,
            method,
            params,
            timeout_ms,
            output,
        } => {
            assert!(target.url.is_none());
            assert_eq!(method, "echo");
            assert_eq!(params.as_deref(), Some(r#"{"a":1}"#));
            assert_eq!(timeout_ms, Some(500));
            assert_eq!(output, OutputFormat::Json);
        }
        other => panic!("expected call, got {other:?}"),
    }
}

#[test]
fn global_flags_after_subcommand() {
    let cli = parse(&["tether", "ping", "-v", "-c", "/tmp/t.toml"]).unwrap();
    assert!(cli.verbose);
    assert_eq!(cli.config.unwrap().to_str(), Some("/tmp/t.toml"));
    assert!(matches!(cli.command, Command::Ping { .. }));
}

#[parameterized(
    no_subcommand = { &["tether"] },
    call_without_method = { &["tether", "call"] },
    bad_output = { &["tether", "watch", "-o", "yaml"] },
    bad_probe = { &["tether", "watch", "--probe-secs", "soon"] },
)]
fn rejects(args: &[&str]) {
    assert!(parse(args).is_err());
}
