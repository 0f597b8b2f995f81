// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

/// Output format for streamed events and call results.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

const QUICKSTART_HELP: &str = "\
Get started:
  tether ping -u ws://127.0.0.1:8082           Check the agent answers
  tether watch -u ws://127.0.0.1:8082 -s demo  Stream events for a session
  tether call echo '{\"hello\":1}'              Send one request";

#[derive(Parser, Debug)]
#[command(name = "tether", version)]
#[command(about = "Resilient real-time connection to a remote agent")]
#[command(after_help = QUICKSTART_HELP)]
pub struct Cli {
    /// Config file (default: <config dir>/tether/config.toml).
    #[arg(short = 'c', long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging.
    #[arg(short = 'v', long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Where to connect.
#[derive(Args, Debug, Clone, Default)]
pub struct TargetArgs {
    /// Agent URL (ws:// or wss://); overrides the config file.
    #[arg(short = 'u', long)]
    pub url: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Stay connected and print state changes and events until interrupted
    Watch {
        #[command(flatten)]
        target: TargetArgs,

        /// Session to watch once connected.
        #[arg(short, long)]
        session: Option<String>,

        /// Probe the agent's host every N seconds and feed the result to the
        /// connection as network path changes.
        #[arg(long, value_name = "SECS")]
        probe_secs: Option<u64>,

        /// Event output format.
        #[arg(short, long, value_enum, default_value_t)]
        output: OutputFormat,
    },

    /// Send one request and print its result
    Call {
        #[command(flatten)]
        target: TargetArgs,

        /// Method name (e.g. session.list).
        method: String,

        /// JSON params.
        params: Option<String>,

        /// Request timeout in milliseconds (default: from config).
        #[arg(short, long, value_name = "MS")]
        timeout_ms: Option<u64>,

        /// Result output format.
        #[arg(short, long, value_enum, default_value_t)]
        output: OutputFormat,
    },

    /// Connect, probe the link once and report the round trip
    Ping {
        #[command(flatten)]
        target: TargetArgs,
    },

    /// Print the effective configuration
    Config,
}

#[cfg(test)]
#[path = "cli_tests.rs"]
mod tests;
