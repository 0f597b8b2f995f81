// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

// Allow unused items: test helpers are shared across multiple test binaries,
// and not every test file uses every helper.
#![allow(dead_code)]
#![allow(unused_imports)]

use assert_cmd::cargo::cargo_bin_cmd;
use assert_cmd::Command;
use std::path::Path;

pub use predicates::prelude::*;
pub use tempfile::TempDir;
pub use tether_stub::TestServer;

/// `tether` pointed at a config file that does not exist, so the user's own
/// config is never read.
pub fn tether() -> Command {
    tether_with(&std::env::temp_dir().join("tether-tests-absent").join("config.toml"))
}

/// `tether` reading the given config file.
pub fn tether_with(config: &Path) -> Command {
    let mut cmd = cargo_bin_cmd!("tether");
    cmd.arg("-c").arg(config);
    cmd
}

/// Run blocking command assertions off the runtime so an in-process
/// `TestServer` keeps serving.
pub async fn blocking<F>(f: F)
where
    F: FnOnce() + Send + 'static,
{
    tokio::task::spawn_blocking(f).await.unwrap();
}
