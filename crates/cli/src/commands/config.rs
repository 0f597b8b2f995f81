// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

use tether::ClientConfig;

use crate::error::Result;

pub fn run(config: &ClientConfig) -> Result<()> {
    print!("{}", render(config)?);
    Ok(())
}

pub(crate) fn render(config: &ClientConfig) -> Result<String> {
    Ok(toml::to_string_pretty(config)?)
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
