// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! TOML configuration loading shared by the client and hub configs.

use std::fs;
use std::path::Path;

use serde::de::DeserializeOwned;

use crate::error::{Error, Result};

/// Reads and parses a TOML config file.
///
/// Missing keys fall back to the struct's serde defaults, so a partial
/// file is valid.
pub fn load_toml<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = fs::read_to_string(path)?;
    parse_toml(&content)
}

/// Parses TOML config text.
pub fn parse_toml<T: DeserializeOwned>(content: &str) -> Result<T> {
    Ok(toml::from_str(content)?)
}

/// Fails with [`Error::Config`] unless `value` is non-zero.
pub fn require_nonzero<N: PartialEq + Default>(name: &str, value: N) -> Result<()> {
    if value == N::default() {
        return Err(Error::Config(format!("{name} must be greater than zero")));
    }
    Ok(())
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
