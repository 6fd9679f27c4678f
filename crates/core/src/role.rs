// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Peer roles.
//!
//! A role is a best-effort label used for logging and stats. It is never an
//! authentication decision.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Which kind of peer sits at the other end of a connection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The background tracking agent.
    Extension,
    /// The interactive dashboard.
    Dashboard,
    #[default]
    Unknown,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Extension => "extension",
            Role::Dashboard => "dashboard",
            Role::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    /// Case-insensitive; anything unrecognised is an error so callers can
    /// fall through to other heuristics.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "extension" => Ok(Role::Extension),
            "dashboard" => Ok(Role::Dashboard),
            "unknown" => Ok(Role::Unknown),
            other => Err(format!("unknown role '{other}'")),
        }
    }
}
