// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Handshake metadata and peer role classification.
//!
//! Roles are a best-effort label for logs and stats, never an access
//! decision. Sources are tried in order: the `role` query parameter, the
//! `Origin` scheme, then the `User-Agent`.

use tether_core::Role;
use tokio_tungstenite::tungstenite::handshake::server::Request;

const EXTENSION_SCHEMES: [&str; 3] = [
    "chrome-extension://",
    "moz-extension://",
    "safari-web-extension://",
];

const DASHBOARD_SCHEMES: [&str; 2] = ["http://", "https://"];

/// Substrings marking an extension background context in a User-Agent.
const EXTENSION_AGENT_MARKERS: [&str; 2] = ["tether-extension", "extension"];

/// What the hub learns from the upgrade request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HandshakeMeta {
    pub role_hint: Option<String>,
    pub origin: Option<String>,
    pub user_agent: Option<String>,
    /// Previous client id the peer asks to resume.
    pub resume: Option<String>,
}

impl HandshakeMeta {
    pub fn from_request(request: &Request) -> Self {
        let header = |name: &str| {
            request
                .headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };
        let query = request.uri().query().unwrap_or("");
        HandshakeMeta {
            role_hint: query_param(query, "role").map(str::to_string),
            origin: header("origin"),
            user_agent: header("user-agent"),
            resume: query_param(query, "resume")
                .filter(|id| !id.is_empty())
                .map(str::to_string),
        }
    }

    pub fn role(&self) -> Role {
        classify_role(
            self.role_hint.as_deref(),
            self.origin.as_deref(),
            self.user_agent.as_deref(),
        )
    }
}

/// Returns the value of `key` in a `a=1&b=2` query string.
pub fn query_param<'a>(query: &'a str, key: &str) -> Option<&'a str> {
    query.split('&').find_map(|pair| {
        let (k, v) = pair.split_once('=').unwrap_or((pair, ""));
        (k == key).then_some(v)
    })
}

/// Classifies a peer from its handshake metadata.
pub fn classify_role(
    role_hint: Option<&str>,
    origin: Option<&str>,
    user_agent: Option<&str>,
) -> Role {
    if let Some(role) = role_hint.and_then(|hint| hint.parse::<Role>().ok()) {
        if role != Role::Unknown {
            return role;
        }
    }

    if let Some(origin) = origin {
        let origin = origin.to_ascii_lowercase();
        if EXTENSION_SCHEMES.iter().any(|s| origin.starts_with(s)) {
            return Role::Extension;
        }
        if DASHBOARD_SCHEMES.iter().any(|s| origin.starts_with(s)) {
            return Role::Dashboard;
        }
    }

    if let Some(agent) = user_agent {
        let agent = agent.to_ascii_lowercase();
        if EXTENSION_AGENT_MARKERS.iter().any(|m| agent.contains(m)) {
            return Role::Extension;
        }
    }

    Role::Unknown
}

#[cfg(test)]
#[path = "classify_tests.rs"]
mod tests;
