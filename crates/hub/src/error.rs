// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Error types for the hub.

use thiserror::Error;

/// Errors returned by hub operations.
#[derive(Debug, Error)]
pub enum HubError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid config: {0}")]
    Config(String),

    #[error("hub already started")]
    AlreadyStarted,

    #[error("hub not started")]
    NotStarted,

    #[error("websocket error: {0}")]
    WebSocket(#[from] Box<tokio_tungstenite::tungstenite::Error>),
}

impl From<tokio_tungstenite::tungstenite::Error> for HubError {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        HubError::WebSocket(Box::new(e))
    }
}

impl From<tether_core::Error> for HubError {
    fn from(e: tether_core::Error) -> Self {
        match e {
            tether_core::Error::Io(e) => HubError::Io(e),
            other => HubError::Config(other.to_string()),
        }
    }
}

/// Result type for hub operations.
pub type Result<T> = std::result::Result<T, HubError>;
