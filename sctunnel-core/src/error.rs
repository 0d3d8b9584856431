//! Error types for sctunnel-core

use std::time::Duration;

use thiserror::Error;

/// Errors from tunnel lifecycle operations
#[derive(Error, Debug)]
pub enum TunnelError {
    #[error("{0} platform is not supported")]
    UnsupportedPlatform(String),

    #[error("Failed to spawn Sauce Connect: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("Sauce Connect exited before the tunnel was ready: code {code:?}")]
    EarlyExit { code: Option<i32> },

    #[error("Timed out after {0:?} waiting for the tunnel")]
    Timeout(Duration),

    #[error("Sauce Connect did not exit within {0:?} after being killed")]
    KillTimeout(Duration),

    #[error("Tunnel id was never announced by Sauce Connect")]
    MissingTunnelId,

    #[error("Control plane error: {0}")]
    ControlPlane(#[from] ControlPlaneError),

    #[error("Invalid state: expected {expected}, got {actual}")]
    InvalidState { expected: String, actual: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors from the Sauce Labs REST API
#[derive(Error, Debug)]
pub enum ControlPlaneError {
    #[error("Request failed: {0}")]
    Network(#[source] reqwest::Error),

    #[error("Authentication rejected (HTTP {status})")]
    Auth { status: u16 },

    #[error("Unexpected HTTP status {status}")]
    Status { status: u16 },

    #[error("Failed to decode response: {0}")]
    Decode(String),

    #[error("Invalid control plane URL: {0}")]
    InvalidUrl(String),
}

impl ControlPlaneError {
    /// Classify a non-success HTTP status
    pub fn from_status(status: u16) -> Self {
        match status {
            401 | 403 => Self::Auth { status },
            _ => Self::Status { status },
        }
    }
}
