//! Tunnel state and event types

use serde::{Deserialize, Serialize};

/// Lifecycle state of a tunnel
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TunnelState {
    /// Nothing started yet
    #[default]
    Idle,
    /// No tunnel required; start and stop are pass-through
    Disabled,
    /// Agent spawned, waiting for the readiness line
    Starting,
    /// Tunnel established
    Running,
    /// Shutdown in progress
    Stopping,
    /// Agent has exited
    Stopped,
    /// Start or stop failed, or a kill was never confirmed
    Failed { error: String },
}

impl TunnelState {
    /// Stopped and Failed accept no further transitions
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Stopped | Self::Failed { .. })
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Disabled => "disabled",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
            Self::Failed { .. } => "failed",
        }
    }
}

impl std::fmt::Display for TunnelState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Failed { error } => write!(f, "failed: {}", error),
            other => f.write_str(other.name()),
        }
    }
}

/// Events emitted by the tunnel manager
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TunnelEvent {
    /// Informational line from the agent's stdout, or a manager note
    Debug { line: String },
    /// Line from the agent's stderr, or a manager failure note
    Error { line: String },
    /// Lifecycle milestone
    Status { message: String },
}

impl TunnelEvent {
    pub fn debug(line: impl Into<String>) -> Self {
        Self::Debug { line: line.into() }
    }

    pub fn error(line: impl Into<String>) -> Self {
        Self::Error { line: line.into() }
    }

    pub fn status(message: impl Into<String>) -> Self {
        Self::Status {
            message: message.into(),
        }
    }
}
