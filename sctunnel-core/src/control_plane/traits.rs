//! ControlPlane trait and remote tunnel types

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ControlPlaneError;

/// A tunnel as reported by the Sauce Labs REST API
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TunnelResource {
    pub id: String,

    #[serde(default)]
    pub status: Option<String>,

    /// Name the tunnel was started with
    #[serde(default)]
    pub tunnel_identifier: Option<String>,
}

impl TunnelResource {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            status: None,
            tunnel_identifier: None,
        }
    }

    #[must_use]
    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }
}

/// Remote API that owns tunnel resources
///
/// Implementations never retry; one failed call is final.
#[async_trait]
pub trait ControlPlane: Send + Sync {
    /// List the account's tunnels
    async fn list_tunnels(&self) -> Result<Vec<TunnelResource>, ControlPlaneError>;

    /// Delete a tunnel by id; succeeds only on HTTP 200
    async fn delete_tunnel(&self, id: &str) -> Result<(), ControlPlaneError>;
}
