//! Mock control plane for testing
//!
//! Records every call and answers from scripted state, so the lifecycle
//! manager can be exercised without a Sauce Labs account.

use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use super::traits::{ControlPlane, TunnelResource};
use crate::error::ControlPlaneError;

type DeleteHook = Box<dyn Fn(&str) + Send + Sync>;

/// Scripted implementation of [`ControlPlane`]
#[derive(Default)]
pub struct MockControlPlane {
    tunnels: Mutex<Vec<TunnelResource>>,
    delete_failure: Option<u16>,
    delete_delay: Option<Duration>,
    on_delete: Option<DeleteHook>,
    deleted: Mutex<Vec<String>>,
    list_calls: AtomicUsize,
}

impl MockControlPlane {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tunnels returned by `list_tunnels`
    #[must_use]
    pub fn with_tunnels(self, tunnels: Vec<TunnelResource>) -> Self {
        *self.tunnels.lock().unwrap_or_else(|e| e.into_inner()) = tunnels;
        self
    }

    /// Make every delete fail with this HTTP status
    #[must_use]
    pub fn failing_deletes(mut self, status: u16) -> Self {
        self.delete_failure = Some(status);
        self
    }

    /// Hold each delete for a while before answering
    #[must_use]
    pub fn with_delete_delay(mut self, delay: Duration) -> Self {
        self.delete_delay = Some(delay);
        self
    }

    /// Run `hook` with the tunnel id on every successful delete
    #[must_use]
    pub fn on_delete(mut self, hook: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.on_delete = Some(Box::new(hook));
        self
    }

    /// Ids passed to `delete_tunnel`, in call order
    pub fn delete_calls(&self) -> Vec<String> {
        self.deleted.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    /// Total calls of either kind
    pub fn call_count(&self) -> usize {
        self.list_calls() + self.delete_calls().len()
    }
}

#[async_trait]
impl ControlPlane for MockControlPlane {
    async fn list_tunnels(&self) -> Result<Vec<TunnelResource>, ControlPlaneError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.tunnels.lock().unwrap_or_else(|e| e.into_inner()).clone())
    }

    async fn delete_tunnel(&self, id: &str) -> Result<(), ControlPlaneError> {
        self.deleted
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(id.to_string());

        if let Some(delay) = self.delete_delay {
            tokio::time::sleep(delay).await;
        }

        if let Some(status) = self.delete_failure {
            return Err(ControlPlaneError::from_status(status));
        }

        self.tunnels
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .retain(|t| t.id != id);

        if let Some(hook) = &self.on_delete {
            hook(id);
        }
        Ok(())
    }
}
