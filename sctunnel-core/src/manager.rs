//! Tunnel manager for the Sauce Connect lifecycle
//!
//! Opening a tunnel races two events: the agent printing its readiness line,
//! and the agent exiting. A [`Settlement`] makes sure only the first one
//! completes `start`. Closing asks the control plane to delete the tunnel so
//! the agent shuts itself down, and falls back to killing the process when
//! that fails. `stop` returns only after the process has actually exited.

use std::future::Future;
use std::sync::{Arc, OnceLock};

use tokio::sync::{broadcast, watch};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::config::TunnelConfig;
use crate::control_plane::{ControlPlane, SauceRestClient, TunnelResource};
use crate::error::TunnelError;
use crate::output::{self, LineKind, OutputStream};
use crate::platform::{self, Platform};
use crate::process::{self, AgentExit, AgentProcess, SpawnedAgent};
use crate::settle::Settlement;
use crate::state::{TunnelEvent, TunnelState};

/// Capacity of the event broadcast channel
const EVENT_CAPACITY: usize = 256;

/// Whichever happened first while opening the tunnel
#[derive(Debug)]
enum StartOutcome {
    Ready,
    Exited(AgentExit),
}

/// Manages one Sauce Connect tunnel from spawn to exit
///
/// A manager runs its tunnel once. After `Stopped` or `Failed`, build a new
/// one to try again.
pub struct TunnelManager {
    config: TunnelConfig,
    platform: Platform,
    control_plane: Arc<dyn ControlPlane>,
    state: TunnelState,
    tunnel_id: Arc<OnceLock<String>>,
    event_tx: broadcast::Sender<TunnelEvent>,
    process: Option<AgentProcess>,
}

impl TunnelManager {
    /// Create a manager talking to the Sauce Labs REST API
    pub fn new(config: TunnelConfig) -> Result<Self, TunnelError> {
        let client = SauceRestClient::from_config(&config)?;
        Ok(Self::with_control_plane(config, Arc::new(client)))
    }

    /// Create a manager with a custom control plane
    pub fn with_control_plane(config: TunnelConfig, control_plane: Arc<dyn ControlPlane>) -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            config,
            platform: Platform::current(),
            control_plane,
            state: TunnelState::Idle,
            tunnel_id: Arc::new(OnceLock::new()),
            event_tx,
            process: None,
        }
    }

    /// Resolve the agent for `platform` instead of the host
    #[must_use]
    pub fn with_platform(mut self, platform: Platform) -> Self {
        self.platform = platform;
        self
    }

    pub fn state(&self) -> &TunnelState {
        &self.state
    }

    /// Tunnel id announced by the agent, if any
    pub fn tunnel_id(&self) -> Option<&str> {
        self.tunnel_id.get().map(String::as_str)
    }

    /// Pid of the agent, while one has been spawned
    pub fn pid(&self) -> Option<u32> {
        self.process.as_ref().and_then(AgentProcess::pid)
    }

    /// Observe the agent's exit, while one has been spawned
    pub fn exit_watch(&self) -> Option<watch::Receiver<Option<AgentExit>>> {
        self.process.as_ref().map(AgentProcess::exit_watch)
    }

    /// Subscribe to tunnel events
    pub fn subscribe(&self) -> broadcast::Receiver<TunnelEvent> {
        self.event_tx.subscribe()
    }

    pub fn config(&self) -> &TunnelConfig {
        &self.config
    }

    /// List the account's tunnels
    pub async fn list_tunnels(&self) -> Result<Vec<TunnelResource>, TunnelError> {
        Ok(self.control_plane.list_tunnels().await?)
    }

    /// Start the tunnel and wait until it is ready
    ///
    /// Returns immediately when no tunnel is required.
    pub async fn start(&mut self) -> Result<(), TunnelError> {
        if !self.config.tunneled {
            debug!("Tunnel not required, skipping start");
            self.set_state(TunnelState::Disabled);
            return Ok(());
        }
        self.expect_state(&TunnelState::Idle)?;

        self.set_state(TunnelState::Starting);
        self.emit(TunnelEvent::status("Sauce Labs trying to open tunnel"));

        match self.open().await {
            Ok(()) => {
                info!(pid = ?self.pid(), "Sauce Labs tunnel established");
                self.set_state(TunnelState::Running);
                self.emit(TunnelEvent::status("Sauce Labs tunnel established"));
                Ok(())
            }
            Err(e) => {
                self.fail(&e);
                Err(e)
            }
        }
    }

    async fn open(&mut self) -> Result<(), TunnelError> {
        let executable = platform::executable_for(&self.config, &self.platform)?;
        info!(
            binary = %executable.path.display(),
            dialect = ?executable.dialect,
            tunnel_name = %self.config.tunnel_name,
            "Starting Sauce Connect"
        );

        let SpawnedAgent {
            process,
            stdout,
            stderr,
        } = AgentProcess::spawn(process::build_command(&executable, &self.config))?;

        let (settlement, outcome_rx) = Settlement::new();
        let settlement = Arc::new(settlement);

        let ready = Arc::clone(&settlement);
        let tunnel_id = Arc::clone(&self.tunnel_id);
        tokio::spawn(output::forward_output(
            stdout,
            OutputStream::Stdout,
            self.event_tx.clone(),
            move |line| match &line.kind {
                LineKind::Ready => {
                    ready.settle(StartOutcome::Ready);
                }
                LineKind::IdAnnounced(id) => record_tunnel_id(&tunnel_id, id),
                LineKind::Debug | LineKind::Unmatched => {}
            },
        ));
        tokio::spawn(output::forward_output(
            stderr,
            OutputStream::Stderr,
            self.event_tx.clone(),
            |_| {},
        ));

        let events = self.event_tx.clone();
        let exit_rx = process.exit_watch();
        tokio::spawn(async move {
            let exit = process::wait_for_exit(exit_rx).await;
            let _ = events.send(TunnelEvent::status(format!(
                "Sauce Labs tunnel disconnected ({})",
                exit
            )));
            settlement.settle(StartOutcome::Exited(exit));
        });

        self.process = Some(process);

        let deadline = self.config.start_timeout.map(|limit| Instant::now() + limit);
        match within(deadline, outcome_rx).await {
            Some(Ok(StartOutcome::Ready)) => Ok(()),
            Some(Ok(StartOutcome::Exited(exit))) => {
                warn!(%exit, "Sauce Connect exited before the tunnel was ready");
                Err(TunnelError::EarlyExit { code: exit.code })
            }
            // Both settlers are gone without a value; only possible if the runtime is shutting down.
            Some(Err(_)) => Err(TunnelError::EarlyExit { code: None }),
            None => {
                let limit = self.config.start_timeout.unwrap_or_default();
                warn!(?limit, "Sauce Connect did not become ready in time, killing it");
                self.kill_and_wait().await?;
                Err(TunnelError::Timeout(limit))
            }
        }
    }

    /// Close the tunnel and wait for the agent to exit
    ///
    /// The control plane is asked to delete the tunnel first; on success the
    /// agent exits by itself, otherwise it is killed and the deletion error
    /// is returned once the process is gone.
    pub async fn stop(&mut self) -> Result<(), TunnelError> {
        if !self.config.tunneled {
            debug!("Tunnel not required, skipping stop");
            self.set_state(TunnelState::Disabled);
            return Ok(());
        }
        self.expect_state(&TunnelState::Running)?;

        let exit_rx = match &self.process {
            Some(process) => process.exit_watch(),
            None => {
                return Err(TunnelError::InvalidState {
                    expected: "spawned agent".to_string(),
                    actual: "no agent".to_string(),
                });
            }
        };

        self.set_state(TunnelState::Stopping);
        self.emit(TunnelEvent::debug("Trying to kill tunnel"));

        let deadline = self.config.stop_timeout.map(|limit| Instant::now() + limit);
        let deletion = self.delete_remote(deadline).await;

        match &deletion {
            Ok(()) => {
                info!(tunnel_id = ?self.tunnel_id(), "Tunnel closed");
                self.emit(TunnelEvent::debug("Tunnel Closed"));
            }
            Err(e) => {
                warn!(error = %e, "Error closing tunnel, killing Sauce Connect");
                self.emit(TunnelEvent::error(format!("Error closing tunnel: {}", e)));
                self.request_kill();
            }
        }

        match self.await_exit(exit_rx, deletion.is_ok(), deadline).await {
            Ok(exit) => {
                info!(%exit, "Sauce Labs tunnel stopped");
                self.set_state(TunnelState::Stopped);
                deletion
            }
            Err(e) => {
                self.fail(&e);
                Err(e)
            }
        }
    }

    /// Force-terminate the agent without consulting the control plane
    pub async fn kill(&mut self) -> Result<(), TunnelError> {
        if self.process.is_none() {
            return Ok(());
        }

        match self.kill_and_wait().await {
            Ok(_) => {
                if !matches!(self.state, TunnelState::Failed { .. } | TunnelState::Disabled) {
                    self.set_state(TunnelState::Stopped);
                }
                Ok(())
            }
            Err(e) => {
                self.fail(&e);
                Err(e)
            }
        }
    }

    async fn delete_remote(&self, deadline: Option<Instant>) -> Result<(), TunnelError> {
        let Some(id) = self.tunnel_id() else {
            return Err(TunnelError::MissingTunnelId);
        };

        match within(deadline, self.control_plane.delete_tunnel(id)).await {
            Some(result) => result.map_err(TunnelError::from),
            None => Err(TunnelError::Timeout(
                self.config.stop_timeout.unwrap_or_default(),
            )),
        }
    }

    /// Wait for the exit, killing the agent if a graceful exit takes too long
    async fn await_exit(
        &self,
        exit_rx: watch::Receiver<Option<AgentExit>>,
        graceful: bool,
        deadline: Option<Instant>,
    ) -> Result<AgentExit, TunnelError> {
        if graceful {
            match within(deadline, process::wait_for_exit(exit_rx.clone())).await {
                Some(exit) => return Ok(exit),
                None => {
                    warn!("Sauce Connect still running after tunnel deletion, killing it");
                    self.request_kill();
                }
            }
        }

        let limit = self.config.kill_timeout;
        tokio::time::timeout(limit, process::wait_for_exit(exit_rx))
            .await
            .map_err(|_| TunnelError::KillTimeout(limit))
    }

    async fn kill_and_wait(&self) -> Result<Option<AgentExit>, TunnelError> {
        let Some(process) = &self.process else {
            return Ok(None);
        };
        let exit_rx = process.exit_watch();
        process.request_kill();

        let limit = self.config.kill_timeout;
        tokio::time::timeout(limit, process::wait_for_exit(exit_rx))
            .await
            .map(Some)
            .map_err(|_| TunnelError::KillTimeout(limit))
    }

    fn request_kill(&self) {
        if let Some(process) = &self.process {
            process.request_kill();
        }
    }

    fn expect_state(&self, expected: &TunnelState) -> Result<(), TunnelError> {
        if &self.state == expected {
            Ok(())
        } else {
            Err(TunnelError::InvalidState {
                expected: expected.to_string(),
                actual: self.state.to_string(),
            })
        }
    }

    fn fail(&mut self, e: &TunnelError) {
        error!(error = %e, "Sauce Labs tunnel failed");
        self.emit(TunnelEvent::error(e.to_string()));
        self.set_state(TunnelState::Failed {
            error: e.to_string(),
        });
    }

    /// Set state and log change
    fn set_state(&mut self, new_state: TunnelState) {
        debug!("Tunnel state: {} -> {}", self.state, new_state);
        self.state = new_state;
    }

    /// Emit an event
    fn emit(&self, event: TunnelEvent) {
        let _ = self.event_tx.send(event);
    }
}

/// Keep the first announced id; later announcements are stale log lines
fn record_tunnel_id(slot: &OnceLock<String>, id: &str) {
    match slot.set(id.to_string()) {
        Ok(()) => info!(tunnel_id = id, "Sauce Connect announced tunnel id"),
        Err(_) => {
            if slot.get().map(String::as_str) != Some(id) {
                debug!(tunnel_id = id, "Ignoring later tunnel id");
            }
        }
    }
}

/// Await `fut`, giving up at `deadline` if there is one
async fn within<F: Future>(deadline: Option<Instant>, fut: F) -> Option<F::Output> {
    match deadline {
        Some(deadline) => tokio::time::timeout_at(deadline, fut).await.ok(),
        None => Some(fut.await),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::control_plane::MockControlPlane;

    fn manager(config: TunnelConfig) -> (TunnelManager, Arc<MockControlPlane>) {
        let mock = Arc::new(MockControlPlane::new());
        let manager = TunnelManager::with_control_plane(config, mock.clone());
        (manager, mock)
    }

    #[test]
    fn record_tunnel_id_keeps_first_value() {
        let slot = OnceLock::new();
        record_tunnel_id(&slot, "aaaa");
        record_tunnel_id(&slot, "bbbb");
        assert_eq!(slot.get().map(String::as_str), Some("aaaa"));
    }

    #[tokio::test]
    async fn new_manager_is_idle() {
        let (manager, _) = manager(TunnelConfig::new("u1", "k1"));
        assert_eq!(manager.state(), &TunnelState::Idle);
        assert!(manager.tunnel_id().is_none());
        assert!(manager.pid().is_none());
    }

    #[tokio::test]
    async fn start_without_tunnel_is_pass_through() {
        let (mut manager, mock) = manager(TunnelConfig::new("u1", "k1").with_tunneled(false));

        manager.start().await.unwrap();
        assert_eq!(manager.state(), &TunnelState::Disabled);
        assert!(manager.pid().is_none());

        manager.stop().await.unwrap();
        assert_eq!(manager.state(), &TunnelState::Disabled);
        assert_eq!(mock.call_count(), 0);
    }

    #[tokio::test]
    async fn unsupported_platform_fails_before_spawn() {
        let (manager, mock) = manager(TunnelConfig::new("u1", "k1"));
        let mut manager = manager.with_platform(Platform::new("sunos", "sparc"));
        let mut events = manager.subscribe();

        let result = manager.start().await;

        assert!(matches!(result, Err(TunnelError::UnsupportedPlatform(_))));
        assert!(matches!(manager.state(), TunnelState::Failed { .. }));
        assert!(manager.pid().is_none());
        assert_eq!(mock.call_count(), 0);
        assert_eq!(
            events.recv().await.unwrap(),
            TunnelEvent::status("Sauce Labs trying to open tunnel")
        );
    }

    #[tokio::test]
    async fn stop_before_start_is_invalid() {
        let (mut manager, mock) = manager(TunnelConfig::new("u1", "k1"));
        let result = manager.stop().await;
        assert!(matches!(result, Err(TunnelError::InvalidState { .. })));
        assert_eq!(manager.state(), &TunnelState::Idle);
        assert_eq!(mock.call_count(), 0);
    }

    #[tokio::test]
    async fn kill_without_process_resolves_immediately() {
        let (mut manager, _) = manager(TunnelConfig::new("u1", "k1"));
        manager.kill().await.unwrap();
        assert_eq!(manager.state(), &TunnelState::Idle);
    }

    #[tokio::test]
    async fn failed_manager_cannot_restart() {
        let (manager, _) = manager(TunnelConfig::new("u1", "k1"));
        let mut manager = manager.with_platform(Platform::new("sunos", "sparc"));

        assert!(manager.start().await.is_err());
        let retry = manager.start().await;
        assert!(matches!(retry, Err(TunnelError::InvalidState { .. })));
    }

    #[tokio::test]
    async fn unconfirmed_kill_fails_running_tunnel() {
        let config = TunnelConfig::new("u1", "k1").with_kill_timeout(Duration::from_millis(50));
        let (mut manager, mock) = manager(config);
        let (process, mut kill_rx, _exit_tx) = AgentProcess::detached();
        manager.process = Some(process);
        manager.state = TunnelState::Running;

        let result = manager.kill().await;

        assert!(matches!(result, Err(TunnelError::KillTimeout(_))));
        assert!(matches!(manager.state(), TunnelState::Failed { .. }));
        assert!(kill_rx.try_recv().is_ok());
        assert_eq!(mock.call_count(), 0);
    }

    #[tokio::test]
    async fn kill_confirmed_by_exit_stops_tunnel() {
        let (mut manager, _) = manager(TunnelConfig::new("u1", "k1"));
        let (process, mut kill_rx, exit_tx) = AgentProcess::detached();
        manager.process = Some(process);
        manager.state = TunnelState::Running;

        tokio::spawn(async move {
            if kill_rx.recv().await.is_some() {
                exit_tx.send_replace(Some(AgentExit { code: None }));
            }
        });

        manager.kill().await.unwrap();
        assert_eq!(manager.state(), &TunnelState::Stopped);
    }

    #[tokio::test]
    async fn list_tunnels_delegates_to_control_plane() {
        let mock = Arc::new(
            MockControlPlane::new().with_tunnels(vec![TunnelResource::new("aaaa")]),
        );
        let manager = TunnelManager::with_control_plane(TunnelConfig::new("u1", "k1"), mock.clone());

        let tunnels = manager.list_tunnels().await.unwrap();
        assert_eq!(tunnels, vec![TunnelResource::new("aaaa")]);
        assert_eq!(mock.list_calls(), 1);
    }

    #[tokio::test]
    async fn within_without_deadline_waits() {
        assert_eq!(within(None, async { 7 }).await, Some(7));
    }

    #[tokio::test(start_paused = true)]
    async fn within_gives_up_at_deadline() {
        let deadline = Instant::now() + Duration::from_secs(1);
        let never = std::future::pending::<()>();
        assert_eq!(within(Some(deadline), never).await, None);
    }
}
