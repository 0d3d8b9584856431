//! Sauce Connect process spawning and supervision
//!
//! The [`Child`] is owned by a supervisor task. Callers hold an
//! [`AgentProcess`], which can request a kill and observe the exit through a
//! `watch` channel; nothing else touches the OS handle.

use std::fmt;
use std::process::Stdio;

use tokio::process::{Child, ChildStderr, ChildStdout, Command};
use tokio::sync::{mpsc, watch};
use tracing::{info, warn};

use crate::config::TunnelConfig;
use crate::error::TunnelError;
use crate::platform::AgentExecutable;

/// How the agent process ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AgentExit {
    /// Exit code, `None` when terminated by a signal
    pub code: Option<i32>,
}

impl fmt::Display for AgentExit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code {
            Some(code) => write!(f, "code {}", code),
            None => f.write_str("terminated by signal"),
        }
    }
}

/// Build the agent command line for a resolved executable
///
/// Credentials end up in the arguments or the environment depending on the
/// dialect, so the returned command must never be logged.
pub fn build_command(executable: &AgentExecutable, config: &TunnelConfig) -> Command {
    let mut cmd = Command::new(&executable.path);
    cmd.args(executable.dialect.args(config))
        .envs(executable.dialect.env(config))
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    cmd
}

/// A spawned agent and its output pipes
pub struct SpawnedAgent {
    pub process: AgentProcess,
    pub stdout: ChildStdout,
    pub stderr: ChildStderr,
}

/// Handle to a supervised agent process
///
/// Dropping the handle kills the agent.
#[derive(Debug)]
pub struct AgentProcess {
    pid: Option<u32>,
    kill_tx: mpsc::Sender<()>,
    exit_rx: watch::Receiver<Option<AgentExit>>,
}

impl AgentProcess {
    /// Spawn `cmd` and hand the child to a supervisor task
    pub fn spawn(mut cmd: Command) -> Result<SpawnedAgent, TunnelError> {
        let mut child = cmd.spawn().map_err(TunnelError::Spawn)?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| TunnelError::Io(std::io::Error::other("agent stdout not captured")))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| TunnelError::Io(std::io::Error::other("agent stderr not captured")))?;

        let pid = child.id();
        let (kill_tx, kill_rx) = mpsc::channel(1);
        let (exit_tx, exit_rx) = watch::channel(None);

        tokio::spawn(supervise(child, pid, kill_rx, exit_tx));

        Ok(SpawnedAgent {
            process: Self {
                pid,
                kill_tx,
                exit_rx,
            },
            stdout,
            stderr,
        })
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Ask the supervisor to force-terminate the agent; repeated calls are harmless
    pub fn request_kill(&self) {
        let _ = self.kill_tx.try_send(());
    }

    /// Receiver that observes the exit, including one that already happened
    pub fn exit_watch(&self) -> watch::Receiver<Option<AgentExit>> {
        self.exit_rx.clone()
    }

    /// The exit, if it has been observed
    pub fn exit(&self) -> Option<AgentExit> {
        *self.exit_rx.borrow()
    }

    pub async fn wait(&self) -> AgentExit {
        wait_for_exit(self.exit_watch()).await
    }

    /// Handle with no process behind it; the caller plays the supervisor
    #[cfg(test)]
    pub(crate) fn detached() -> (
        Self,
        mpsc::Receiver<()>,
        watch::Sender<Option<AgentExit>>,
    ) {
        let (kill_tx, kill_rx) = mpsc::channel(1);
        let (exit_tx, exit_rx) = watch::channel(None);
        let process = Self {
            pid: None,
            kill_tx,
            exit_rx,
        };
        (process, kill_rx, exit_tx)
    }
}

/// Wait until the watched agent has exited
pub async fn wait_for_exit(mut exit_rx: watch::Receiver<Option<AgentExit>>) -> AgentExit {
    match exit_rx.wait_for(Option::is_some).await {
        Ok(exit) => exit.unwrap_or(AgentExit { code: None }),
        // Supervisor gone without reporting; the child was dropped and killed.
        Err(_) => AgentExit { code: None },
    }
}

async fn supervise(
    mut child: Child,
    pid: Option<u32>,
    mut kill_rx: mpsc::Receiver<()>,
    exit_tx: watch::Sender<Option<AgentExit>>,
) {
    let status = tokio::select! {
        status = child.wait() => status,
        // Fires on an explicit request and when every handle is dropped.
        _ = kill_rx.recv() => {
            info!(pid = ?pid, "Killing Sauce Connect");
            if let Err(e) = child.start_kill() {
                warn!(pid = ?pid, error = %e, "Failed to kill Sauce Connect");
            }
            child.wait().await
        }
    };

    let exit = match status {
        Ok(status) => AgentExit {
            code: status.code(),
        },
        Err(e) => {
            warn!(pid = ?pid, error = %e, "Failed to wait for Sauce Connect");
            AgentExit { code: None }
        }
    };

    info!(pid = ?pid, %exit, "Sauce Connect exited");
    exit_tx.send_replace(Some(exit));
}
