//! Open a tunnel and keep it up until interrupted

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::Args;
use humantime_serde::re::humantime;
use sctunnel_core::process::wait_for_exit;
use sctunnel_core::{AgentProtocol, Region, TunnelConfig, TunnelEvent, TunnelManager};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::CredentialArgs;
use crate::config::{ConfigLoader, SctunnelConfig};

/// How long to keep printing events after the tunnel is closed
const EVENT_FLUSH_TIMEOUT: Duration = Duration::from_secs(2);

/// Arguments for the start command
#[derive(Debug, Args)]
pub struct StartArgs {
    /// Run without opening a tunnel
    #[arg(long)]
    pub no_tunnel: bool,

    /// Tunnel name (defaults to a generated one)
    #[arg(long)]
    pub name: Option<String>,

    /// Sauce Labs data center
    #[arg(long)]
    pub region: Option<Region>,

    /// Agent generation: legacy (sc4) or modern (sc5)
    #[arg(long)]
    pub protocol: Option<AgentProtocol>,

    /// Root of the vendored agent binaries
    #[arg(long)]
    pub vendor_dir: Option<PathBuf>,

    /// Agent binary to run instead of the vendored one
    #[arg(long)]
    pub binary: Option<PathBuf>,

    /// Give up if the tunnel is not ready in time (e.g. "2m")
    #[arg(long, value_parser = humantime::parse_duration)]
    pub start_timeout: Option<Duration>,

    /// Kill the agent if it has not exited this long after stop (e.g. "30s")
    #[arg(long, value_parser = humantime::parse_duration)]
    pub stop_timeout: Option<Duration>,

    /// Extra arguments passed to the agent
    #[arg(last = true)]
    pub extra: Vec<String>,
}

impl StartArgs {
    /// Apply flags on top of the loaded config
    fn apply(&self, config: &mut SctunnelConfig) {
        if self.no_tunnel {
            config.tunnel.enabled = false;
        }
        if let Some(name) = &self.name {
            config.tunnel.name = Some(name.clone());
        }
        if let Some(region) = self.region {
            config.sauce.region = region;
        }
        if let Some(protocol) = self.protocol {
            config.sauce.protocol = protocol;
        }
        if let Some(dir) = &self.vendor_dir {
            config.tunnel.vendor_dir = dir.clone();
        }
        if let Some(binary) = &self.binary {
            config.tunnel.binary = Some(binary.clone());
        }
        if self.start_timeout.is_some() {
            config.tunnel.start_timeout = self.start_timeout;
        }
        if self.stop_timeout.is_some() {
            config.tunnel.stop_timeout = self.stop_timeout;
        }
        if !self.extra.is_empty() {
            config.tunnel.args = self.extra.clone();
        }
    }
}

/// Run the start command
pub async fn run(args: StartArgs, credentials: &CredentialArgs, verbose: bool) -> Result<()> {
    let mut config = ConfigLoader::load()?;
    args.apply(&mut config);

    let tunnel = tunnel_config(credentials, &config)?;
    let tunneled = tunnel.tunneled;
    let mut manager = TunnelManager::new(tunnel)?;
    let printer = tokio::spawn(print_events(manager.subscribe(), verbose));

    manager.start().await.context("Failed to open Sauce Labs tunnel")?;

    if !tunneled {
        println!("No tunnel required");
        printer.abort();
        return Ok(());
    }

    println!(
        "Tunnel {} is up (id: {}), press Ctrl-C to close it",
        manager.config().tunnel_name,
        manager.tunnel_id().unwrap_or("pending")
    );

    let Some(exit_rx) = manager.exit_watch() else {
        bail!("Sauce Connect is not running");
    };

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result.context("Failed to listen for Ctrl-C")?;
            info!("Interrupted, closing tunnel");
        }
        exit = wait_for_exit(exit_rx) => {
            printer.abort();
            bail!("Sauce Connect exited unexpectedly ({})", exit);
        }
    }

    let stopped = manager.stop().await;
    flush_events(manager, printer).await;
    stopped.context("Failed to close Sauce Labs tunnel cleanly")?;

    println!("Tunnel closed");
    Ok(())
}

/// A tunnel that is not required needs no account
fn tunnel_config(credentials: &CredentialArgs, config: &SctunnelConfig) -> Result<TunnelConfig> {
    if config.tunnel.enabled {
        credentials.tunnel_config(config)
    } else {
        Ok(config.tunnel_config(String::new(), String::new()))
    }
}

/// Let the printer drain what the agent reported while shutting down
///
/// The channel closes once the manager and its output tasks are gone.
/// Returns whether everything was printed.
async fn flush_events(manager: TunnelManager, printer: JoinHandle<()>) -> bool {
    drop(manager);
    let drained = tokio::time::timeout(EVENT_FLUSH_TIMEOUT, printer).await.is_ok();
    if !drained {
        debug!("Agent output still open after stop, not waiting for it");
    }
    drained
}

async fn print_events(mut events: broadcast::Receiver<TunnelEvent>, verbose: bool) {
    loop {
        match events.recv().await {
            Ok(TunnelEvent::Status { message }) => println!("{}", message),
            Ok(TunnelEvent::Error { line }) => eprintln!("{}", line),
            Ok(TunnelEvent::Debug { line }) => {
                if verbose {
                    println!("{}", line);
                }
            }
            Err(broadcast::error::RecvError::Lagged(_)) => continue,
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
