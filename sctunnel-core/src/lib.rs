//! sctunnel-core: Sauce Connect tunnel lifecycle management
//!
//! This crate opens and closes Sauce Labs tunnels for a test run:
//!
//! - **Platform resolution** - [`platform`] picks the bundled agent executable and its command line
//! - **Control plane** - [`ControlPlane`] and [`SauceRestClient`] list and delete tunnels
//! - **Output classification** - [`output`] turns agent output into readiness, tunnel ids and events
//! - **Lifecycle** - [`TunnelManager`] starts the agent, waits for readiness and shuts it down
//!
//! # Quick Start
//!
//! ```no_run
//! use sctunnel_core::{TunnelConfig, TunnelManager};
//!
//! async fn example() -> Result<(), sctunnel_core::TunnelError> {
//!     let config = TunnelConfig::new("username", "access-key").with_tunnel_name("ci");
//!     let mut manager = TunnelManager::new(config)?;
//!
//!     manager.start().await?;
//!     println!("Tunnel {:?} is up", manager.tunnel_id());
//!
//!     manager.stop().await
//! }
//! ```
//!
//! # Lifecycle
//!
//! ```text
//! Idle ──start──> Starting ──ready──> Running ──stop──> Stopping ──exit──> Stopped
//!   │                │                                     │
//!   │                └──exit/timeout──> Failed <──kill timeout┘
//!   └──(not tunneled)──> Disabled
//! ```

pub mod config;
pub mod control_plane;
pub mod error;
pub mod manager;
pub mod output;
pub mod platform;
pub mod process;
pub mod settle;
pub mod state;

// Re-export key types for convenience
pub use config::{AgentProtocol, Region, TunnelConfig};
pub use control_plane::{ControlPlane, MockControlPlane, SauceRestClient, TunnelResource};
pub use error::{ControlPlaneError, TunnelError};
pub use manager::TunnelManager;
pub use output::{ClassifiedLine, LineKind, OutputStream};
pub use platform::{AgentExecutable, ArgDialect, Platform};
pub use process::{AgentExit, AgentProcess};
pub use state::{TunnelEvent, TunnelState};
