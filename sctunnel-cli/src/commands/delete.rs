//! Delete a tunnel through the control plane

use anyhow::{Context, Result};
use clap::Args;
use sctunnel_core::ControlPlane;

use super::{CredentialArgs, rest_client};
use crate::config::ConfigLoader;

/// Arguments for the delete command
#[derive(Debug, Args)]
pub struct DeleteArgs {
    /// Tunnel id, as printed by `sctunnel list`
    pub id: String,
}

/// Run the delete command
pub async fn run(args: DeleteArgs, credentials: &CredentialArgs) -> Result<()> {
    let config = ConfigLoader::load()?;
    let client = rest_client(credentials, &config)?;

    client
        .delete_tunnel(&args.id)
        .await
        .with_context(|| format!("Failed to delete tunnel {}", args.id))?;

    println!("Deleted tunnel {}", args.id);
    Ok(())
}
