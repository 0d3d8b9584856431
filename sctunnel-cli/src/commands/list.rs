//! List the account's tunnels

use anyhow::Result;
use comfy_table::{Cell, Color, ContentArrangement, Table, presets::UTF8_FULL_CONDENSED};
use sctunnel_core::{ControlPlane, TunnelResource};

use super::{CredentialArgs, rest_client};
use crate::config::ConfigLoader;

/// Run the list command
pub async fn run(credentials: &CredentialArgs) -> Result<()> {
    let config = ConfigLoader::load()?;
    let client = rest_client(credentials, &config)?;

    let tunnels = client.list_tunnels().await?;
    if tunnels.is_empty() {
        println!("No tunnels running.");
        return Ok(());
    }

    println!("{}", render(&tunnels));
    Ok(())
}

fn render(tunnels: &[TunnelResource]) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("Id").fg(Color::Cyan),
        Cell::new("Name").fg(Color::Cyan),
        Cell::new("Status").fg(Color::Cyan),
    ]);

    for tunnel in tunnels {
        table.add_row(vec![
            Cell::new(&tunnel.id),
            Cell::new(tunnel.tunnel_identifier.as_deref().unwrap_or("-")),
            Cell::new(tunnel.status.as_deref().unwrap_or("-")),
        ]);
    }
    table
}
