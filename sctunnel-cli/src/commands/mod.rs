pub mod config;
pub mod delete;
pub mod list;
pub mod start;

use anyhow::{Result, bail};
use clap::Args;
use sctunnel_core::platform::{ACCESS_KEY_ENV, USERNAME_ENV};
use sctunnel_core::{SauceRestClient, TunnelConfig};

use crate::config::SctunnelConfig;

/// Sauce Labs account credentials
#[derive(Debug, Default, Args)]
pub struct CredentialArgs {
    /// Sauce Labs username
    #[arg(long, global = true, env = USERNAME_ENV)]
    pub username: Option<String>,

    /// Sauce Labs access key
    #[arg(long, global = true, env = ACCESS_KEY_ENV, hide_env_values = true)]
    pub access_key: Option<String>,
}

impl CredentialArgs {
    /// Resolve credentials, flags and env first, then the config file
    pub fn resolve(&self, config: &SctunnelConfig) -> Result<(String, String)> {
        let username = self
            .username
            .clone()
            .or_else(|| config.sauce.username.clone());
        let access_key = self
            .access_key
            .clone()
            .or_else(|| config.sauce.access_key.clone());

        match (username, access_key) {
            (Some(username), Some(access_key)) => Ok((username, access_key)),
            (None, _) => bail!("Missing Sauce Labs username (use --username or {USERNAME_ENV})"),
            (_, None) => {
                bail!("Missing Sauce Labs access key (use --access-key or {ACCESS_KEY_ENV})")
            }
        }
    }

    /// Core tunnel config for these credentials
    pub fn tunnel_config(&self, config: &SctunnelConfig) -> Result<TunnelConfig> {
        let (username, access_key) = self.resolve(config)?;
        Ok(config.tunnel_config(username, access_key))
    }
}

/// REST client for the configured account
pub fn rest_client(credentials: &CredentialArgs, config: &SctunnelConfig) -> Result<SauceRestClient> {
    let tunnel = credentials.tunnel_config(config)?;
    Ok(SauceRestClient::from_config(&tunnel)?)
}
