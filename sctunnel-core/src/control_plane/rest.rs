//! Sauce Labs REST client
//!
//! Talks to `/rest/v1/<username>/tunnels`. Every request carries the
//! account credentials as HTTP basic auth.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::{debug, warn};
use url::Url;

use super::traits::{ControlPlane, TunnelResource};
use crate::config::{AgentProtocol, TunnelConfig};
use crate::error::ControlPlaneError;

/// Origin used by Sauce Connect 4 accounts
const LEGACY_ORIGIN: &str = "https://saucelabs.com";

/// List entries are either bare ids or full objects, depending on the endpoint version
#[derive(Deserialize)]
#[serde(untagged)]
enum ListedTunnel {
    Id(String),
    Full(TunnelResource),
}

impl From<ListedTunnel> for TunnelResource {
    fn from(listed: ListedTunnel) -> Self {
        match listed {
            ListedTunnel::Id(id) => TunnelResource::new(id),
            ListedTunnel::Full(resource) => resource,
        }
    }
}

/// Build `<origin>/rest/v1/<username>` for a config
pub fn account_url(config: &TunnelConfig) -> Result<Url, ControlPlaneError> {
    let origin = match (&config.api_base_url, config.protocol) {
        (Some(url), _) => url.clone(),
        (None, AgentProtocol::Legacy) => Url::parse(LEGACY_ORIGIN)
            .map_err(|e| ControlPlaneError::InvalidUrl(e.to_string()))?,
        (None, AgentProtocol::Modern) => Url::parse(&format!("https://{}", config.region.api_host()))
            .map_err(|e| ControlPlaneError::InvalidUrl(e.to_string()))?,
    };
    with_segments(origin, &["rest", "v1", &config.username])
}

fn with_segments(mut url: Url, segments: &[&str]) -> Result<Url, ControlPlaneError> {
    let display = url.to_string();
    url.path_segments_mut()
        .map_err(|_| ControlPlaneError::InvalidUrl(display))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

/// HTTP implementation of [`ControlPlane`]
#[derive(Clone)]
pub struct SauceRestClient {
    http: reqwest::Client,
    account_url: Url,
    username: String,
    access_key: String,
}

impl SauceRestClient {
    pub fn new(account_url: Url, username: impl Into<String>, access_key: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            account_url,
            username: username.into(),
            access_key: access_key.into(),
        }
    }

    /// Client for the account and data center named in a config
    pub fn from_config(config: &TunnelConfig) -> Result<Self, ControlPlaneError> {
        Ok(Self::new(
            account_url(config)?,
            &config.username,
            &config.access_key,
        ))
    }

    pub fn account_url(&self) -> &Url {
        &self.account_url
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, ControlPlaneError> {
        with_segments(self.account_url.clone(), segments)
    }
}

impl std::fmt::Debug for SauceRestClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SauceRestClient")
            .field("account_url", &self.account_url)
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl ControlPlane for SauceRestClient {
    async fn list_tunnels(&self) -> Result<Vec<TunnelResource>, ControlPlaneError> {
        let url = self.endpoint(&["tunnels"])?;
        debug!(%url, "Listing tunnels");

        let response = self
            .http
            .get(url)
            .basic_auth(&self.username, Some(&self.access_key))
            .send()
            .await
            .map_err(ControlPlaneError::Network)?;

        let status = response.status();
        if !status.is_success() {
            warn!(status = status.as_u16(), "Listing tunnels failed");
            return Err(ControlPlaneError::from_status(status.as_u16()));
        }

        let listed: Vec<ListedTunnel> = response
            .json()
            .await
            .map_err(|e| ControlPlaneError::Decode(e.to_string()))?;

        Ok(listed.into_iter().map(Into::into).collect())
    }

    async fn delete_tunnel(&self, id: &str) -> Result<(), ControlPlaneError> {
        let url = self.endpoint(&["tunnels", id])?;
        debug!(%url, "Deleting tunnel");

        let response = self
            .http
            .delete(url)
            .basic_auth(&self.username, Some(&self.access_key))
            .send()
            .await
            .map_err(ControlPlaneError::Network)?;

        match response.status() {
            StatusCode::OK => Ok(()),
            status => {
                warn!(status = status.as_u16(), tunnel_id = id, "Deleting tunnel failed");
                Err(ControlPlaneError::from_status(status.as_u16()))
            }
        }
    }
}
