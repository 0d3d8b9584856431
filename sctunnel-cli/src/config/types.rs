use std::path::PathBuf;
use std::time::Duration;

use sctunnel_core::{AgentProtocol, Region, TunnelConfig};
use serde::{Deserialize, Serialize};
use url::Url;

/// Configuration as stored in TOML files (with optional fields for merging)
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawSctunnelConfig {
    #[serde(default)]
    pub sauce: RawSauceConfig,

    #[serde(default)]
    pub tunnel: RawTunnelSection,
}

/// Account settings as stored in TOML
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawSauceConfig {
    pub username: Option<String>,
    pub access_key: Option<String>,
    pub region: Option<Region>,
    pub protocol: Option<AgentProtocol>,
    pub api_base_url: Option<Url>,
}

/// Tunnel settings as stored in TOML
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawTunnelSection {
    pub enabled: Option<bool>,
    pub name: Option<String>,
    pub vendor_dir: Option<PathBuf>,
    pub binary: Option<PathBuf>,
    pub args: Option<Vec<String>>,
    #[serde(default, with = "humantime_serde")]
    pub start_timeout: Option<Duration>,
    #[serde(default, with = "humantime_serde")]
    pub stop_timeout: Option<Duration>,
    #[serde(default, with = "humantime_serde")]
    pub kill_timeout: Option<Duration>,
}

/// Final configuration with defaults applied
#[derive(Debug, Clone, Serialize, Default)]
pub struct SctunnelConfig {
    pub sauce: SauceConfig,
    pub tunnel: TunnelSection,
}

#[derive(Debug, Clone, Serialize, Default)]
pub struct SauceConfig {
    pub username: Option<String>,

    /// Never written out by `config show`
    #[serde(skip_serializing)]
    pub access_key: Option<String>,

    pub region: Region,
    pub protocol: AgentProtocol,
    pub api_base_url: Option<Url>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TunnelSection {
    /// Open a tunnel at all
    pub enabled: bool,

    /// Tunnel name; generated per run when unset
    pub name: Option<String>,

    /// Root of the vendored agent binaries
    pub vendor_dir: PathBuf,

    /// Explicit agent binary
    pub binary: Option<PathBuf>,

    /// Extra agent arguments
    pub args: Vec<String>,

    #[serde(with = "humantime_serde")]
    pub start_timeout: Option<Duration>,

    #[serde(with = "humantime_serde")]
    pub stop_timeout: Option<Duration>,

    #[serde(with = "humantime_serde")]
    pub kill_timeout: Duration,
}

impl Default for TunnelSection {
    fn default() -> Self {
        Self {
            enabled: true,
            name: None,
            vendor_dir: PathBuf::from(DEFAULT_VENDOR_DIR),
            binary: None,
            args: Vec::new(),
            start_timeout: None,
            stop_timeout: None,
            kill_timeout: DEFAULT_KILL_TIMEOUT,
        }
    }
}

/// Default root of the vendored agent binaries
pub const DEFAULT_VENDOR_DIR: &str = "vendor";

/// Default wait for a killed agent
pub const DEFAULT_KILL_TIMEOUT: Duration = Duration::from_secs(10);

impl SctunnelConfig {
    /// Build the core tunnel config for an account
    pub fn tunnel_config(&self, username: String, access_key: String) -> TunnelConfig {
        let mut config = TunnelConfig::new(username, access_key)
            .with_tunneled(self.tunnel.enabled)
            .with_region(self.sauce.region)
            .with_protocol(self.sauce.protocol)
            .with_extra_args(self.tunnel.args.iter().cloned())
            .with_vendor_dir(self.tunnel.vendor_dir.clone())
            .with_kill_timeout(self.tunnel.kill_timeout);

        if let Some(name) = &self.tunnel.name {
            config = config.with_tunnel_name(name.clone());
        }
        if let Some(binary) = &self.tunnel.binary {
            config = config.with_binary_path(binary.clone());
        }
        if let Some(url) = &self.sauce.api_base_url {
            config = config.with_api_base_url(url.clone());
        }
        if let Some(timeout) = self.tunnel.start_timeout {
            config = config.with_start_timeout(timeout);
        }
        if let Some(timeout) = self.tunnel.stop_timeout {
            config = config.with_stop_timeout(timeout);
        }
        config
    }
}
