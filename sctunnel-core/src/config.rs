//! Tunnel configuration types

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use url::Url;

/// Prefix for generated tunnel names
pub const TUNNEL_NAME_PREFIX: &str = "Tunnel";

/// Configuration for one Sauce Connect tunnel
#[derive(Clone, Serialize, Deserialize, PartialEq)]
pub struct TunnelConfig {
    /// Sauce Labs username
    pub username: String,

    /// Sauce Labs access key
    pub access_key: String,

    /// Tunnel name passed to the agent
    #[serde(default = "default_tunnel_name")]
    pub tunnel_name: String,

    /// Whether a tunnel is actually required
    #[serde(default = "default_tunneled")]
    pub tunneled: bool,

    /// Sauce Labs data center
    #[serde(default)]
    pub region: Region,

    /// Agent generation, decides argument dialect and API host
    #[serde(default)]
    pub protocol: AgentProtocol,

    /// Extra arguments appended to the agent command line
    #[serde(default)]
    pub extra_args: Vec<String>,

    /// Root of the vendored agent binaries
    #[serde(default = "default_vendor_dir")]
    pub vendor_dir: PathBuf,

    /// Explicit agent binary, skips platform resolution
    #[serde(default)]
    pub binary_path: Option<PathBuf>,

    /// Control plane origin override
    #[serde(default)]
    pub api_base_url: Option<Url>,

    /// Deadline for the readiness line (none waits forever)
    #[serde(default, with = "humantime_serde")]
    pub start_timeout: Option<Duration>,

    /// Deadline for the agent to exit during stop (none waits forever)
    #[serde(default, with = "humantime_serde")]
    pub stop_timeout: Option<Duration>,

    /// How long to wait for a killed agent to exit
    #[serde(default = "default_kill_timeout", with = "humantime_serde")]
    pub kill_timeout: Duration,
}

/// Generate a tunnel name from the current timestamp
pub fn default_tunnel_name() -> String {
    format!("{}{}", TUNNEL_NAME_PREFIX, Utc::now().timestamp_millis())
}

fn default_tunneled() -> bool {
    true
}

fn default_vendor_dir() -> PathBuf {
    PathBuf::from("vendor")
}

fn default_kill_timeout() -> Duration {
    Duration::from_secs(10)
}

impl TunnelConfig {
    /// Create a config with defaults for everything but credentials
    pub fn new(username: impl Into<String>, access_key: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            access_key: access_key.into(),
            tunnel_name: default_tunnel_name(),
            tunneled: default_tunneled(),
            region: Region::default(),
            protocol: AgentProtocol::default(),
            extra_args: Vec::new(),
            vendor_dir: default_vendor_dir(),
            binary_path: None,
            api_base_url: None,
            start_timeout: None,
            stop_timeout: None,
            kill_timeout: default_kill_timeout(),
        }
    }

    #[must_use]
    pub fn with_tunnel_name(mut self, name: impl Into<String>) -> Self {
        self.tunnel_name = name.into();
        self
    }

    #[must_use]
    pub fn with_tunneled(mut self, tunneled: bool) -> Self {
        self.tunneled = tunneled;
        self
    }

    #[must_use]
    pub fn with_region(mut self, region: Region) -> Self {
        self.region = region;
        self
    }

    #[must_use]
    pub fn with_protocol(mut self, protocol: AgentProtocol) -> Self {
        self.protocol = protocol;
        self
    }

    #[must_use]
    pub fn with_extra_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extra_args = args.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn with_vendor_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.vendor_dir = path.into();
        self
    }

    #[must_use]
    pub fn with_binary_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.binary_path = Some(path.into());
        self
    }

    #[must_use]
    pub fn with_api_base_url(mut self, url: Url) -> Self {
        self.api_base_url = Some(url);
        self
    }

    #[must_use]
    pub fn with_start_timeout(mut self, timeout: Duration) -> Self {
        self.start_timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn with_stop_timeout(mut self, timeout: Duration) -> Self {
        self.stop_timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn with_kill_timeout(mut self, timeout: Duration) -> Self {
        self.kill_timeout = timeout;
        self
    }
}

// The access key must never reach logs, so Debug is written by hand.
impl fmt::Debug for TunnelConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TunnelConfig")
            .field("username", &self.username)
            .field("access_key", &"<redacted>")
            .field("tunnel_name", &self.tunnel_name)
            .field("tunneled", &self.tunneled)
            .field("region", &self.region)
            .field("protocol", &self.protocol)
            .field("extra_args", &self.extra_args)
            .field("vendor_dir", &self.vendor_dir)
            .field("binary_path", &self.binary_path)
            .field("api_base_url", &self.api_base_url)
            .field("start_timeout", &self.start_timeout)
            .field("stop_timeout", &self.stop_timeout)
            .field("kill_timeout", &self.kill_timeout)
            .finish()
    }
}

/// Agent generation
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AgentProtocol {
    /// Sauce Connect 4: `-u/-k/-i` flags, credentials on the command line
    #[default]
    Legacy,
    /// Sauce Connect 5: `run` subcommand, credentials in the environment
    Modern,
}

impl AgentProtocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Legacy => "legacy",
            Self::Modern => "modern",
        }
    }
}

impl fmt::Display for AgentProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AgentProtocol {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "legacy" | "sc4" => Ok(Self::Legacy),
            "modern" | "sc5" => Ok(Self::Modern),
            other => Err(format!("unknown protocol: {other}")),
        }
    }
}

/// Sauce Labs data center
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum Region {
    #[default]
    UsWest,
    UsEast,
    EuCentral,
    ApacSoutheast,
}

impl Region {
    /// Name used on the agent command line
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UsWest => "us-west",
            Self::UsEast => "us-east",
            Self::EuCentral => "eu-central",
            Self::ApacSoutheast => "apac-southeast",
        }
    }

    /// REST API host for this data center
    pub fn api_host(&self) -> &'static str {
        match self {
            Self::UsWest => "api.us-west-1.saucelabs.com",
            Self::UsEast => "api.us-east-4.saucelabs.com",
            Self::EuCentral => "api.eu-central-1.saucelabs.com",
            Self::ApacSoutheast => "api.apac-southeast-1.saucelabs.com",
        }
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Region {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "us-west" | "us-west-1" => Ok(Self::UsWest),
            "us-east" | "us-east-4" => Ok(Self::UsEast),
            "eu-central" | "eu-central-1" => Ok(Self::EuCentral),
            "apac-southeast" | "apac-southeast-1" => Ok(Self::ApacSoutheast),
            other => Err(format!("unknown region: {other}")),
        }
    }
}
