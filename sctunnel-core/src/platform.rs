//! Platform resolution and agent command-line dialects
//!
//! The vendored agent lives at `<vendor_dir>/<platform>/bin/<executable>`,
//! where `<platform>` is one of the keys in [`BINARIES`]. Resolution is pure
//! and runs once per tunnel, before the agent is spawned.

use std::path::{Path, PathBuf};

use crate::config::{AgentProtocol, TunnelConfig};
use crate::error::TunnelError;

/// Environment variable carrying the username in the subcommand dialect
pub const USERNAME_ENV: &str = "SAUCE_USERNAME";

/// Environment variable carrying the access key in the subcommand dialect
pub const ACCESS_KEY_ENV: &str = "SAUCE_ACCESS_KEY";

/// Vendored executable per platform key
const BINARIES: &[(&str, &str)] = &[
    ("darwin", "sc"),
    ("linux", "sc"),
    ("linux32", "sc"),
    ("win32", "sc.exe"),
];

const ARCH_32BIT_X86: &[&str] = &["x86", "ia32", "i386", "i686"];

/// Host operating system and CPU architecture
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Platform {
    pub os: String,
    pub arch: String,
}

impl Platform {
    pub fn new(os: impl Into<String>, arch: impl Into<String>) -> Self {
        Self {
            os: os.into(),
            arch: arch.into(),
        }
    }

    /// The platform this process is running on
    pub fn current() -> Self {
        Self::new(std::env::consts::OS, std::env::consts::ARCH)
    }

    /// Key into the binary table, e.g. `darwin` or `linux32`
    pub fn key(&self) -> String {
        let os = match self.os.as_str() {
            "macos" => "darwin",
            "windows" => "win32",
            other => other,
        };

        if os == "linux" && ARCH_32BIT_X86.contains(&self.arch.as_str()) {
            "linux32".to_string()
        } else {
            os.to_string()
        }
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.os, self.arch)
    }
}

/// Resolved agent binary and how to talk to it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentExecutable {
    pub path: PathBuf,
    pub dialect: ArgDialect,
}

/// Look up the vendored agent for a platform
pub fn resolve(
    platform: &Platform,
    protocol: AgentProtocol,
    vendor_dir: &Path,
) -> Result<AgentExecutable, TunnelError> {
    let key = platform.key();
    let executable = BINARIES
        .iter()
        .find(|(k, _)| *k == key)
        .map(|(_, exe)| *exe)
        .ok_or_else(|| TunnelError::UnsupportedPlatform(key.clone()))?;

    Ok(AgentExecutable {
        path: vendor_dir.join(&key).join("bin").join(executable),
        dialect: protocol.into(),
    })
}

/// Resolve the agent for a config, honouring an explicit `binary_path`
pub fn executable_for(
    config: &TunnelConfig,
    platform: &Platform,
) -> Result<AgentExecutable, TunnelError> {
    match &config.binary_path {
        Some(path) => Ok(AgentExecutable {
            path: path.clone(),
            dialect: config.protocol.into(),
        }),
        None => resolve(platform, config.protocol, &config.vendor_dir),
    }
}

/// Command-line dialect spoken by an agent generation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgDialect {
    /// `-u <user> -k <key> [-i <name>] [extra...]`
    Flags,
    /// `run [--tunnel-name <name>] --region <region> [extra...]`
    Subcommand,
}

impl From<AgentProtocol> for ArgDialect {
    fn from(protocol: AgentProtocol) -> Self {
        match protocol {
            AgentProtocol::Legacy => Self::Flags,
            AgentProtocol::Modern => Self::Subcommand,
        }
    }
}

impl ArgDialect {
    /// Build the agent argument list
    pub fn args(&self, config: &TunnelConfig) -> Vec<String> {
        let mut args = Vec::new();

        match self {
            Self::Flags => {
                args.extend([
                    "-u".to_string(),
                    config.username.clone(),
                    "-k".to_string(),
                    config.access_key.clone(),
                ]);
                if !config.tunnel_name.is_empty() {
                    args.extend(["-i".to_string(), config.tunnel_name.clone()]);
                }
            }
            Self::Subcommand => {
                args.push("run".to_string());
                if !config.tunnel_name.is_empty() {
                    args.extend(["--tunnel-name".to_string(), config.tunnel_name.clone()]);
                }
                args.extend(["--region".to_string(), config.region.to_string()]);
            }
        }

        args.extend(config.extra_args.iter().cloned());
        args
    }

    /// Environment variables the agent reads credentials from
    pub fn env(&self, config: &TunnelConfig) -> Vec<(&'static str, String)> {
        match self {
            Self::Flags => Vec::new(),
            Self::Subcommand => vec![
                (USERNAME_ENV, config.username.clone()),
                (ACCESS_KEY_ENV, config.access_key.clone()),
            ],
        }
    }
}
