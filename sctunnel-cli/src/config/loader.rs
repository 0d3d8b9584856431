use super::types::{
    DEFAULT_KILL_TIMEOUT, DEFAULT_VENDOR_DIR, RawSauceConfig, RawSctunnelConfig, RawTunnelSection,
    SauceConfig, SctunnelConfig, TunnelSection,
};
use anyhow::{Context, Result};
use directories::ProjectDirs;
use std::path::{Path, PathBuf};

/// Env var that relocates the project config directory
pub const PROJECT_CONFIG_DIR_ENV: &str = "SCTUNNEL_PROJECT_CONFIG_DIR";

pub struct ConfigLoader;

impl ConfigLoader {
    /// Load merged configuration (user + project)
    pub fn load() -> Result<SctunnelConfig> {
        let mut raw = RawSctunnelConfig::default();

        // Layer 1: User config
        if let Some(user_path) = Self::user_config_path()
            && user_path.exists()
        {
            raw = Self::merge_raw(raw, Self::read_raw(&user_path)?);
        }

        // Layer 2: Project config
        let project_path = Self::project_config_path();
        if project_path.exists() {
            raw = Self::merge_raw(raw, Self::read_raw(&project_path)?);
        }

        Ok(Self::finalize(raw))
    }

    /// Get user config path (platform-specific)
    pub fn user_config_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "sctunnel").map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Get project config path
    pub fn project_config_path() -> PathBuf {
        match std::env::var(PROJECT_CONFIG_DIR_ENV) {
            Ok(dir) => PathBuf::from(dir).join("config.toml"),
            Err(_) => PathBuf::from(".sctunnel/config.toml"),
        }
    }

    fn read_raw(path: &Path) -> Result<RawSctunnelConfig> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        toml::from_str(&contents).with_context(|| format!("Invalid config in {}", path.display()))
    }

    /// Merge two raw configs (overlay values override base only if explicitly set)
    fn merge_raw(base: RawSctunnelConfig, overlay: RawSctunnelConfig) -> RawSctunnelConfig {
        RawSctunnelConfig {
            sauce: RawSauceConfig {
                username: overlay.sauce.username.or(base.sauce.username),
                access_key: overlay.sauce.access_key.or(base.sauce.access_key),
                region: overlay.sauce.region.or(base.sauce.region),
                protocol: overlay.sauce.protocol.or(base.sauce.protocol),
                api_base_url: overlay.sauce.api_base_url.or(base.sauce.api_base_url),
            },
            tunnel: RawTunnelSection {
                enabled: overlay.tunnel.enabled.or(base.tunnel.enabled),
                name: overlay.tunnel.name.or(base.tunnel.name),
                vendor_dir: overlay.tunnel.vendor_dir.or(base.tunnel.vendor_dir),
                binary: overlay.tunnel.binary.or(base.tunnel.binary),
                args: overlay.tunnel.args.or(base.tunnel.args),
                start_timeout: overlay.tunnel.start_timeout.or(base.tunnel.start_timeout),
                stop_timeout: overlay.tunnel.stop_timeout.or(base.tunnel.stop_timeout),
                kill_timeout: overlay.tunnel.kill_timeout.or(base.tunnel.kill_timeout),
            },
        }
    }

    /// Convert raw config to final config with defaults applied
    fn finalize(raw: RawSctunnelConfig) -> SctunnelConfig {
        SctunnelConfig {
            sauce: SauceConfig {
                username: raw.sauce.username,
                access_key: raw.sauce.access_key,
                region: raw.sauce.region.unwrap_or_default(),
                protocol: raw.sauce.protocol.unwrap_or_default(),
                api_base_url: raw.sauce.api_base_url,
            },
            tunnel: TunnelSection {
                enabled: raw.tunnel.enabled.unwrap_or(true),
                name: raw.tunnel.name,
                vendor_dir: raw
                    .tunnel
                    .vendor_dir
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_VENDOR_DIR)),
                binary: raw.tunnel.binary,
                args: raw.tunnel.args.unwrap_or_default(),
                start_timeout: raw.tunnel.start_timeout,
                stop_timeout: raw.tunnel.stop_timeout,
                kill_timeout: raw.tunnel.kill_timeout.unwrap_or(DEFAULT_KILL_TIMEOUT),
            },
        }
    }

    /// Load a single config file with defaults applied (for testing)
    #[cfg(test)]
    pub fn load_from_path(path: &Path) -> Result<SctunnelConfig> {
        if path.exists() {
            Ok(Self::finalize(Self::read_raw(path)?))
        } else {
            Ok(SctunnelConfig::default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sctunnel_core::{AgentProtocol, Region};
    use std::io::Write;
    use std::time::Duration;
    use tempfile::TempDir;

    // ==================== Load Tests ====================

    #[test]
    fn test_load_nonexistent_returns_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nonexistent.toml");

        let config = ConfigLoader::load_from_path(&path).unwrap();

        assert!(config.tunnel.enabled);
        assert_eq!(config.tunnel.kill_timeout, Duration::from_secs(10));
        assert_eq!(config.sauce.protocol, AgentProtocol::Legacy);
    }

    #[test]
    fn test_load_from_valid_toml() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");

        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            r#"
[sauce]
username = "ci-bot"
region = "us-east"

[tunnel]
enabled = false
vendor_dir = "/opt/sauce"
stop_timeout = "45s"
"#
        )
        .unwrap();

        let config = ConfigLoader::load_from_path(&path).unwrap();

        assert_eq!(config.sauce.username.as_deref(), Some("ci-bot"));
        assert_eq!(config.sauce.region, Region::UsEast);
        assert!(!config.tunnel.enabled);
        assert_eq!(config.tunnel.vendor_dir, PathBuf::from("/opt/sauce"));
        assert_eq!(config.tunnel.stop_timeout, Some(Duration::from_secs(45)));
    }

    #[test]
    fn test_load_invalid_toml_returns_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("invalid.toml");

        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "this is not valid toml {{{{").unwrap();

        let result = ConfigLoader::load_from_path(&path);
        assert!(result.is_err());
    }

    #[test]
    fn test_load_unknown_region_returns_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        std::fs::write(&path, "[sauce]\nregion = \"mars-north\"\n").unwrap();

        assert!(ConfigLoader::load_from_path(&path).is_err());
    }

    // ==================== Merge Tests ====================

    #[test]
    fn test_merge_raw_overlay_overrides_base() {
        let base: RawSctunnelConfig = toml::from_str(
            r#"
[sauce]
username = "user-level"
access_key = "user-key"
region = "us-west"

[tunnel]
name = "base"
args = ["--verbose"]
"#,
        )
        .unwrap();
        let overlay: RawSctunnelConfig = toml::from_str(
            r#"
[sauce]
region = "eu-central"

[tunnel]
name = "project"
enabled = false
"#,
        )
        .unwrap();

        let merged = ConfigLoader::merge_raw(base, overlay);

        assert_eq!(merged.sauce.region, Some(Region::EuCentral));
        assert_eq!(merged.tunnel.name.as_deref(), Some("project"));
        assert_eq!(merged.tunnel.enabled, Some(false));
        // overlay's None falls through to base value via .or()
        assert_eq!(merged.sauce.username.as_deref(), Some("user-level"));
        assert_eq!(merged.sauce.access_key.as_deref(), Some("user-key"));
        assert_eq!(merged.tunnel.args, Some(vec!["--verbose".to_string()]));
    }

    #[test]
    fn test_merge_raw_none_preserves_base() {
        let base: RawSctunnelConfig =
            toml::from_str("[tunnel]\nkill_timeout = \"3s\"\nenabled = false\n").unwrap();

        let merged = ConfigLoader::merge_raw(base, RawSctunnelConfig::default());
        let config = ConfigLoader::finalize(merged);

        assert_eq!(config.tunnel.kill_timeout, Duration::from_secs(3));
        assert!(!config.tunnel.enabled);
    }

    // ==================== Path Tests ====================

    #[test]
    fn test_user_config_path_returns_some() {
        let path = ConfigLoader::user_config_path();
        assert!(path.is_some());
        let path = path.unwrap();
        assert!(path.to_string_lossy().contains("sctunnel"));
        assert!(path.to_string_lossy().contains("config.toml"));
    }

    #[test]
    fn test_project_config_path() {
        // Only meaningful when the override is not set in the test environment
        if std::env::var(PROJECT_CONFIG_DIR_ENV).is_err() {
            let path = ConfigLoader::project_config_path();
            assert_eq!(path, PathBuf::from(".sctunnel/config.toml"));
        }
    }
}
