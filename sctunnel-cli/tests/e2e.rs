//! End-to-end tests for the sctunnel binary
//!
//! These run the built binary and are gated behind the `integration`
//! feature flag. Run with:
//!
//! ```sh
//! cargo test -p sctunnel-cli --features integration
//! ```

#![cfg(feature = "integration")]

use std::process::{Command, Output};

use tempfile::TempDir;

/// Run sctunnel with an isolated project config and no credentials in the env
fn sctunnel(project_dir: &TempDir, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_sctunnel"))
        .args(args)
        .env("SCTUNNEL_PROJECT_CONFIG_DIR", project_dir.path())
        .env_remove("SAUCE_USERNAME")
        .env_remove("SAUCE_ACCESS_KEY")
        .output()
        .expect("Failed to run sctunnel")
}

#[test]
fn sctunnel_help_lists_commands() {
    let dir = TempDir::new().unwrap();
    let output = sctunnel(&dir, &["--help"]);

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Open Sauce Labs tunnels"));
    assert!(stdout.contains("start"));
    assert!(stdout.contains("list"));
    assert!(stdout.contains("delete"));
}

#[test]
fn sctunnel_start_help_shows_flags() {
    let dir = TempDir::new().unwrap();
    let output = sctunnel(&dir, &["start", "--help"]);

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("--no-tunnel"));
    assert!(stdout.contains("--region"));
    assert!(stdout.contains("--start-timeout"));
    assert!(stdout.contains("--binary"));
}

#[test]
fn sctunnel_config_show_uses_project_file() {
    let dir = TempDir::new().unwrap();
    std::fs::write(
        dir.path().join("config.toml"),
        "[sauce]\nusername = \"ci-bot\"\naccess_key = \"secret-key\"\n\n[tunnel]\nname = \"nightly\"\n",
    )
    .unwrap();

    let output = sctunnel(&dir, &["config", "show"]);

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("username = \"ci-bot\""));
    assert!(stdout.contains("name = \"nightly\""));
    assert!(!stdout.contains("secret-key"));
}

#[test]
fn sctunnel_config_path_shows_paths() {
    let dir = TempDir::new().unwrap();
    let output = sctunnel(&dir, &["config", "path"]);

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("User config:"));
    assert!(stdout.contains("Project config:"));
    assert!(stdout.contains(&dir.path().display().to_string()));
}

#[test]
fn sctunnel_start_without_tunnel_needs_no_account() {
    let dir = TempDir::new().unwrap();
    let output = sctunnel(&dir, &["start", "--no-tunnel"]);

    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    assert!(String::from_utf8_lossy(&output.stdout).contains("No tunnel required"));
}

#[test]
fn sctunnel_start_requires_credentials() {
    let dir = TempDir::new().unwrap();
    let output = sctunnel(&dir, &["start"]);

    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("username"));
}

#[cfg(unix)]
#[test]
fn sctunnel_start_reports_early_agent_exit() {
    use std::os::unix::fs::PermissionsExt;

    let dir = TempDir::new().unwrap();
    let agent = dir.path().join("sc");
    std::fs::write(&agent, "#!/bin/sh\necho \"bad credentials\" >&2\nexit 1\n").unwrap();
    std::fs::set_permissions(&agent, std::fs::Permissions::from_mode(0o755)).unwrap();

    let output = sctunnel(
        &dir,
        &[
            "start",
            "--username",
            "u1",
            "--access-key",
            "k1",
            "--binary",
            agent.to_str().unwrap(),
        ],
    );

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Failed to open Sauce Labs tunnel"));
}
