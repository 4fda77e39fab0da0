//! Integration tests for `phosh-itest config` command.
//!
//! Tests config validation and display functionality with real TOML files.

use std::fs;
use std::process::Command;

use tempfile::TempDir;

use phosh_itest_core::config::HarnessConfig;

#[tokio::test]
async fn test_config_validate_valid_toml() {
    // Given: A valid config file
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config_path = temp_dir.path().join("phosh-itest.toml");

    let valid_config = r#"
[general]
log_level = "info"
log_format = "json"

[session]
compositor = "phoc"
startup_timeout_secs = 30

[logs]
save = true
"#;

    fs::write(&config_path, valid_config).expect("should write config");

    // When: Loading the config
    let result = HarnessConfig::load(&config_path).await;

    // Then: Should succeed, unset fields keep their defaults
    let config = result.expect("valid config should load successfully");
    assert_eq!(config.session.startup_timeout_secs, 30);
    assert_eq!(config.session.readiness_marker, "Phosh ready after");
    assert!(config.logs.save);
}

#[tokio::test]
async fn test_config_validate_malformed_toml() {
    // Given: A malformed TOML file
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config_path = temp_dir.path().join("bad.toml");

    let malformed_config = r#"
[session
compositor = "phoc"
"#;

    fs::write(&config_path, malformed_config).expect("should write bad config");

    // When: Loading the config
    let result = HarnessConfig::load(&config_path).await;

    // Then: Should fail
    assert!(result.is_err(), "malformed TOML should fail to load");
}

#[test]
fn test_config_validate_command_rejects_invalid_value() {
    // Given: A config with a zero poll interval
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config_path = temp_dir.path().join("phosh-itest.toml");
    fs::write(&config_path, "[session]\npoll_interval_ms = 0\n").expect("should write config");

    // When: Running `config validate`
    let output = Command::new(env!("CARGO_BIN_EXE_phosh-itest"))
        .arg("--config")
        .arg(&config_path)
        .args(["--output", "json", "config", "validate"])
        .env_remove("RUST_LOG")
        .output()
        .expect("should run phosh-itest");

    // Then: Exit code 2 and the offending field in the report
    assert_eq!(output.status.code(), Some(2));
    let report: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("stdout should be JSON");
    assert_eq!(report["valid"], false);
    assert!(
        report["errors"][0]
            .as_str()
            .is_some_and(|e| e.contains("session.poll_interval_ms"))
    );
}

#[test]
fn test_config_show_missing_file_uses_defaults() {
    // Given: A config path that does not exist
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config_path = temp_dir.path().join("missing.toml");

    // When: Showing the session section
    let output = Command::new(env!("CARGO_BIN_EXE_phosh-itest"))
        .arg("--config")
        .arg(&config_path)
        .args(["config", "show", "--section", "session"])
        .env_remove("RUST_LOG")
        .env_remove("PHOSH_ITEST_SESSION_COMPOSITOR")
        .env("NO_COLOR", "1")
        .output()
        .expect("should run phosh-itest");

    // Then: Defaults are printed
    assert_eq!(output.status.code(), Some(0));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("compositor = \"phoc\""), "stdout: {stdout}");
    assert!(stdout.contains("poll_interval_ms = 1000"));
}
