//! Integration tests for `scoutpost config` command.
//!
//! Tests config validation and loading behaviour with real TOML files.

use std::fs;

use scoutpost_core::config::ScoutpostConfig;
use serial_test::serial;
use tempfile::TempDir;

fn write_config(dir: &TempDir, name: &str, contents: &str) -> std::path::PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, contents).expect("should write config");
    path
}

#[tokio::test]
async fn test_config_validate_valid_toml() {
    // Given: A valid config file
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config_path = write_config(
        &temp_dir,
        "scoutpost.toml",
        r#"
[general]
log_level = "info"
log_format = "pretty"

[runtime]
network = "proxy_net"
image = "nightscout/cgm-remote-monitor:15.0.2"

[routing]
base_domain = "cgm.example.org"
cert_resolver = "letsencrypt"

[store]
path = ":memory:"
"#,
    );

    // When: Loading the config
    let config = ScoutpostConfig::load(&config_path)
        .await
        .expect("valid config should load successfully");

    // Then: File values and defaults are merged
    assert_eq!(config.general.log_format, "pretty");
    assert_eq!(config.runtime.network, "proxy_net");
    assert_eq!(config.runtime.app_port, 1337);
    assert_eq!(config.routing.cert_resolver.as_deref(), Some("letsencrypt"));
    assert_eq!(config.instance.list_limit, 100);
}

#[tokio::test]
async fn test_config_validate_malformed_toml() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config_path = write_config(&temp_dir, "bad.toml", "[general\nlog_level = \"info\"\n");

    let result = ScoutpostConfig::load(&config_path).await;
    assert!(result.is_err(), "malformed TOML should fail to load");
}

#[tokio::test]
async fn test_config_validate_missing_file() {
    let config_path = std::path::PathBuf::from("/nonexistent/scoutpost.toml");

    let err = ScoutpostConfig::load(&config_path)
        .await
        .expect_err("missing file should fail to load");
    assert!(err.to_string().contains("not found"));
}

#[tokio::test]
async fn test_config_validate_empty_file_uses_defaults() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config_path = write_config(&temp_dir, "empty.toml", "");

    let config = ScoutpostConfig::load(&config_path)
        .await
        .expect("empty config should load with defaults");
    assert_eq!(config.routing.base_domain, "nst1d.com");
    assert_eq!(config.database.connection_template, "mongodb://mongodb:27017/{db}");
}

#[tokio::test]
async fn test_config_validate_rejects_template_without_placeholder() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config_path = write_config(
        &temp_dir,
        "scoutpost.toml",
        "[database]\nconnection_template = \"mongodb://mongodb:27017/shared\"\n",
    );

    let err = ScoutpostConfig::load(&config_path)
        .await
        .expect_err("template without {db} should be rejected");
    assert!(err.to_string().contains("connection_template"));
}

#[tokio::test]
async fn test_config_validate_rejects_unknown_restart_policy() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config_path = write_config(
        &temp_dir,
        "scoutpost.toml",
        "[runtime]\nrestart_policy = \"sometimes\"\n",
    );

    assert!(ScoutpostConfig::load(&config_path).await.is_err());
}

#[tokio::test]
async fn test_config_default_env_table() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config_path = write_config(
        &temp_dir,
        "scoutpost.toml",
        r#"
[instance.default_env]
INSECURE_USE_HTTP = "false"
AUTH_DEFAULT_ROLES = "readable"
"#,
    );

    let config = ScoutpostConfig::load(&config_path).await.expect("should load");
    assert_eq!(config.instance.default_env["INSECURE_USE_HTTP"], "false");
    assert_eq!(config.instance.default_env["AUTH_DEFAULT_ROLES"], "readable");
}

#[tokio::test]
#[serial]
async fn test_config_env_override_applies_on_load() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config_path = write_config(&temp_dir, "scoutpost.toml", "[routing]\nbase_domain = \"a.org\"\n");

    // SAFETY: serialized with other env-mutating tests
    unsafe { std::env::set_var("SCOUTPOST_ROUTING_BASE_DOMAIN", "b.org") };
    let result = ScoutpostConfig::load(&config_path).await;
    unsafe { std::env::remove_var("SCOUTPOST_ROUTING_BASE_DOMAIN") };

    assert_eq!(result.expect("should load").routing.base_domain, "b.org");
}

#[tokio::test]
#[serial]
async fn test_config_env_override_is_validated() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config_path = write_config(&temp_dir, "scoutpost.toml", "");

    unsafe { std::env::set_var("SCOUTPOST_GENERAL_LOG_FORMAT", "xml") };
    let result = ScoutpostConfig::load(&config_path).await;
    unsafe { std::env::remove_var("SCOUTPOST_GENERAL_LOG_FORMAT") };

    assert!(result.is_err(), "invalid override should fail validation");
}
