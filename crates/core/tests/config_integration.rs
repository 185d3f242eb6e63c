//! scoutpost.toml 통합 설정 테스트
//!
//! - scoutpost.toml.example 파싱 테스트
//! - 부분 설정 (일부 섹션만) 로딩 테스트
//! - 환경변수 우선순위 테스트
//! - 파일 로딩 / 잘못된 형식 에러 테스트

use scoutpost_core::config::ScoutpostConfig;
use scoutpost_core::error::{ConfigError, ScoutpostError};

const EXAMPLE: &str = include_str!("../../../scoutpost.toml.example");

// =============================================================================
// scoutpost.toml.example 파싱 테스트
// =============================================================================

#[test]
fn example_config_parses_and_validates() {
    let config = ScoutpostConfig::parse(EXAMPLE).expect("example config should parse");
    config
        .validate()
        .expect("example config should pass validation");
}

#[test]
fn example_config_matches_code_defaults() {
    let example = ScoutpostConfig::parse(EXAMPLE).expect("should parse");
    let defaults = ScoutpostConfig::default();

    assert_eq!(example.general.log_level, defaults.general.log_level);
    assert_eq!(example.general.log_format, defaults.general.log_format);
    assert_eq!(example.runtime.network, defaults.runtime.network);
    assert_eq!(example.runtime.image, defaults.runtime.image);
    assert_eq!(example.runtime.app_port, defaults.runtime.app_port);
    assert_eq!(example.runtime.restart_policy, defaults.runtime.restart_policy);
    assert_eq!(
        example.runtime.create_timeout_secs,
        defaults.runtime.create_timeout_secs
    );
    assert_eq!(
        example.runtime.remove_timeout_secs,
        defaults.runtime.remove_timeout_secs
    );
    assert_eq!(example.runtime.stop_grace_secs, defaults.runtime.stop_grace_secs);
    assert_eq!(
        example.runtime.pull_timeout_secs,
        defaults.runtime.pull_timeout_secs
    );
    assert_eq!(example.routing.base_domain, defaults.routing.base_domain);
    assert_eq!(example.routing.router_prefix, defaults.routing.router_prefix);
    assert_eq!(example.routing.entrypoints, defaults.routing.entrypoints);
    assert_eq!(
        example.database.connection_template,
        defaults.database.connection_template
    );
    assert_eq!(example.database.admin_uri, defaults.database.admin_uri);
    assert_eq!(example.store.path, defaults.store.path);
    assert_eq!(example.instance.default_env, defaults.instance.default_env);
    assert_eq!(example.instance.list_limit, defaults.instance.list_limit);
}

// =============================================================================
// 부분 설정 테스트
// =============================================================================

#[test]
fn partial_config_routing_only() {
    let toml = r#"
[routing]
base_domain = "cgm.example.net"
entrypoints = "websecure"
cert_resolver = "letsencrypt"
"#;
    let config = ScoutpostConfig::parse(toml).expect("should parse");
    assert_eq!(config.routing.base_domain, "cgm.example.net");
    assert_eq!(config.routing.entrypoints.as_deref(), Some("websecure"));
    assert_eq!(config.routing.cert_resolver.as_deref(), Some("letsencrypt"));
    assert_eq!(config.runtime.app_port, 1337);
    config.validate().expect("should validate");
}

#[test]
fn partial_config_in_memory_store() {
    let toml = r#"
[store]
path = ":memory:"
"#;
    let config = ScoutpostConfig::parse(toml).expect("should parse");
    assert_eq!(config.store.path, ":memory:");
    config.validate().expect("should validate");
}

// =============================================================================
// 환경변수 우선순위 테스트
// =============================================================================

#[test]
#[serial_test::serial]
fn env_override_takes_precedence_over_toml() {
    let toml = r#"
[runtime]
network = "from_file"
"#;

    let original = std::env::var("SCOUTPOST_RUNTIME_NETWORK").ok();
    // SAFETY: serial로 직렬화되어 환경변수 조작이 안전합니다.
    unsafe {
        std::env::set_var("SCOUTPOST_RUNTIME_NETWORK", "from_env");
    }

    let mut config = ScoutpostConfig::parse(toml).expect("should parse");
    config.apply_env_overrides();
    let result = config.runtime.network.clone();

    // SAFETY: 테스트 정리
    unsafe {
        match original {
            Some(val) => std::env::set_var("SCOUTPOST_RUNTIME_NETWORK", val),
            None => std::env::remove_var("SCOUTPOST_RUNTIME_NETWORK"),
        }
    }

    assert_eq!(result, "from_env");
}

#[test]
#[serial_test::serial]
fn env_override_bool_field() {
    let original = std::env::var("SCOUTPOST_RUNTIME_PULL_IMAGE").ok();
    // SAFETY: 테스트 직렬화
    unsafe {
        std::env::set_var("SCOUTPOST_RUNTIME_PULL_IMAGE", "false");
    }

    let mut config = ScoutpostConfig::default();
    config.apply_env_overrides();
    let result = config.runtime.pull_image;

    // SAFETY: 테스트 정리
    unsafe {
        match original {
            Some(val) => std::env::set_var("SCOUTPOST_RUNTIME_PULL_IMAGE", val),
            None => std::env::remove_var("SCOUTPOST_RUNTIME_PULL_IMAGE"),
        }
    }

    assert!(!result);
}

// =============================================================================
// 파일 로딩 테스트
// =============================================================================

#[tokio::test]
async fn load_missing_file_is_file_not_found() {
    let err = ScoutpostConfig::load("/nonexistent/scoutpost.toml")
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ScoutpostError::Config(ConfigError::FileNotFound { .. })
    ));
}

#[tokio::test]
async fn from_file_rejects_invalid_values() {
    let dir = std::env::temp_dir().join(format!("scoutpost-cfg-{}", std::process::id()));
    tokio::fs::create_dir_all(&dir).await.unwrap();
    let path = dir.join("bad.toml");
    tokio::fs::write(&path, "[runtime]\nrestart_policy = \"sometimes\"\n")
        .await
        .unwrap();

    let err = ScoutpostConfig::from_file(&path).await.unwrap_err();
    let _ = tokio::fs::remove_dir_all(&dir).await;

    assert!(matches!(
        err,
        ScoutpostError::Config(ConfigError::InvalidValue { .. })
    ));
}

// =============================================================================
// 에러 케이스
// =============================================================================

#[test]
fn malformed_toml_returns_parse_error() {
    let result = ScoutpostConfig::parse("[invalid toml");
    assert!(matches!(
        result.unwrap_err(),
        ScoutpostError::Config(ConfigError::ParseFailed { .. })
    ));
}

#[test]
fn wrong_type_for_numeric_field() {
    let toml = r#"
[runtime]
app_port = "one three three seven"
"#;
    assert!(matches!(
        ScoutpostConfig::parse(toml).unwrap_err(),
        ScoutpostError::Config(ConfigError::ParseFailed { .. })
    ));
}

#[test]
fn port_out_of_range_is_parse_error() {
    let toml = r#"
[runtime]
app_port = 70000
"#;
    assert!(ScoutpostConfig::parse(toml).is_err());
}
