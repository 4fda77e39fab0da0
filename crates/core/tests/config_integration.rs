//! phosh-itest.toml 통합 설정 테스트
//!
//! - phosh-itest.toml.example 파싱 테스트
//! - 파일 로딩 + 환경변수 우선순위 테스트
//! - 빈 파일 / 잘못된 형식 에러 테스트

use phosh_itest_core::config::HarnessConfig;
use phosh_itest_core::error::{ConfigError, HarnessError};
use serial_test::serial;

// =============================================================================
// phosh-itest.toml.example 파싱 테스트
// =============================================================================

#[test]
fn example_config_parses_successfully() {
    let content = include_str!("../../../phosh-itest.toml.example");
    let config = HarnessConfig::parse(content).expect("example config should parse");

    assert_eq!(config.general.log_level, "info");
    assert_eq!(config.general.log_format, "pretty");
    assert_eq!(config.session.compositor, "phoc");
    assert!(config.session.wrapper.is_empty());
    assert_eq!(config.session.shutdown_timeout_secs, 10);
}

#[test]
fn example_config_passes_validation() {
    let content = include_str!("../../../phosh-itest.toml.example");
    let config = HarnessConfig::parse(content).expect("should parse");
    config
        .validate()
        .expect("example config should pass validation");
}

#[test]
fn example_config_matches_defaults() {
    let content = include_str!("../../../phosh-itest.toml.example");
    let config = HarnessConfig::parse(content).expect("should parse");
    let defaults = HarnessConfig::default();

    assert_eq!(config.session.compositor_config, defaults.session.compositor_config);
    assert_eq!(config.session.launcher, defaults.session.launcher);
    assert_eq!(config.session.readiness_marker, defaults.session.readiness_marker);
    assert_eq!(config.session.poll_interval_ms, defaults.session.poll_interval_ms);
    assert_eq!(config.logs.save, defaults.logs.save);
}

// =============================================================================
// 파일 로딩 테스트
// =============================================================================

#[tokio::test]
async fn load_empty_file_uses_defaults() {
    let dir = tempfile::tempdir().expect("should create temp dir");
    let path = dir.path().join("phosh-itest.toml");
    std::fs::write(&path, "").expect("should write config");

    let config = HarnessConfig::from_file(&path).await.expect("should load");
    assert_eq!(config.session.compositor, "phoc");
}

#[tokio::test]
async fn load_rejects_invalid_values() {
    let dir = tempfile::tempdir().expect("should create temp dir");
    let path = dir.path().join("phosh-itest.toml");
    std::fs::write(&path, "[session]\npoll_interval_ms = 0\n").expect("should write config");

    let err = HarnessConfig::from_file(&path).await.unwrap_err();
    assert!(matches!(
        err,
        HarnessError::Config(ConfigError::InvalidValue { .. })
    ));
}

#[tokio::test]
async fn load_malformed_toml_fails() {
    let dir = tempfile::tempdir().expect("should create temp dir");
    let path = dir.path().join("bad.toml");
    std::fs::write(&path, "[session\ncompositor = \"phoc\"\n").expect("should write config");

    let err = HarnessConfig::load(&path).await.unwrap_err();
    assert!(matches!(
        err,
        HarnessError::Config(ConfigError::ParseFailed { .. })
    ));
}

// =============================================================================
// 환경변수 우선순위 테스트
// =============================================================================

#[tokio::test]
#[serial]
async fn env_overrides_win_over_file() {
    let dir = tempfile::tempdir().expect("should create temp dir");
    let path = dir.path().join("phosh-itest.toml");
    std::fs::write(
        &path,
        "[session]\ncompositor = \"phoc\"\nstartup_timeout_secs = 5\n",
    )
    .expect("should write config");

    // SAFETY: #[serial]로 환경변수를 만지는 테스트끼리 직렬화됩니다.
    unsafe {
        std::env::set_var("PHOSH_ITEST_SESSION_COMPOSITOR", "/opt/phoc/bin/phoc");
        std::env::set_var("PHOSH_ITEST_SESSION_STARTUP_TIMEOUT_SECS", "60");
        std::env::set_var("PHOSH_ITEST_LOGS_SAVE", "true");
    }

    let result = HarnessConfig::load(&path).await;

    unsafe {
        std::env::remove_var("PHOSH_ITEST_SESSION_COMPOSITOR");
        std::env::remove_var("PHOSH_ITEST_SESSION_STARTUP_TIMEOUT_SECS");
        std::env::remove_var("PHOSH_ITEST_LOGS_SAVE");
    }

    let config = result.expect("should load");
    assert_eq!(config.session.compositor, "/opt/phoc/bin/phoc");
    assert_eq!(config.session.startup_timeout_secs, 60);
    assert!(config.logs.save);
}

#[tokio::test]
#[serial]
async fn env_override_invalid_value_fails_validation() {
    let dir = tempfile::tempdir().expect("should create temp dir");
    let path = dir.path().join("phosh-itest.toml");
    std::fs::write(&path, "").expect("should write config");

    // SAFETY: #[serial]로 환경변수를 만지는 테스트끼리 직렬화됩니다.
    unsafe { std::env::set_var("PHOSH_ITEST_GENERAL_LOG_FORMAT", "xml") };
    let result = HarnessConfig::load(&path).await;
    unsafe { std::env::remove_var("PHOSH_ITEST_GENERAL_LOG_FORMAT") };

    let err = result.unwrap_err();
    assert!(err.to_string().contains("log_format"));
}
