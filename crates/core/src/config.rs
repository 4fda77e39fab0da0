//! 설정 관리 -- phosh-itest.toml 파싱 및 런타임 설정
//!
//! [`HarnessConfig`]는 하네스 전체 설정을 담는 최상위 구조체입니다.
//!
//! # 설정 로딩 우선순위
//! 1. CLI 인자 (최고 우선)
//! 2. 환경변수 (`PHOSH_ITEST_SESSION_COMPOSITOR=phoc` 형식)
//! 3. 설정 파일 (`phosh-itest.toml`)
//! 4. 기본값 (`Default` 구현)
//!
//! # 사용 예시
//! ```no_run
//! # async fn example() -> Result<(), phosh_itest_core::error::HarnessError> {
//! use phosh_itest_core::config::HarnessConfig;
//!
//! // 파일에서 로드 + 환경변수 오버라이드
//! let config = HarnessConfig::load("phosh-itest.toml").await?;
//!
//! // TOML 문자열에서 직접 파싱
//! let config = HarnessConfig::parse("[session]\ncompositor = \"phoc\"")?;
//! # Ok(())
//! # }
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{ConfigError, HarnessError};

/// phosh-itest 통합 설정
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HarnessConfig {
    /// 일반 설정 (하네스 자체 로깅)
    #[serde(default)]
    pub general: GeneralConfig,
    /// 중첩 세션 설정
    #[serde(default)]
    pub session: SessionConfig,
    /// 진단 로그 저장 설정
    #[serde(default)]
    pub logs: LogsConfig,
}

impl HarnessConfig {
    /// TOML 파일에서 설정을 로드하고 환경변수 오버라이드를 적용합니다.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, HarnessError> {
        let mut config = Self::from_file(path).await?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// TOML 파일에서 설정을 로드합니다 (환경변수 오버라이드 없음).
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, HarnessError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                HarnessError::Config(ConfigError::FileNotFound {
                    path: path.display().to_string(),
                })
            } else {
                HarnessError::Io(e)
            }
        })?;
        let config = Self::parse(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// TOML 문자열에서 설정을 파싱합니다.
    pub fn parse(toml_str: &str) -> Result<Self, HarnessError> {
        toml::from_str(toml_str).map_err(|e| {
            HarnessError::Config(ConfigError::ParseFailed {
                reason: e.to_string(),
            })
        })
    }

    /// 환경변수로 설정값을 오버라이드합니다.
    ///
    /// 환경변수 네이밍 규칙: `PHOSH_ITEST_{SECTION}_{FIELD}`
    /// 예: `PHOSH_ITEST_SESSION_STARTUP_TIMEOUT_SECS=30`
    pub fn apply_env_overrides(&mut self) {
        // General
        override_string(&mut self.general.log_level, "PHOSH_ITEST_GENERAL_LOG_LEVEL");
        override_string(
            &mut self.general.log_format,
            "PHOSH_ITEST_GENERAL_LOG_FORMAT",
        );

        // Session
        override_string(
            &mut self.session.compositor,
            "PHOSH_ITEST_SESSION_COMPOSITOR",
        );
        override_args(&mut self.session.wrapper, "PHOSH_ITEST_SESSION_WRAPPER");
        override_bool(&mut self.session.xwayland, "PHOSH_ITEST_SESSION_XWAYLAND");
        override_string(
            &mut self.session.compositor_config,
            "PHOSH_ITEST_SESSION_COMPOSITOR_CONFIG",
        );
        override_string(&mut self.session.launcher, "PHOSH_ITEST_SESSION_LAUNCHER");
        override_string(
            &mut self.session.readiness_marker,
            "PHOSH_ITEST_SESSION_READINESS_MARKER",
        );
        override_u64(
            &mut self.session.startup_timeout_secs,
            "PHOSH_ITEST_SESSION_STARTUP_TIMEOUT_SECS",
        );
        override_u64(
            &mut self.session.wait_timeout_secs,
            "PHOSH_ITEST_SESSION_WAIT_TIMEOUT_SECS",
        );
        override_u64(
            &mut self.session.poll_interval_ms,
            "PHOSH_ITEST_SESSION_POLL_INTERVAL_MS",
        );
        override_u64(
            &mut self.session.shutdown_timeout_secs,
            "PHOSH_ITEST_SESSION_SHUTDOWN_TIMEOUT_SECS",
        );

        // Logs
        override_bool(&mut self.logs.save, "PHOSH_ITEST_LOGS_SAVE");
        override_string(&mut self.logs.dir, "PHOSH_ITEST_LOGS_DIR");
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), HarnessError> {
        // log_level 검증
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.general.log_level.as_str()) {
            return Err(ConfigError::InvalidValue {
                field: "general.log_level".to_owned(),
                reason: format!("must be one of: {}", valid_levels.join(", ")),
            }
            .into());
        }

        // log_format 검증
        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.general.log_format.as_str()) {
            return Err(ConfigError::InvalidValue {
                field: "general.log_format".to_owned(),
                reason: format!("must be one of: {}", valid_formats.join(", ")),
            }
            .into());
        }

        self.session.validate()?;

        if self.logs.save && self.logs.dir.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "logs.dir".to_owned(),
                reason: "log directory must not be empty when saving logs".to_owned(),
            }
            .into());
        }

        Ok(())
    }
}

/// 일반 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// 로그 레벨 (trace, debug, info, warn, error)
    pub log_level: String,
    /// 로그 형식 (json, pretty)
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_owned(),
            log_format: "pretty".to_owned(),
        }
    }
}

/// 중첩 컴포지터 세션 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// 컴포지터 실행 파일
    pub compositor: String,
    /// 컴포지터 앞에 붙일 래퍼 명령 (예: `["valgrind", "--leak-check=full"]`)
    pub wrapper: Vec<String>,
    /// XWayland 사용 여부 (false면 `--no-xwayland` 전달)
    pub xwayland: bool,
    /// 컴포지터 설정 파일 (소스 디렉토리 기준 상대 경로)
    pub compositor_config: String,
    /// 준비 후 실행할 런처 스크립트 (빌드 디렉토리 기준 상대 경로)
    pub launcher: String,
    /// 셸 준비 완료를 나타내는 stderr 마커
    pub readiness_marker: String,
    /// 준비 마커 대기 예산 (초)
    pub startup_timeout_secs: u64,
    /// `wait_for_output` 기본 예산 (초)
    pub wait_timeout_secs: u64,
    /// 폴링 간격 (밀리초)
    pub poll_interval_ms: u64,
    /// SIGTERM 후 강제 종료(SIGKILL)까지의 유예 시간 (초)
    pub shutdown_timeout_secs: u64,
}

impl SessionConfig {
    /// 폴링 간격
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// 준비 마커 대기 예산
    pub fn startup_timeout(&self) -> Duration {
        Duration::from_secs(self.startup_timeout_secs)
    }

    /// 종료 유예 시간
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }

    /// 세션 설정만 검증합니다.
    ///
    /// [`HarnessConfig::validate`]가 호출하며, 설정 파일을 거치지 않고
    /// 직접 만든 `SessionConfig`도 세션 생성 전에 이 검증을 통과해야 합니다.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.compositor.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "session.compositor".to_owned(),
                reason: "compositor binary must not be empty".to_owned(),
            });
        }

        if self.readiness_marker.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "session.readiness_marker".to_owned(),
                reason: "readiness marker must not be empty".to_owned(),
            });
        }

        if self.poll_interval_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "session.poll_interval_ms".to_owned(),
                reason: "poll interval must be greater than 0".to_owned(),
            });
        }

        // 폴링 간격이 시작 예산보다 크면 준비 마커를 한 번도 기다리지 못함
        if self.poll_interval() > self.startup_timeout() {
            return Err(ConfigError::InvalidValue {
                field: "session.poll_interval_ms".to_owned(),
                reason: format!(
                    "poll interval ({}ms) exceeds startup timeout ({}s)",
                    self.poll_interval_ms, self.startup_timeout_secs
                ),
            });
        }

        // 0이면 SIGTERM 직후 SIGKILL이 나가 정상 자식도 강제 종료로 보고됨
        if self.shutdown_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "session.shutdown_timeout_secs".to_owned(),
                reason: "shutdown timeout must be greater than 0".to_owned(),
            });
        }

        Ok(())
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            compositor: "phoc".to_owned(),
            wrapper: Vec::new(),
            xwayland: false,
            compositor_config: "data/phoc.ini".to_owned(),
            launcher: "run".to_owned(),
            readiness_marker: "Phosh ready after".to_owned(),
            startup_timeout_secs: 5,
            wait_timeout_secs: 5,
            poll_interval_ms: 1000,
            shutdown_timeout_secs: 10,
        }
    }
}

/// 진단 로그 저장 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogsConfig {
    /// 종료 시 `log.stdout` / `log.stderr` 저장 여부
    pub save: bool,
    /// 로그 파일을 쓸 디렉토리
    pub dir: String,
}

impl Default for LogsConfig {
    fn default() -> Self {
        Self {
            save: false,
            dir: ".".to_owned(),
        }
    }
}

fn override_string(target: &mut String, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val;
    }
}

fn override_bool(target: &mut bool, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<bool>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse bool from env var, ignoring"
            ),
        }
    }
}

fn override_u64(target: &mut u64, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<u64>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse u64 from env var, ignoring"
            ),
        }
    }
}

/// 공백으로 구분된 인자 목록 (래퍼 명령용)
fn override_args(target: &mut Vec<String>, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val.split_whitespace().map(str::to_owned).collect();
    }
}
