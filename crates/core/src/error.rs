//! 에러 타입 -- 도메인별 에러 정의

/// phosh-itest 최상위 에러 타입
#[derive(Debug, thiserror::Error)]
pub enum HarnessError {
    /// 설정 관련 에러
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// 세션 수명주기 에러 (spawn, 대기, 종료)
    #[error("session error: {0}")]
    Session(String),

    /// 실행 후 로그 검사에서 critical 라인이 발견됨
    #[error("log contains {count} critical line(s): {lines:?}")]
    CriticalLines { count: usize, lines: Vec<String> },

    /// 자식 프로세스가 예상하지 못한 상태로 종료됨
    #[error("abnormal exit: {0}")]
    AbnormalExit(String),

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// 설정 관련 에러
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// 설정 파일을 찾을 수 없음
    #[error("config file not found: {path}")]
    FileNotFound { path: String },

    /// 설정 파싱 실패
    #[error("failed to parse config: {reason}")]
    ParseFailed { reason: String },

    /// 유효하지 않은 설정 값
    #[error("invalid config value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}
