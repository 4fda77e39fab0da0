//! 세션 에러 타입
//!
//! [`SessionError`]는 세션 수명주기(작업 디렉토리 생성, spawn, 대기, 종료)에서
//! 발생하는 에러를, [`ScenarioError`]는 [`Scenario`](crate::scenario::Scenario)
//! 실행 후 로그 정책 위반을 표현합니다.
//! 두 타입 모두 `HarnessError`로 변환되어 상위 레이어에서 `?`로 전파할 수 있습니다.

use std::path::PathBuf;

use nix::sys::signal::Signal;
use phosh_itest_core::error::{ConfigError, HarnessError};
use phosh_itest_core::types::Stream;

use crate::session::TeardownReport;

/// 세션 도메인 에러
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// 세션 설정이 유효하지 않음 (세션 생성 전 검증)
    #[error("invalid session config: {0}")]
    Config(#[from] ConfigError),

    /// 세션 전용 임시 디렉토리 생성 실패
    #[error("failed to create session work directory in {}: {source}", .build_dir.display())]
    WorkDir {
        /// 임시 디렉토리를 만들 빌드 디렉토리
        build_dir: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// 자식 프로세스 실행 실패
    #[error("failed to spawn '{program}': {source}")]
    Spawn {
        /// 실행하려던 프로그램
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// 파이프를 non-blocking으로 전환하지 못함
    #[error("failed to switch {stream} pipe to non-blocking mode: {source}")]
    NonBlocking {
        /// 대상 스트림
        stream: Stream,
        #[source]
        source: nix::Error,
    },

    /// 이미 spawn된 세션을 다시 spawn하려 함
    #[error("session already has a running child (pid {pid})")]
    AlreadySpawned {
        /// 실행 중인 자식 PID
        pid: u32,
    },

    /// 아직 spawn되지 않은 세션에서 대기하려 함
    #[error("session has no child process")]
    NotSpawned,

    /// 대기 시작 전에 이미 마커가 버퍼에 존재 (전제 조건 위반)
    #[error("{stream} already contains {marker:?} before waiting")]
    MarkerAlreadyPresent {
        /// 마커를 찾은 스트림
        stream: Stream,
        /// 기대 마커
        marker: String,
    },

    /// 셸이 준비 마커를 출력하지 못함
    #[error("Phosh did not start: exit status: {status}\nstderr: {stderr}\nstdout: {stdout}")]
    Startup {
        /// 마지막으로 관찰한 종료 상태 (실행 중이면 `none`)
        status: String,
        /// 캡처된 stdout 전체
        stdout: String,
        /// 캡처된 stderr 전체
        stderr: String,
    },

    /// 기대한 출력이 나타나지 않음
    #[error("expected {marker:?} on {stream}: {outcome}")]
    Expectation {
        /// 대상 스트림
        stream: Stream,
        /// 기대 마커
        marker: String,
        /// 대기 결과 설명
        outcome: String,
    },

    /// 시그널 전송 실패
    #[error("failed to send {signal:?} to pid {pid}: {source}")]
    Signal {
        /// 보내려던 시그널
        signal: Signal,
        /// 대상 PID
        pid: u32,
        #[source]
        source: nix::Error,
    },

    /// 파이프 읽기 등 I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<SessionError> for HarnessError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::Config(e) => HarnessError::Config(e),
            SessionError::Io(e) => HarnessError::Io(e),
            other => HarnessError::Session(other.to_string()),
        }
    }
}

/// 시나리오 실행 에러
///
/// 설정 단계 실패를 제외한 모든 변형은 종료 보고서를 함께 담습니다.
/// 본문이 실패해도 teardown은 항상 실행되기 때문입니다.
#[derive(Debug, thiserror::Error)]
pub enum ScenarioError {
    /// 세션 생성 또는 spawn 실패
    #[error(transparent)]
    Setup(#[from] SessionError),

    /// 시나리오 본문 실패
    #[error("scenario body failed: {source}")]
    Body {
        #[source]
        source: SessionError,
        /// 종료 보고서
        report: Box<TeardownReport>,
    },

    /// 자식 프로세스가 비정상 종료
    #[error("teardown was not clean: exit status: {}", .report.exit_label())]
    AbnormalExit {
        /// 종료 보고서
        report: Box<TeardownReport>,
    },

    /// stderr에 critical 라인이 남음
    #[error("log contains {} critical line(s): {:?}", .lines.len(), .lines)]
    CriticalLines {
        /// critical 라인 목록
        lines: Vec<String>,
        /// 종료 보고서
        report: Box<TeardownReport>,
    },
}

impl ScenarioError {
    /// teardown까지 진행된 경우 종료 보고서를 반환합니다.
    pub fn report(&self) -> Option<&TeardownReport> {
        match self {
            Self::Setup(_) => None,
            Self::Body { report, .. }
            | Self::AbnormalExit { report }
            | Self::CriticalLines { report, .. } => Some(report),
        }
    }
}

impl From<ScenarioError> for HarnessError {
    fn from(err: ScenarioError) -> Self {
        match err {
            ScenarioError::Setup(e) | ScenarioError::Body { source: e, .. } => e.into(),
            ScenarioError::AbnormalExit { report } => {
                HarnessError::AbnormalExit(format!("exit status: {}", report.exit_label()))
            }
            ScenarioError::CriticalLines { lines, .. } => HarnessError::CriticalLines {
                count: lines.len(),
                lines,
            },
        }
    }
}
