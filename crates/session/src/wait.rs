//! 폴링 대기 -- 두 스트림 마커 조건 + 타임아웃
//!
//! # 상태 기계
//! ```text
//! 진입: 마커가 이미 버퍼에 있으면 MarkerAlreadyPresent (ignore_already_present 제외)
//!   |
//!   v
//! WAITING --(자식 종료, 남은 출력 drain)--> PROCESS_EXITED
//!   | pump stdout -> pump stderr -> found 재계산
//!   |--(모든 마커 발견)--> SATISFIED
//!   |--(예산 소진)-----> TIMED_OUT
//!   `-- sleep(min(interval, 남은 예산)) 후 반복
//! ```
//!
//! 예산 5초 / 간격 1초면 출력은 최대 6번 검사됩니다 (t=0..5).

use std::time::Duration;

use tracing::{debug, trace};

use phosh_itest_core::types::Stream;

use crate::capture::OutputCapture;
use crate::clock::Clock;
use crate::error::SessionError;
use crate::process::{ChildProcess, ExitOutcome};

/// 한 번의 sleep 최소 길이. 간격이 0이어도 예산은 줄어듭니다.
const MIN_POLL_STEP: Duration = Duration::from_millis(1);

/// 대기 요청
///
/// 한 번의 `wait_for_output` 호출 동안만 존재합니다.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WaitRequest {
    /// stdout에서 기다릴 부분 문자열
    pub stdout: Option<String>,
    /// stderr에서 기다릴 부분 문자열
    pub stderr: Option<String>,
    /// 대기 예산 (`None`이면 세션 기본값 `wait_timeout_secs`)
    pub timeout: Option<Duration>,
    /// 대기 시작 전에 이미 존재하는 마커 허용 여부
    pub ignore_already_present: bool,
}

impl WaitRequest {
    /// 빈 요청 (마커 없음 -- 자식이 살아 있으면 즉시 만족)
    pub fn new() -> Self {
        Self::default()
    }

    /// stdout 마커를 설정합니다.
    pub fn stdout(mut self, marker: impl Into<String>) -> Self {
        self.stdout = Some(marker.into());
        self
    }

    /// stderr 마커를 설정합니다.
    pub fn stderr(mut self, marker: impl Into<String>) -> Self {
        self.stderr = Some(marker.into());
        self
    }

    /// 대기 예산을 초 단위로 설정합니다.
    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.timeout = Some(Duration::from_secs(secs));
        self
    }

    /// 대기 예산을 설정합니다.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// 이미 존재하는 마커를 허용합니다.
    pub fn ignore_already_present(mut self) -> Self {
        self.ignore_already_present = true;
        self
    }

    /// 요청된 (스트림, 마커) 쌍
    pub fn markers(&self) -> impl Iterator<Item = (Stream, &str)> {
        [
            (Stream::Stdout, self.stdout.as_deref()),
            (Stream::Stderr, self.stderr.as_deref()),
        ]
        .into_iter()
        .filter_map(|(stream, marker)| marker.map(|m| (stream, m)))
    }
}

/// 대기 결과
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// 모든 마커 발견 (검사 횟수)
    Satisfied {
        /// 출력을 검사한 횟수
        polls: u32,
    },
    /// 마커가 나타나기 전에 자식이 종료
    ProcessExited(ExitOutcome),
    /// 예산 소진
    TimedOut {
        /// 출력을 검사한 횟수
        polls: u32,
    },
}

impl WaitOutcome {
    /// 만족 여부
    pub fn is_satisfied(&self) -> bool {
        matches!(self, Self::Satisfied { .. })
    }
}

impl std::fmt::Display for WaitOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Satisfied { polls } => write!(f, "satisfied after {polls} poll(s)"),
            Self::ProcessExited(exit) => write!(f, "process exited (exit status: {exit})"),
            Self::TimedOut { polls } => write!(f, "timed out after {polls} poll(s)"),
        }
    }
}

/// 대기 루프가 폴링하는 출력 원천
///
/// 프로덕션에서는 [`ChildProcess`], 테스트에서는 스크립트된 가짜 구현을 사용합니다.
pub trait OutputSource {
    /// 블록하지 않고 종료 여부를 확인합니다.
    fn try_exit(&mut self) -> Result<Option<ExitOutcome>, SessionError>;

    /// 읽을 수 있는 출력을 캡처 버퍼로 옮깁니다.
    fn pump(&mut self, capture: &mut OutputCapture) -> Result<usize, SessionError>;
}

impl OutputSource for ChildProcess {
    fn try_exit(&mut self) -> Result<Option<ExitOutcome>, SessionError> {
        ChildProcess::try_exit(self)
    }

    fn pump(&mut self, capture: &mut OutputCapture) -> Result<usize, SessionError> {
        ChildProcess::pump(self, capture)
    }
}

/// 대기 전제 조건을 확인합니다.
///
/// `ignore_already_present`가 아니면 요청된 마커가 아직 버퍼에 없어야 합니다.
pub fn check_preconditions(
    request: &WaitRequest,
    capture: &OutputCapture,
) -> Result<(), SessionError> {
    if request.ignore_already_present {
        return Ok(());
    }
    for (stream, marker) in request.markers() {
        if capture.contains(stream, marker) {
            return Err(SessionError::MarkerAlreadyPresent {
                stream,
                marker: marker.to_owned(),
            });
        }
    }
    Ok(())
}

/// 상태 기계를 실행합니다.
///
/// 전제 조건 확인은 [`check_preconditions`]로 호출자가 먼저 수행합니다.
pub fn poll_until<S: OutputSource + ?Sized>(
    source: &mut S,
    capture: &mut OutputCapture,
    request: &WaitRequest,
    timeout: Duration,
    interval: Duration,
    clock: &dyn Clock,
) -> Result<WaitOutcome, SessionError> {
    let mut remaining = timeout;
    let mut polls: u32 = 0;

    loop {
        if let Some(exit) = source.try_exit()? {
            // 종료 직전에 쓴 출력은 진단용으로 보존
            source.pump(capture)?;
            debug!(%exit, polls, "child exited while waiting for output");
            return Ok(WaitOutcome::ProcessExited(exit));
        }

        source.pump(capture)?;
        polls += 1;

        let satisfied = request
            .markers()
            .all(|(stream, marker)| capture.contains(stream, marker));
        if satisfied {
            debug!(polls, "wait satisfied");
            return Ok(WaitOutcome::Satisfied { polls });
        }

        if remaining.is_zero() {
            debug!(polls, ?timeout, "wait timed out");
            return Ok(WaitOutcome::TimedOut { polls });
        }

        let step = interval.max(MIN_POLL_STEP).min(remaining);
        trace!(polls, ?remaining, "markers not found yet, sleeping");
        clock.sleep(step);
        remaining = remaining.saturating_sub(step);
    }
}
