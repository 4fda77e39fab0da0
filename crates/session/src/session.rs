//! 세션 컨트롤러 -- 중첩 컴포지터 세션 하나의 수명주기
//!
//! [`Session`]은 자식 프로세스 핸들을 독점 소유합니다. 다른 컴포넌트는
//! 자식에게 시그널을 보내거나 회수할 수 없습니다.
//!
//! # 수명주기
//! ```text
//! SessionBuilder::build()   작업 디렉토리 생성, 소켓 경로 결정
//!         |
//! Session::spawn()          환경 구성 -> 실행 -> O_NONBLOCK -> 준비 마커 대기
//!         |
//! wait_for_output() ...     테스트 본문
//!         |
//! Session::teardown()       SIGTERM -> 회수(유예 초과 시 SIGKILL) -> 종료 상태 검증
//!                           -> 로그 저장 -> 작업 디렉토리 삭제
//! ```
//!
//! teardown 없이 드롭된 세션은 `Drop`에서 자식을 종료/회수합니다.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use nix::sys::signal::Signal;
use serde::Serialize;
use tempfile::TempDir;
use tracing::{debug, info, warn};

use phosh_itest_core::config::{HarnessConfig, LogsConfig, SessionConfig};
use phosh_itest_core::types::{Backend, Severity, Stream};

use crate::capture::{OutputCapture, lines_with_marker};
use crate::clock::{Clock, SystemClock};
use crate::command::CompositorCommand;
use crate::environment::{AmbientEnv, ChildEnvironment};
use crate::error::SessionError;
use crate::logs::{self, SavedLogs};
use crate::process::{ChildProcess, ExitOutcome};
use crate::wait::{self, WaitOutcome, WaitRequest};

/// 작업 디렉토리 접두사
const WORK_DIR_PREFIX: &str = "phosh-itest-";

/// 작업 디렉토리 안의 소켓 파일 이름
const SOCKET_NAME: &str = "wayland-socket";

/// teardown 중 종료 확인 간격
const REAP_INTERVAL: Duration = Duration::from_millis(50);

/// 세션 빌더
pub struct SessionBuilder {
    source_dir: PathBuf,
    build_dir: PathBuf,
    overrides: BTreeMap<String, String>,
    session: SessionConfig,
    logs: LogsConfig,
    ambient: Option<AmbientEnv>,
    clock: Option<Arc<dyn Clock>>,
}

impl SessionBuilder {
    /// 소스/빌드 디렉토리로 새 빌더를 생성합니다.
    pub fn new(source_dir: impl Into<PathBuf>, build_dir: impl Into<PathBuf>) -> Self {
        Self {
            source_dir: source_dir.into(),
            build_dir: build_dir.into(),
            overrides: BTreeMap::new(),
            session: SessionConfig::default(),
            logs: LogsConfig::default(),
            ambient: None,
            clock: None,
        }
    }

    /// 하네스 설정에서 세션/로그 섹션을 가져옵니다.
    pub fn config(mut self, config: &HarnessConfig) -> Self {
        self.session = config.session.clone();
        self.logs = config.logs.clone();
        self
    }

    /// 세션 설정을 지정합니다.
    pub fn session_config(mut self, session: SessionConfig) -> Self {
        self.session = session;
        self
    }

    /// 로그 저장 설정을 지정합니다.
    pub fn logs_config(mut self, logs: LogsConfig) -> Self {
        self.logs = logs;
        self
    }

    /// 자식 환경 오버라이드를 추가합니다 (최우선 레이어).
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.overrides.insert(key.into(), value.into());
        self
    }

    /// 자식 환경 오버라이드를 여러 개 추가합니다.
    pub fn envs<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.overrides
            .extend(vars.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// 환경 스냅샷을 지정합니다. 지정하지 않으면 현재 프로세스 환경을 캡처합니다.
    pub fn ambient(mut self, ambient: AmbientEnv) -> Self {
        self.ambient = Some(ambient);
        self
    }

    /// 폴링 루프의 sleep 전략을 지정합니다.
    ///
    /// 대기 예산은 이 clock의 sleep으로만 소모되므로, 실제 자식과 함께
    /// [`ManualClock`](crate::clock::ManualClock)을 쓰면 준비 대기가 즉시 만료됩니다.
    /// teardown 유예 시간은 clock과 관계없이 실제 시간입니다.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// 세션을 생성합니다.
    ///
    /// 세션 설정을 먼저 검증합니다 ([`SessionConfig::validate`]).
    /// 빌드 디렉토리 아래에 세션 전용 임시 디렉토리를 만들고
    /// 그 안의 소켓 경로를 결정합니다. 자식은 아직 실행하지 않습니다.
    pub fn build(self) -> Result<Session, SessionError> {
        self.session.validate()?;

        let work_dir = tempfile::Builder::new()
            .prefix(WORK_DIR_PREFIX)
            .tempdir_in(&self.build_dir)
            .map_err(|source| SessionError::WorkDir {
                build_dir: self.build_dir.clone(),
                source,
            })?;
        let socket = work_dir.path().join(SOCKET_NAME);

        debug!(
            work_dir = %work_dir.path().display(),
            socket = %socket.display(),
            "session constructed"
        );

        Ok(Session {
            source_dir: self.source_dir,
            build_dir: self.build_dir,
            work_dir: Some(work_dir),
            socket,
            overrides: self.overrides,
            ambient: self.ambient.unwrap_or_else(AmbientEnv::capture),
            config: self.session,
            logs: self.logs,
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
            child: None,
            capture: OutputCapture::new(),
        })
    }
}

/// 중첩 컴포지터 세션
pub struct Session {
    source_dir: PathBuf,
    build_dir: PathBuf,
    work_dir: Option<TempDir>,
    socket: PathBuf,
    overrides: BTreeMap<String, String>,
    ambient: AmbientEnv,
    config: SessionConfig,
    logs: LogsConfig,
    clock: Arc<dyn Clock>,
    child: Option<ChildProcess>,
    capture: OutputCapture,
}

impl Session {
    /// 기본 설정으로 세션을 생성합니다.
    pub fn new<I, K, V>(
        source_dir: impl Into<PathBuf>,
        build_dir: impl Into<PathBuf>,
        overrides: I,
    ) -> Result<Self, SessionError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        SessionBuilder::new(source_dir, build_dir)
            .envs(overrides)
            .build()
    }

    /// 빌더를 반환합니다.
    pub fn builder(source_dir: impl Into<PathBuf>, build_dir: impl Into<PathBuf>) -> SessionBuilder {
        SessionBuilder::new(source_dir, build_dir)
    }

    /// 중첩 컴포지터 백엔드를 결정합니다.
    pub fn resolve_backend(&self) -> Backend {
        self.ambient.resolve_backend()
    }

    /// 자식에게 넘길 환경을 구성합니다.
    pub fn child_environment(&self) -> ChildEnvironment {
        ChildEnvironment::layered(
            &self.ambient,
            &self.build_dir,
            &self.resolve_backend(),
            &self.overrides,
        )
    }

    /// 자식 명령줄을 구성합니다.
    pub fn command(&self) -> CompositorCommand {
        CompositorCommand::new(&self.config, &self.source_dir, &self.build_dir, &self.socket)
    }

    /// 자식을 실행하고 준비 마커를 기다립니다.
    ///
    /// # Errors
    ///
    /// 준비 마커가 예산 안에 나타나지 않거나 자식이 먼저 종료하면
    /// 마지막 종료 상태와 캡처된 출력 전체를 담은 [`SessionError::Startup`]을
    /// 반환합니다. 이때 자식은 세션 드롭과 함께 정리됩니다.
    pub fn spawn(mut self) -> Result<Self, SessionError> {
        if let Some(child) = &self.child {
            return Err(SessionError::AlreadySpawned { pid: child.id() });
        }

        let backend = self.resolve_backend();
        let env = self.child_environment();
        let command = self.command();
        info!(%command, %backend, "spawning nested compositor");

        let child = ChildProcess::spawn(command.to_command(&env), command.program())?;
        let pid = child.id();
        self.child = Some(child);

        let readiness = WaitRequest::new()
            .stderr(self.config.readiness_marker.clone())
            .timeout(self.config.startup_timeout());
        let outcome = self.wait_for_output(&readiness)?;

        if outcome.is_satisfied() {
            info!(pid, %outcome, "session ready");
            return Ok(self);
        }

        let status = match outcome {
            WaitOutcome::ProcessExited(exit) => exit.to_string(),
            _ => self
                .child
                .as_mut()
                .and_then(|child| child.try_exit().ok().flatten())
                .map_or_else(|| "none".to_owned(), |exit| exit.to_string()),
        };
        warn!(pid, %outcome, %status, "session did not become ready");

        Err(SessionError::Startup {
            status,
            stdout: self.capture.stdout().to_owned(),
            stderr: self.capture.stderr().to_owned(),
        })
    }

    /// 요청된 마커가 나타날 때까지 폴링합니다.
    ///
    /// 타임아웃과 자식 종료는 에러가 아니라 [`WaitOutcome`]으로 보고됩니다.
    ///
    /// # Errors
    ///
    /// - [`SessionError::NotSpawned`]: 자식이 없음
    /// - [`SessionError::MarkerAlreadyPresent`]: 전제 조건 위반 (폴링 전)
    pub fn wait_for_output(&mut self, request: &WaitRequest) -> Result<WaitOutcome, SessionError> {
        let child = self.child.as_mut().ok_or(SessionError::NotSpawned)?;
        wait::check_preconditions(request, &self.capture)?;

        let timeout = request
            .timeout
            .unwrap_or_else(|| Duration::from_secs(self.config.wait_timeout_secs));
        debug!(
            stdout = ?request.stdout,
            stderr = ?request.stderr,
            ?timeout,
            "waiting for output"
        );

        wait::poll_until(
            child,
            &mut self.capture,
            request,
            timeout,
            self.config.poll_interval(),
            self.clock.as_ref(),
        )
    }

    /// [`wait_for_output`](Self::wait_for_output)가 만족되지 않으면 에러로 바꿉니다.
    pub fn expect_output(&mut self, request: &WaitRequest) -> Result<WaitOutcome, SessionError> {
        let outcome = self.wait_for_output(request)?;
        if outcome.is_satisfied() {
            return Ok(outcome);
        }

        let (stream, marker) = request
            .markers()
            .find(|(stream, marker)| !self.capture.contains(*stream, marker))
            .or_else(|| request.markers().next())
            .unwrap_or((Stream::Stderr, ""));
        Err(SessionError::Expectation {
            stream,
            marker: marker.to_owned(),
            outcome: outcome.to_string(),
        })
    }

    /// 지금까지 캡처된 stdout에 `needle`이 있는지 확인합니다. I/O는 하지 않습니다.
    pub fn check_stdout_contains(&self, needle: &str) -> bool {
        self.capture.contains(Stream::Stdout, needle)
    }

    /// stderr의 critical 라인
    pub fn critical_lines(&self) -> Vec<&str> {
        self.capture.severity_lines(Severity::Critical)
    }

    /// stderr의 warning 라인
    pub fn warning_lines(&self) -> Vec<&str> {
        self.capture.severity_lines(Severity::Warning)
    }

    /// 한 번 pump하고 종료 여부를 확인합니다.
    pub fn poll(&mut self) -> Result<Option<ExitOutcome>, SessionError> {
        let child = self.child.as_mut().ok_or(SessionError::NotSpawned)?;
        child.pump(&mut self.capture)?;
        child.try_exit()
    }

    /// 자식 PID
    pub fn pid(&self) -> Option<u32> {
        self.child.as_ref().map(ChildProcess::id)
    }

    /// 캡처된 stdout
    pub fn stdout(&self) -> &str {
        self.capture.stdout()
    }

    /// 캡처된 stderr
    pub fn stderr(&self) -> &str {
        self.capture.stderr()
    }

    /// 캡처 버퍼
    pub fn capture(&self) -> &OutputCapture {
        &self.capture
    }

    /// 소켓 경로
    pub fn socket_path(&self) -> &Path {
        &self.socket
    }

    /// 세션 작업 디렉토리 (teardown 후에는 없음)
    pub fn work_dir(&self) -> Option<&Path> {
        self.work_dir.as_ref().map(TempDir::path)
    }

    /// 세션 설정
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// 세션을 종료합니다.
    ///
    /// 실패해도 panic하거나 에러를 반환하지 않습니다. 종료 상태 검증 결과와
    /// 관계없이 로그 저장과 작업 디렉토리 삭제는 항상 수행됩니다.
    pub fn teardown(mut self) -> TeardownReport {
        let (exit, forced) = match self.child.take() {
            Some(mut child) => terminate(
                &mut child,
                &mut self.capture,
                self.config.shutdown_timeout(),
            ),
            None => (None, false),
        };

        let clean = !forced && exit.is_none_or(ExitOutcome::is_clean);
        let exit_label = exit.map_or_else(|| "none".to_owned(), |e| e.to_string());
        if clean {
            info!(exit = %exit_label, "session torn down");
        } else {
            warn!(
                exit = %exit_label,
                forced,
                stdout = self.capture.stdout(),
                stderr = self.capture.stderr(),
                "teardown was not clean"
            );
        }

        let saved_logs = if self.logs.save || self.ambient.save_logs_requested() {
            match logs::persist(Path::new(&self.logs.dir), &self.capture) {
                Ok(saved) => Some(saved),
                Err(e) => {
                    warn!(error = %e, dir = %self.logs.dir, "failed to save session logs");
                    None
                }
            }
        } else {
            None
        };

        let work_dir_removed = match self.work_dir.take() {
            Some(dir) => {
                let path = dir.path().to_path_buf();
                match dir.close() {
                    Ok(()) => true,
                    Err(e) => {
                        warn!(error = %e, path = %path.display(), "failed to remove work directory");
                        false
                    }
                }
            }
            None => true,
        };

        let (stdout, stderr) = std::mem::take(&mut self.capture).into_text();
        TeardownReport {
            exit,
            clean,
            forced,
            saved_logs,
            work_dir_removed,
            stdout,
            stderr,
        }
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("source_dir", &self.source_dir)
            .field("build_dir", &self.build_dir)
            .field("socket", &self.socket)
            .field("overrides", &self.overrides)
            .field("pid", &self.pid())
            .finish_non_exhaustive()
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Some(mut child) = self.child.take() {
            warn!(pid = child.id(), "session dropped without teardown, terminating child");
            terminate(
                &mut child,
                &mut self.capture,
                self.config.shutdown_timeout(),
            );
        }
    }
}

/// SIGTERM을 보내고 유예 시간 동안 회수를 시도합니다. 초과하면 SIGKILL.
///
/// 자식이 가득 찬 파이프에 막혀 종료하지 못하는 일이 없도록 대기 중에도 출력을 읽습니다.
/// 유예 시간은 주입된 [`Clock`]이 아니라 실제 시간으로 잽니다.
/// 반환값은 (종료 상태, 강제 종료 여부)입니다.
fn terminate(
    child: &mut ChildProcess,
    capture: &mut OutputCapture,
    grace: Duration,
) -> (Option<ExitOutcome>, bool) {
    let pid = child.id();
    if let Err(e) = child.signal(Signal::SIGTERM) {
        warn!(pid, error = %e, "failed to send SIGTERM");
    }

    let deadline = Instant::now() + grace;
    loop {
        if let Err(e) = child.pump(capture) {
            warn!(pid, error = %e, "failed to read child output");
        }
        match child.try_exit() {
            Ok(Some(exit)) => {
                let _ = child.pump(capture);
                debug!(pid, %exit, "child reaped");
                return (Some(exit), false);
            }
            Ok(None) => {}
            Err(e) => {
                warn!(pid, error = %e, "failed to poll child status");
                break;
            }
        }
        let now = Instant::now();
        if now >= deadline {
            break;
        }
        std::thread::sleep(REAP_INTERVAL.min(deadline - now));
    }

    warn!(pid, ?grace, "child did not exit after SIGTERM, sending SIGKILL");
    if let Err(e) = child.kill() {
        warn!(pid, error = %e, "failed to send SIGKILL");
    }
    match child.wait() {
        Ok(exit) => {
            let _ = child.pump(capture);
            (Some(exit), true)
        }
        Err(e) => {
            warn!(pid, error = %e, "failed to reap child");
            (None, true)
        }
    }
}

/// teardown 결과
#[derive(Debug, Clone, Serialize)]
pub struct TeardownReport {
    /// 자식 종료 상태 (spawn하지 않았거나 회수 실패 시 `None`)
    pub exit: Option<ExitOutcome>,
    /// 정상 종료 여부 (SIGTERM 또는 종료 코드 0, 강제 종료 아님)
    pub clean: bool,
    /// SIGKILL로 강제 종료했는지 여부
    pub forced: bool,
    /// 저장된 로그 파일
    pub saved_logs: Option<SavedLogs>,
    /// 작업 디렉토리 삭제 여부
    pub work_dir_removed: bool,
    /// 캡처된 stdout 전체
    pub stdout: String,
    /// 캡처된 stderr 전체
    pub stderr: String,
}

impl TeardownReport {
    /// 정상 종료 여부
    pub fn is_clean(&self) -> bool {
        self.clean
    }

    /// 사람이 읽을 종료 상태 (`0`, `signal 15`, `none`)
    pub fn exit_label(&self) -> String {
        self.exit
            .map_or_else(|| "none".to_owned(), |exit| exit.to_string())
    }

    /// stderr의 critical 라인
    pub fn critical_lines(&self) -> Vec<&str> {
        lines_with_marker(&self.stderr, Severity::Critical.marker())
    }

    /// stderr의 warning 라인
    pub fn warning_lines(&self) -> Vec<&str> {
        lines_with_marker(&self.stderr, Severity::Warning.marker())
    }
}
