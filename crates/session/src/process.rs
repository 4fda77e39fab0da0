//! 자식 프로세스 핸들
//!
//! [`ChildProcess`]는 spawn된 컴포지터와 그 stdout/stderr 파이프를 소유합니다.
//! 두 파이프는 spawn 직후 `O_NONBLOCK`으로 전환되므로 [`ChildProcess::pump`]는
//! 자식이 아무것도 쓰지 않아도 즉시 반환됩니다.

use std::fmt;
use std::os::fd::AsFd;
use std::os::unix::process::ExitStatusExt;
use std::process::{Child, ChildStderr, ChildStdout, Command, ExitStatus};

use nix::fcntl::{FcntlArg, OFlag, fcntl};
use nix::sys::signal::{Signal, kill};
use nix::unistd::Pid;
use serde::Serialize;
use tracing::debug;

use phosh_itest_core::types::Stream;

use crate::capture::{OutputCapture, ReadStatus};
use crate::error::SessionError;

/// 자식 프로세스의 최종 종료 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum ExitOutcome {
    /// 정상 종료 (종료 코드)
    Exited(i32),
    /// 시그널로 종료 (시그널 번호)
    Signaled(i32),
}

impl ExitOutcome {
    /// `ExitStatus`를 변환합니다.
    pub fn from_status(status: ExitStatus) -> Self {
        match (status.code(), status.signal()) {
            (Some(code), _) => Self::Exited(code),
            (None, Some(signal)) => Self::Signaled(signal),
            // 코드도 시그널도 없는 경우는 stop/continue 뿐이며 wait()는 이를 보고하지 않음
            (None, None) => Self::Exited(-1),
        }
    }

    /// teardown 기준 정상 종료 여부
    ///
    /// 종료 코드 0, 또는 teardown이 보낸 SIGTERM으로 인한 종료를 정상으로 봅니다.
    pub fn is_clean(self) -> bool {
        match self {
            Self::Exited(code) => code == 0,
            Self::Signaled(signal) => signal == Signal::SIGTERM as i32,
        }
    }
}

impl fmt::Display for ExitOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exited(code) => write!(f, "{code}"),
            Self::Signaled(signal) => write!(f, "signal {signal}"),
        }
    }
}

/// spawn된 자식 프로세스
#[derive(Debug)]
pub struct ChildProcess {
    child: Child,
    stdout: Option<ChildStdout>,
    stderr: Option<ChildStderr>,
    exit: Option<ExitOutcome>,
}

impl ChildProcess {
    /// 명령을 실행하고 출력 파이프를 non-blocking으로 전환합니다.
    ///
    /// 파이프 전환에 실패하면 자식을 종료/회수한 뒤 에러를 반환합니다.
    pub fn spawn(mut command: Command, program: &str) -> Result<Self, SessionError> {
        let mut child = command.spawn().map_err(|source| SessionError::Spawn {
            program: program.to_owned(),
            source,
        })?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        let switched = stdout
            .as_ref()
            .map_or(Ok(()), |pipe| set_nonblocking(pipe, Stream::Stdout))
            .and_then(|()| {
                stderr
                    .as_ref()
                    .map_or(Ok(()), |pipe| set_nonblocking(pipe, Stream::Stderr))
            });

        if let Err(e) = switched {
            let _ = child.kill();
            let _ = child.wait();
            return Err(e);
        }

        debug!(pid = child.id(), program, "child spawned");
        Ok(Self {
            child,
            stdout,
            stderr,
            exit: None,
        })
    }

    /// 자식 PID
    pub fn id(&self) -> u32 {
        self.child.id()
    }

    /// 이미 회수된 종료 상태
    pub fn exit(&self) -> Option<ExitOutcome> {
        self.exit
    }

    /// 블록하지 않고 종료 여부를 확인합니다.
    pub fn try_exit(&mut self) -> Result<Option<ExitOutcome>, SessionError> {
        if self.exit.is_some() {
            return Ok(self.exit);
        }
        if let Some(status) = self.child.try_wait()? {
            let outcome = ExitOutcome::from_status(status);
            debug!(pid = self.id(), exit = %outcome, "child exited");
            self.exit = Some(outcome);
        }
        Ok(self.exit)
    }

    /// 두 파이프에서 읽을 수 있는 출력을 모두 캡처 버퍼로 옮깁니다.
    ///
    /// stdout을 먼저 읽고 stderr를 읽습니다. EOF에 도달한 파이프는 닫습니다.
    /// 새로 읽은 바이트 수를 반환합니다.
    pub fn pump(&mut self, capture: &mut OutputCapture) -> Result<usize, SessionError> {
        let mut total = 0;

        if let Some(pipe) = self.stdout.as_mut() {
            match capture.append_available(Stream::Stdout, pipe)? {
                ReadStatus::Data(n) => total += n,
                ReadStatus::Empty => {}
                ReadStatus::Closed => self.stdout = None,
            }
        }

        if let Some(pipe) = self.stderr.as_mut() {
            match capture.append_available(Stream::Stderr, pipe)? {
                ReadStatus::Data(n) => total += n,
                ReadStatus::Empty => {}
                ReadStatus::Closed => self.stderr = None,
            }
        }

        Ok(total)
    }

    /// 자식에게 시그널을 보냅니다. 이미 회수된 자식에는 보내지 않습니다.
    pub fn signal(&mut self, signal: Signal) -> Result<(), SessionError> {
        if self.try_exit()?.is_some() {
            debug!(pid = self.id(), ?signal, "child already exited, not signalling");
            return Ok(());
        }

        let pid = self.id();
        let raw = i32::try_from(pid).map_err(|_| SessionError::Signal {
            signal,
            pid,
            source: nix::Error::EINVAL,
        })?;

        match kill(Pid::from_raw(raw), signal) {
            Ok(()) => {
                debug!(pid, ?signal, "signal sent");
                Ok(())
            }
            // 확인과 전송 사이에 종료한 경우 (좀비는 ESRCH를 내지 않지만 안전하게 처리)
            Err(nix::Error::ESRCH) => Ok(()),
            Err(source) => Err(SessionError::Signal {
                signal,
                pid,
                source,
            }),
        }
    }

    /// SIGKILL을 보냅니다.
    pub fn kill(&mut self) -> Result<(), SessionError> {
        self.signal(Signal::SIGKILL)
    }

    /// 종료될 때까지 블록하며 기다립니다.
    pub fn wait(&mut self) -> Result<ExitOutcome, SessionError> {
        if let Some(outcome) = self.exit {
            return Ok(outcome);
        }
        let outcome = ExitOutcome::from_status(self.child.wait()?);
        self.exit = Some(outcome);
        Ok(outcome)
    }
}

fn set_nonblocking<F: AsFd>(pipe: &F, stream: Stream) -> Result<(), SessionError> {
    let to_err = |source| SessionError::NonBlocking { stream, source };

    let bits = fcntl(pipe.as_fd(), FcntlArg::F_GETFL).map_err(to_err)?;
    let mut flags = OFlag::from_bits_truncate(bits);
    flags.insert(OFlag::O_NONBLOCK);
    fcntl(pipe.as_fd(), FcntlArg::F_SETFL(flags)).map_err(to_err)?;
    Ok(())
}
