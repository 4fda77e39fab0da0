//! 진단 로그 저장
//!
//! teardown 시 캡처된 버퍼 전체를 고정 이름 파일로 기록합니다.

use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::info;

use crate::capture::OutputCapture;

/// stdout 로그 파일 이름
pub const STDOUT_LOG: &str = "log.stdout";
/// stderr 로그 파일 이름
pub const STDERR_LOG: &str = "log.stderr";

/// 저장된 로그 파일 경로
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SavedLogs {
    pub stdout: PathBuf,
    pub stderr: PathBuf,
}

/// `dir`에 `log.stdout` / `log.stderr`를 씁니다. 디렉토리가 없으면 생성합니다.
pub fn persist(dir: &Path, capture: &OutputCapture) -> std::io::Result<SavedLogs> {
    std::fs::create_dir_all(dir)?;

    let saved = SavedLogs {
        stdout: dir.join(STDOUT_LOG),
        stderr: dir.join(STDERR_LOG),
    };
    std::fs::write(&saved.stdout, capture.stdout())?;
    std::fs::write(&saved.stderr, capture.stderr())?;

    info!(
        stdout = %saved.stdout.display(),
        stderr = %saved.stderr.display(),
        "saved session logs"
    );
    Ok(saved)
}
