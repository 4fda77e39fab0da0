//! 도메인 타입 -- 하네스 전역에서 사용되는 공통 타입
//!
//! 출력 스트림 구분, 로그 심각도 마커, 중첩 컴포지터 백엔드 토큰을 정의합니다.

use std::fmt;

use serde::{Deserialize, Serialize};

/// 자식 프로세스의 출력 스트림
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stream {
    /// 표준 출력
    Stdout,
    /// 표준 에러
    Stderr,
}

impl Stream {
    /// 두 스트림을 읽기 순서대로 반환합니다 (stdout 먼저).
    pub const ALL: [Stream; 2] = [Stream::Stdout, Stream::Stderr];

    /// 스트림 이름 (`stdout` / `stderr`)
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Stdout => "stdout",
            Self::Stderr => "stderr",
        }
    }
}

impl fmt::Display for Stream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// GLib 로그 심각도 마커
///
/// 셸은 GLib 로깅을 사용하므로 경고/치명 메시지가
/// `phosh-wwan-mm-CRITICAL **: ...` 형태로 stderr에 기록됩니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// `-CRITICAL **` 태그
    Critical,
    /// `-WARNING **` 태그
    Warning,
}

impl Severity {
    /// 로그 라인에서 찾을 마커 문자열
    pub fn marker(self) -> &'static str {
        match self {
            Self::Critical => "-CRITICAL **",
            Self::Warning => "-WARNING **",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Critical => write!(f, "critical"),
            Self::Warning => write!(f, "warning"),
        }
    }
}

/// 중첩 컴포지터에 전달할 wlroots 백엔드 (`WLR_BACKENDS`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// 호출자가 `WLR_BACKENDS`로 명시한 값 (그대로 전달)
    Explicit(String),
    /// 상위 Wayland 세션 안에서 실행
    Wayland,
    /// 상위 X11 세션 안에서 실행
    X11,
    /// 디스플레이 없음
    Headless,
}

impl Backend {
    /// `WLR_BACKENDS`에 설정할 토큰
    pub fn as_token(&self) -> &str {
        match self {
            Self::Explicit(token) => token,
            Self::Wayland => "wayland",
            Self::X11 => "x11",
            Self::Headless => "headless",
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_token())
    }
}
