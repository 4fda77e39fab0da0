//! 자식 프로세스 환경 구성
//!
//! 하네스는 자기 프로세스 환경을 변경하지 않습니다. 주변 환경 변수를
//! [`AmbientEnv`] 스냅샷으로 한 번 캡처하고, 자식 환경은 명시적인 레이어로
//! 조립합니다.
//!
//! # 레이어 우선순위 (낮음 → 높음)
//!
//! 1. 주변 환경 스냅샷 (하네스가 시작될 때 받은 변수 전체)
//! 2. 하네스 기본값: `GSETTINGS_BACKEND=memory`, 스냅샷에 없으면
//!    빌드 디렉토리를 가리키는 `XDG_RUNTIME_DIR`
//! 3. 결정된 백엔드: `WLR_BACKENDS=<token>`
//! 4. 호출자 오버라이드 (예: `G_MESSAGES_DEBUG`, `XDG_CURRENT_DESKTOP`)

use std::collections::BTreeMap;
use std::ffi::{OsStr, OsString};
use std::path::Path;

use phosh_itest_core::types::Backend;

/// 명시적 wlroots 백엔드 선택
pub const WLR_BACKENDS: &str = "WLR_BACKENDS";
/// Wayland 세션 안에서 실행 중이면 설정됨
pub const WAYLAND_DISPLAY: &str = "WAYLAND_DISPLAY";
/// X11 세션 안에서 실행 중이면 설정됨
pub const DISPLAY: &str = "DISPLAY";
/// 컴포지터가 소켓 잠금 파일을 두는 런타임 디렉토리
pub const XDG_RUNTIME_DIR: &str = "XDG_RUNTIME_DIR";
/// GSettings 백엔드 선택
pub const GSETTINGS_BACKEND: &str = "GSETTINGS_BACKEND";
/// 비어 있지 않으면 teardown 시 캡처된 로그를 저장
pub const SAVE_TEST_LOGS: &str = "SAVE_TEST_LOGS";

/// 하네스 프로세스 환경 스냅샷
#[derive(Debug, Clone, Default)]
pub struct AmbientEnv {
    vars: BTreeMap<OsString, OsString>,
}

impl AmbientEnv {
    /// 현재 프로세스 환경을 캡처합니다.
    pub fn capture() -> Self {
        Self::from_vars(std::env::vars_os())
    }

    /// 명시적인 키/값 쌍으로 스냅샷을 만듭니다.
    pub fn from_vars<I, K, V>(vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<OsString>,
        V: Into<OsString>,
    {
        Self {
            vars: vars
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// 값 조회
    pub fn get(&self, key: &str) -> Option<&OsStr> {
        self.vars.get(OsStr::new(key)).map(OsString::as_os_str)
    }

    /// 빈 값은 설정되지 않은 것으로 취급
    fn get_non_empty(&self, key: &str) -> Option<&OsStr> {
        self.get(key).filter(|v| !v.is_empty())
    }

    /// 주변 환경의 런타임 디렉토리
    pub fn runtime_dir(&self) -> Option<&OsStr> {
        self.get_non_empty(XDG_RUNTIME_DIR)
    }

    /// `SAVE_TEST_LOGS`가 로그 저장을 요청하는지 여부
    pub fn save_logs_requested(&self) -> bool {
        self.get_non_empty(SAVE_TEST_LOGS).is_some()
    }

    /// 중첩 컴포지터의 백엔드 토큰을 고릅니다.
    ///
    /// 먼저 일치하는 것이 이깁니다: 명시적 `WLR_BACKENDS`, `WAYLAND_DISPLAY`
    /// (`wayland`), `DISPLAY` (`x11`), 그 외에는 `headless`.
    pub fn resolve_backend(&self) -> Backend {
        if let Some(explicit) = self.get_non_empty(WLR_BACKENDS) {
            Backend::Explicit(explicit.to_string_lossy().into_owned())
        } else if self.get_non_empty(WAYLAND_DISPLAY).is_some() {
            Backend::Wayland
        } else if self.get_non_empty(DISPLAY).is_some() {
            Backend::X11
        } else {
            Backend::Headless
        }
    }

    fn iter(&self) -> impl Iterator<Item = (&OsString, &OsString)> {
        self.vars.iter()
    }
}

/// 자식에게 전달되는 최종 환경
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChildEnvironment {
    vars: BTreeMap<OsString, OsString>,
}

impl ChildEnvironment {
    /// 모듈 문서의 순서대로 레이어를 병합합니다.
    pub fn layered(
        ambient: &AmbientEnv,
        build_dir: &Path,
        backend: &Backend,
        overrides: &BTreeMap<String, String>,
    ) -> Self {
        let mut vars: BTreeMap<OsString, OsString> = ambient
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        vars.insert(GSETTINGS_BACKEND.into(), "memory".into());
        if ambient.runtime_dir().is_none() {
            tracing::info!(
                runtime_dir = %build_dir.display(),
                "XDG_RUNTIME_DIR unset, using build directory for the child"
            );
            vars.insert(XDG_RUNTIME_DIR.into(), build_dir.as_os_str().to_owned());
        }

        vars.insert(WLR_BACKENDS.into(), backend.as_token().into());

        for (key, value) in overrides {
            vars.insert(key.into(), value.into());
        }

        Self { vars }
    }

    pub fn get(&self, key: &str) -> Option<&OsStr> {
        self.vars.get(OsStr::new(key)).map(OsString::as_os_str)
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&OsStr, &OsStr)> {
        self.vars.iter().map(|(k, v)| (k.as_os_str(), v.as_os_str()))
    }
}
