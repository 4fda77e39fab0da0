//! 컴포지터 명령줄 구성
//!
//! 중첩 세션은 항상 컴포지터(phoc)를 통해 시작되며, 컴포지터가 준비되면
//! 빌드 디렉토리의 런처 스크립트로 셸을 실행합니다.
//!
//! ```text
//! [wrapper...] phoc [--no-xwayland] -C <source>/data/phoc.ini \
//!     --socket <workdir>/wayland-socket -E <build>/run
//! ```

use std::fmt;
use std::os::unix::process::CommandExt;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use phosh_itest_core::config::SessionConfig;

use crate::environment::ChildEnvironment;

/// 자식 프로세스 명령줄
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompositorCommand {
    argv: Vec<String>,
}

impl CompositorCommand {
    /// 설정과 디렉토리로부터 명령줄을 구성합니다.
    ///
    /// `compositor_config`는 소스 디렉토리 기준, `launcher`는 빌드 디렉토리 기준
    /// 상대 경로로 해석합니다. 절대 경로라면 그대로 사용됩니다.
    pub fn new(config: &SessionConfig, source_dir: &Path, build_dir: &Path, socket: &Path) -> Self {
        let mut argv: Vec<String> = config.wrapper.clone();
        argv.push(config.compositor.clone());

        if !config.xwayland {
            argv.push("--no-xwayland".to_owned());
        }

        let compositor_config: PathBuf = source_dir.join(&config.compositor_config);
        argv.push("-C".to_owned());
        argv.push(compositor_config.display().to_string());

        argv.push("--socket".to_owned());
        argv.push(socket.display().to_string());

        let launcher: PathBuf = build_dir.join(&config.launcher);
        argv.push("-E".to_owned());
        argv.push(launcher.display().to_string());

        Self { argv }
    }

    /// 실행할 프로그램 (래퍼가 있으면 래퍼의 첫 요소)
    pub fn program(&self) -> &str {
        self.argv.first().map(String::as_str).unwrap_or_default()
    }

    /// 전체 인자 벡터 (프로그램 포함)
    pub fn argv(&self) -> &[String] {
        &self.argv
    }

    /// `std::process::Command`로 변환합니다.
    ///
    /// 환경은 `env` 레이어로 완전히 대체되고, stdin은 닫히며,
    /// stdout/stderr는 파이프로 연결됩니다.
    ///
    /// 자식은 자기 프로세스 그룹에서 실행됩니다. 터미널의 Ctrl+C(SIGINT)는
    /// 하네스만 받고, 자식 종료는 teardown의 SIGTERM으로만 일어납니다.
    pub fn to_command(&self, env: &ChildEnvironment) -> Command {
        let mut cmd = Command::new(self.program());
        cmd.args(self.argv.iter().skip(1))
            .env_clear()
            .envs(env.iter())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .process_group(0);
        cmd
    }
}

impl fmt::Display for CompositorCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.argv.join(" "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build(config: &SessionConfig) -> CompositorCommand {
        CompositorCommand::new(
            config,
            Path::new("/src/phosh"),
            Path::new("/build"),
            Path::new("/build/phosh-itest-abc/wayland-socket"),
        )
    }

    #[test]
    fn default_command_line() {
        let cmd = build(&SessionConfig::default());
        assert_eq!(
            cmd.argv(),
            [
                "phoc",
                "--no-xwayland",
                "-C",
                "/src/phosh/data/phoc.ini",
                "--socket",
                "/build/phosh-itest-abc/wayland-socket",
                "-E",
                "/build/run",
            ]
        );
        assert_eq!(cmd.program(), "phoc");
    }

    #[test]
    fn wrapper_is_prepended() {
        let config = SessionConfig {
            wrapper: vec!["valgrind".to_owned(), "--error-exitcode=1".to_owned()],
            ..SessionConfig::default()
        };
        let cmd = build(&config);
        assert_eq!(cmd.program(), "valgrind");
        assert_eq!(cmd.argv()[1], "--error-exitcode=1");
        assert_eq!(cmd.argv()[2], "phoc");
    }

    #[test]
    fn xwayland_drops_flag() {
        let config = SessionConfig {
            xwayland: true,
            ..SessionConfig::default()
        };
        let cmd = build(&config);
        assert!(!cmd.argv().iter().any(|a| a == "--no-xwayland"));
    }

    #[test]
    fn absolute_paths_are_kept() {
        let config = SessionConfig {
            compositor_config: "/etc/phosh/phoc.ini".to_owned(),
            launcher: "/usr/libexec/phosh".to_owned(),
            ..SessionConfig::default()
        };
        let cmd = build(&config);
        assert!(cmd.argv().contains(&"/etc/phosh/phoc.ini".to_owned()));
        assert!(cmd.argv().contains(&"/usr/libexec/phosh".to_owned()));
    }

    #[test]
    fn display_joins_arguments() {
        let cmd = build(&SessionConfig::default());
        let shown = cmd.to_string();
        assert!(shown.starts_with("phoc --no-xwayland -C "));
        assert!(shown.ends_with("-E /build/run"));
    }
}
