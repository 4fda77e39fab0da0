//! Shared fixtures: a temp source/build tree and fake compositor scripts.
//!
//! Fake compositors are plain shell scripts run through the `sh` wrapper, so
//! they never need the exec bit. The harness appends the usual compositor
//! arguments (`--no-xwayland -C ... --socket ... -E ...`), which the scripts
//! ignore.

#![allow(dead_code)]

use std::path::{Path, PathBuf};

use phosh_itest_core::config::{LogsConfig, SessionConfig};
use phosh_itest_session::{AmbientEnv, SessionBuilder};
use tempfile::TempDir;

/// Readiness marker the scripts print.
pub const READY: &str = "Phosh ready after 0.1s";

/// Writes the marker to stderr and keeps running until signalled.
pub const READY_THEN_SLEEP: &str = "echo 'Phosh ready after 0.1s' >&2\nexec sleep 30\n";

pub struct Fixture {
    pub root: TempDir,
    pub source_dir: PathBuf,
    pub build_dir: PathBuf,
}

impl Fixture {
    pub fn new() -> Self {
        let root = TempDir::new().expect("should create temp dir");
        let source_dir = root.path().join("src");
        let build_dir = root.path().join("_build");
        std::fs::create_dir_all(source_dir.join("data")).expect("should create source dir");
        std::fs::create_dir_all(&build_dir).expect("should create build dir");
        Self {
            root,
            source_dir,
            build_dir,
        }
    }

    /// Write a fake compositor script and return its path.
    pub fn compositor(&self, name: &str, body: &str) -> PathBuf {
        let path = self.root.path().join(format!("{name}.sh"));
        std::fs::write(&path, format!("#!/bin/sh\n{body}")).expect("should write script");
        path
    }

    /// Session config running `script` with a short poll interval.
    pub fn session_config(&self, script: &Path) -> SessionConfig {
        SessionConfig {
            compositor: script.display().to_string(),
            wrapper: vec!["sh".to_owned()],
            poll_interval_ms: 200,
            shutdown_timeout_secs: 5,
            ..SessionConfig::default()
        }
    }

    /// Builder with an isolated ambient snapshot (only `PATH`).
    pub fn builder(&self, config: SessionConfig) -> SessionBuilder {
        SessionBuilder::new(&self.source_dir, &self.build_dir)
            .session_config(config)
            .logs_config(LogsConfig::default())
            .ambient(ambient(&[]))
    }

    /// Number of entries left in the build directory.
    pub fn build_dir_entries(&self) -> usize {
        std::fs::read_dir(&self.build_dir)
            .expect("should read build dir")
            .count()
    }
}

/// Ambient snapshot with the harness `PATH` plus `extra`.
pub fn ambient(extra: &[(&str, &str)]) -> AmbientEnv {
    let path = std::env::var_os("PATH").unwrap_or_else(|| "/usr/bin:/bin".into());
    let mut vars: Vec<(std::ffi::OsString, std::ffi::OsString)> = vec![("PATH".into(), path)];
    vars.extend(extra.iter().map(|(k, v)| ((*k).into(), (*v).into())));
    AmbientEnv::from_vars(vars)
}
