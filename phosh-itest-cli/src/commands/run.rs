//! `phosh-itest run` command handler
//!
//! Builds a session from the effective configuration and CLI flags, runs it
//! through [`Scenario`] on a blocking thread, and renders the outcome.

use std::collections::BTreeMap;
use std::io::Write;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::Serialize;
use tracing::{info, warn};

use phosh_itest_core::config::HarnessConfig;
use phosh_itest_session::logs::SavedLogs;
use phosh_itest_session::{Scenario, Session, SessionBuilder, SessionError, TeardownReport, WaitRequest};

use crate::cli::RunArgs;
use crate::error::CliError;
use crate::output::{OutputWriter, Render};

/// GLib variable listing log domains with debug output enabled.
const G_MESSAGES_DEBUG: &str = "G_MESSAGES_DEBUG";

/// Execute the `run` command.
pub async fn execute(
    args: RunArgs,
    mut config: HarnessConfig,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    if args.save_logs {
        config.logs.save = true;
    }

    let requests = wait_requests(&args);
    let hold = args.hold;
    let builder = SessionBuilder::new(&args.source_dir, &args.build_dir)
        .config(&config)
        .envs(child_overrides(&args));

    info!(
        source_dir = %args.source_dir.display(),
        build_dir = %args.build_dir.display(),
        expectations = requests.len(),
        hold,
        "starting session"
    );

    let stop = Arc::new(AtomicBool::new(false));
    if hold {
        let stop = Arc::clone(&stop);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("received Ctrl+C, tearing down");
                stop.store(true, Ordering::SeqCst);
            }
        });
    }

    let (result, met) = tokio::task::spawn_blocking(move || {
        let mut met = 0;
        let result = Scenario::new(builder)
            .run(|session| run_body(session, &requests, hold, &stop, &mut met));
        (result, met)
    })
    .await
    .map_err(|e| CliError::Command(format!("session task failed: {e}")))?;

    match result {
        Ok(output) => {
            writer.render(&RunReport::new(&output.report, met, None))?;
            Ok(())
        }
        Err(err) => {
            if let Some(report) = err.report() {
                writer.render(&RunReport::new(report, met, Some(err.to_string())))?;
            }
            Err(err.into())
        }
    }
}

/// Child environment overrides: `--debug-domain` first, then `--env` (which wins).
fn child_overrides(args: &RunArgs) -> BTreeMap<String, String> {
    let mut overrides = BTreeMap::new();
    if !args.debug_domains.is_empty() {
        overrides.insert(G_MESSAGES_DEBUG.to_owned(), args.debug_domains.join(" "));
    }
    overrides.extend(args.env.iter().cloned());
    overrides
}

/// One wait per expected marker, in command-line order (stdout first).
///
/// Markers may already have been printed while the session was starting,
/// so existing output counts.
fn wait_requests(args: &RunArgs) -> Vec<WaitRequest> {
    let stdout = args
        .expect_stdout
        .iter()
        .map(|marker| WaitRequest::new().stdout(marker.as_str()));
    let stderr = args
        .expect_stderr
        .iter()
        .map(|marker| WaitRequest::new().stderr(marker.as_str()));

    stdout
        .chain(stderr)
        .map(|request| {
            let request = request.ignore_already_present();
            match args.timeout {
                Some(secs) => request.timeout_secs(secs),
                None => request,
            }
        })
        .collect()
}

/// Scenario body: check every expectation, then optionally hold.
///
/// `met` counts expectations as they pass, so it is accurate even when a
/// later one fails.
fn run_body(
    session: &mut Session,
    requests: &[WaitRequest],
    hold: bool,
    stop: &AtomicBool,
    met: &mut usize,
) -> Result<(), SessionError> {
    for request in requests {
        let outcome = session.expect_output(request)?;
        *met += 1;
        info!(%outcome, stdout = ?request.stdout, stderr = ?request.stderr, "expectation met");
    }

    if hold {
        info!(
            pid = ?session.pid(),
            socket = %session.socket_path().display(),
            "holding session, press Ctrl+C to stop"
        );
        let interval = session.config().poll_interval();
        while !stop.load(Ordering::SeqCst) {
            if let Some(exit) = session.poll()? {
                warn!(%exit, "child exited while held");
                break;
            }
            std::thread::sleep(interval);
        }
    }

    Ok(())
}

/// Rendered outcome of a `run`.
#[derive(Serialize)]
pub struct RunReport {
    /// Whether the run passed every check
    pub passed: bool,
    /// Exit status label (`0`, `signal 15`, `none`)
    pub exit: String,
    pub clean: bool,
    pub forced: bool,
    /// Expectations that were met
    pub expectations_met: usize,
    pub critical_lines: Vec<String>,
    pub warning_lines: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub saved_logs: Option<SavedLogs>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RunReport {
    pub fn new(report: &TeardownReport, expectations_met: usize, error: Option<String>) -> Self {
        let owned = |lines: Vec<&str>| lines.into_iter().map(str::to_owned).collect();
        Self {
            passed: error.is_none(),
            exit: report.exit_label(),
            clean: report.is_clean(),
            forced: report.forced,
            expectations_met,
            critical_lines: owned(report.critical_lines()),
            warning_lines: owned(report.warning_lines()),
            saved_logs: report.saved_logs.clone(),
            error,
        }
    }
}

impl Render for RunReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        let verdict = if self.passed {
            "PASSED".green().bold()
        } else {
            "FAILED".red().bold()
        };
        writeln!(w, "Session: {}", verdict)?;
        writeln!(w, "  Exit status: {}", self.exit)?;
        writeln!(
            w,
            "  Teardown: {}{}",
            if self.clean { "clean" } else { "unclean" },
            if self.forced { " (killed)" } else { "" }
        )?;
        writeln!(w, "  Expectations met: {}", self.expectations_met)?;

        if !self.critical_lines.is_empty() {
            writeln!(w, "  Critical lines:")?;
            for line in &self.critical_lines {
                writeln!(w, "    {}", line.red())?;
            }
        }
        if !self.warning_lines.is_empty() {
            writeln!(w, "  Warning lines:")?;
            for line in &self.warning_lines {
                writeln!(w, "    {}", line.yellow())?;
            }
        }
        if let Some(ref logs) = self.saved_logs {
            writeln!(w, "  Logs: {}, {}", logs.stdout.display(), logs.stderr.display())?;
        }
        if let Some(ref error) = self.error {
            writeln!(w, "  Error: {}", error.red())?;
        }

        Ok(())
    }
}
