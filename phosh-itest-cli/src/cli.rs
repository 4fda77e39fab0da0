//! CLI argument parsing using clap derive API
//!
//! This module defines the command-line interface structure using clap's derive macros.
//! It is purely declarative with no side effects or I/O.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

/// phosh-itest -- run a nested phosh session and check its logs.
///
/// Use `phosh-itest <COMMAND> --help` for subcommand details.
#[derive(Parser, Debug)]
#[command(name = "phosh-itest", version, about, long_about = None)]
pub struct Cli {
    /// Path to the phosh-itest.toml configuration file.
    #[arg(short, long, default_value = "phosh-itest.toml")]
    pub config: PathBuf,

    /// Override log level (trace, debug, info, warn, error).
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Output format.
    #[arg(long, global = true, default_value = "text")]
    pub output: OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Supported output formats.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output.
    Text,
    /// Machine-readable JSON.
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Spawn a nested session, wait for expected output, tear it down.
    Run(RunArgs),

    /// Manage configuration.
    Config(ConfigArgs),
}

// ---- run ----

/// Run one nested compositor session.
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Source tree (compositor config is resolved relative to it).
    #[arg(long, env = "TOPSRCDIR")]
    pub source_dir: PathBuf,

    /// Build tree (launcher script and work directory live here).
    #[arg(long, env = "TOPBUILDDIR")]
    pub build_dir: PathBuf,

    /// Extra environment for the child, highest precedence.
    #[arg(short, long = "env", value_name = "KEY=VALUE", value_parser = parse_key_val)]
    pub env: Vec<(String, String)>,

    /// GLib log domain to enable debug output for (repeatable).
    #[arg(short = 'd', long = "debug-domain", value_name = "DOMAIN")]
    pub debug_domains: Vec<String>,

    /// Substring that must appear on the child's stdout (repeatable).
    #[arg(long, value_name = "TEXT")]
    pub expect_stdout: Vec<String>,

    /// Substring that must appear on the child's stderr (repeatable).
    #[arg(long, value_name = "TEXT")]
    pub expect_stderr: Vec<String>,

    /// Seconds to wait for each expectation (default: session.wait_timeout_secs).
    #[arg(short, long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Keep the session running until Ctrl+C or until the child exits.
    #[arg(long)]
    pub hold: bool,

    /// Write log.stdout / log.stderr at teardown.
    #[arg(long)]
    pub save_logs: bool,
}

/// Parse a `KEY=VALUE` pair.
fn parse_key_val(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_owned(), value.to_owned())),
        _ => Err(format!("expected KEY=VALUE, got '{s}'")),
    }
}

// ---- config ----

/// Manage phosh-itest configuration.
#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Validate the configuration file and report errors.
    Validate,
    /// Show the effective configuration (file + env overrides + defaults).
    Show {
        /// Show only a specific section (general, session, logs).
        #[arg(long)]
        section: Option<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    fn parse_run(args: &[&str]) -> RunArgs {
        let mut argv = vec!["phosh-itest", "run", "--source-dir", "/src", "--build-dir", "/build"];
        argv.extend_from_slice(args);
        let cli = Cli::try_parse_from(argv).expect("parse succeeded");
        match cli.command {
            Commands::Run(run_args) => run_args,
            _ => panic!("expected Run command"),
        }
    }

    #[test]
    fn test_cli_parse_run_defaults() {
        let run = parse_run(&[]);
        assert_eq!(run.source_dir, PathBuf::from("/src"));
        assert_eq!(run.build_dir, PathBuf::from("/build"));
        assert!(run.env.is_empty());
        assert!(run.expect_stdout.is_empty());
        assert!(run.timeout.is_none());
        assert!(!run.hold, "hold should default to false");
        assert!(!run.save_logs);
    }

    #[test]
    fn test_cli_parse_run_env_pairs() {
        let run = parse_run(&[
            "--env",
            "XDG_CURRENT_DESKTOP=Phosh:GNOME",
            "-e",
            "EMPTY=",
        ]);
        assert_eq!(
            run.env,
            vec![
                ("XDG_CURRENT_DESKTOP".to_owned(), "Phosh:GNOME".to_owned()),
                ("EMPTY".to_owned(), String::new()),
            ]
        );
    }

    #[test]
    fn test_cli_parse_run_env_rejects_missing_equals() {
        let args = Cli::try_parse_from([
            "phosh-itest",
            "run",
            "--source-dir",
            "/src",
            "--build-dir",
            "/build",
            "--env",
            "NOVALUE",
        ]);
        assert!(args.is_err(), "should fail on malformed KEY=VALUE");
    }

    #[test]
    fn test_cli_parse_run_expectations_and_domains() {
        let run = parse_run(&[
            "-d",
            "phosh-wwan-mm",
            "--debug-domain",
            "phosh-cell-broadcast-manager",
            "--expect-stdout",
            "Modem is present",
            "--expect-stderr",
            "Cellbroadcast message received",
            "--timeout",
            "10",
            "--hold",
        ]);
        assert_eq!(
            run.debug_domains,
            vec!["phosh-wwan-mm", "phosh-cell-broadcast-manager"]
        );
        assert_eq!(run.expect_stdout, vec!["Modem is present"]);
        assert_eq!(run.expect_stderr, vec!["Cellbroadcast message received"]);
        assert_eq!(run.timeout, Some(10));
        assert!(run.hold);
    }

    #[test]
    fn test_cli_parse_config_validate() {
        let cli = Cli::try_parse_from(["phosh-itest", "config", "validate"]).expect("parse succeeded");
        match cli.command {
            Commands::Config(config_args) => match config_args.action {
                ConfigAction::Validate => {}
                _ => panic!("expected Validate action"),
            },
            _ => panic!("expected Config command"),
        }
    }

    #[test]
    fn test_cli_parse_config_show_section() {
        let cli = Cli::try_parse_from(["phosh-itest", "config", "show", "--section", "session"])
            .expect("parse succeeded");
        match cli.command {
            Commands::Config(config_args) => match config_args.action {
                ConfigAction::Show { section } => {
                    assert_eq!(section, Some("session".to_owned()));
                }
                _ => panic!("expected Show action"),
            },
            _ => panic!("expected Config command"),
        }
    }

    #[test]
    fn test_cli_parse_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "phosh-itest",
            "-c",
            "/custom/phosh-itest.toml",
            "config",
            "show",
            "--output",
            "json",
            "--log-level",
            "debug",
        ])
        .expect("parse succeeded");
        assert_eq!(cli.config, PathBuf::from("/custom/phosh-itest.toml"));
        assert_eq!(cli.log_level, Some("debug".to_owned()));
        assert!(matches!(cli.output, OutputFormat::Json));
    }

    #[test]
    fn test_cli_parse_missing_command_fails() {
        let args = Cli::try_parse_from(["phosh-itest"]);
        assert!(args.is_err(), "should fail when no command provided");
    }

    #[test]
    fn test_cli_verify_command_structure() {
        let cmd = Cli::command();
        assert_eq!(cmd.get_name(), "phosh-itest");
        cmd.clone().debug_assert();

        let subcommands: Vec<_> = cmd.get_subcommands().map(|s| s.get_name()).collect();
        assert!(subcommands.contains(&"run"), "should have 'run' subcommand");
        assert!(
            subcommands.contains(&"config"),
            "should have 'config' subcommand"
        );
    }

    #[test]
    fn test_parse_key_val_keeps_later_equals() {
        assert_eq!(
            parse_key_val("G_MESSAGES_DEBUG=a=b").expect("valid pair"),
            ("G_MESSAGES_DEBUG".to_owned(), "a=b".to_owned())
        );
        assert!(parse_key_val("=value").is_err());
    }
}
