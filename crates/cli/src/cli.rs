//! CLI argument definitions using clap.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// tablecast - trigger-based change capture with per-channel fan-out
#[derive(Parser, Debug)]
#[command(
    name = "tablecast",
    author,
    version,
    about = "Postgres change-capture listener with concurrent channel fan-out",
    long_about = "Captures row changes on monitored Postgres tables through triggers,\n\
                  polls the durable event table and fans every event out to the\n\
                  channels configured for its table, marking it delivered afterwards."
)]
pub struct Cli {
    /// Increase logging verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true, env = "TABLECAST_VERBOSE")]
    pub verbose: u8,

    /// Suppress all output except warnings and errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Log output format
    #[arg(
        long,
        value_enum,
        default_value = "pretty",
        global = true,
        env = "TABLECAST_LOG_FORMAT"
    )]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Install triggers and run the listener until interrupted
    Run(RunArgs),

    /// Install the event table, capture function and triggers, then exit
    Install(InstallArgs),

    /// Validate a manifest without touching the database
    Validate(ValidateArgs),

    /// Display manifest information
    Info(InfoArgs),
}

/// Arguments for the `run` command
#[derive(Parser, Debug, Clone)]
pub struct RunArgs {
    /// Path to the manifest (TOML or JSON)
    #[arg(
        short,
        long,
        default_value = "tablecast.toml",
        env = "TABLECAST_CONFIG"
    )]
    pub config: PathBuf,

    /// Override the source connection string
    #[arg(long, env = "TABLECAST_DSN", hide_env_values = true)]
    pub dsn: Option<String>,

    /// Override the idle poll interval (milliseconds)
    #[arg(long, env = "TABLECAST_POLL_INTERVAL_MS")]
    pub poll_interval_ms: Option<u64>,

    /// Override the max events fetched per poll
    #[arg(long, env = "TABLECAST_POLL_LIMIT")]
    pub poll_limit: Option<u32>,

    /// Metrics server port (0 = disabled)
    #[arg(long, default_value = "9000", env = "TABLECAST_METRICS_PORT")]
    pub metrics_port: u16,

    /// Validate the manifest and exit without connecting
    #[arg(long)]
    pub dry_run: bool,
}

/// Arguments for the `install` command
#[derive(Parser, Debug)]
pub struct InstallArgs {
    /// Path to the manifest (TOML or JSON)
    #[arg(
        short,
        long,
        default_value = "tablecast.toml",
        env = "TABLECAST_CONFIG"
    )]
    pub config: PathBuf,

    /// Override the source connection string
    #[arg(long, env = "TABLECAST_DSN", hide_env_values = true)]
    pub dsn: Option<String>,
}

/// Arguments for the `validate` command
#[derive(Parser, Debug)]
pub struct ValidateArgs {
    /// Path to the manifest to validate
    #[arg(short, long, default_value = "tablecast.toml")]
    pub config: PathBuf,

    /// Output validation result as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `info` command
#[derive(Parser, Debug)]
pub struct InfoArgs {
    /// Path to the manifest
    #[arg(short, long, default_value = "tablecast.toml")]
    pub config: PathBuf,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

/// Log output format
#[derive(ValueEnum, Clone, Debug, Default)]
pub enum LogFormat {
    /// JSON structured logging
    Json,
    /// Human-readable pretty format
    #[default]
    Pretty,
    /// Compact single-line format
    Compact,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_overrides_parse() {
        let cli = Cli::try_parse_from([
            "tablecast",
            "-v",
            "run",
            "-c",
            "manifest.json",
            "--dsn",
            "postgres://localhost/app",
            "--poll-limit",
            "10",
            "--metrics-port",
            "0",
        ])
        .unwrap();

        assert_eq!(cli.verbose, 1);
        match cli.command {
            Commands::Run(args) => {
                assert_eq!(args.config, PathBuf::from("manifest.json"));
                assert_eq!(args.dsn.as_deref(), Some("postgres://localhost/app"));
                assert_eq!(args.poll_limit, Some(10));
                assert_eq!(args.metrics_port, 0);
                assert!(!args.dry_run);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_quiet_conflicts_with_verbose() {
        assert!(Cli::try_parse_from(["tablecast", "-q", "-v", "validate"]).is_err());
    }
}
