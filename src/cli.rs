// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::config::duration::parse_duration;

/// Command-line arguments for `runq`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "runq",
    version,
    about = "Schedule queued executions across a fleet of worker processes.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (TOML).
    ///
    /// Default: `RUNQ_CONFIG`, or `Runq.toml` in the current working directory.
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `RUNQ_LOG` or a default level will be used.
    #[arg(long, global = true, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Run the scheduler, the periodic jobs and a local runner.
    Serve(ServeArgs),
    /// Create a liveaction and put it on the queue.
    Enqueue(EnqueueArgs),
}

#[derive(Debug, Clone, Args)]
pub struct ServeArgs {
    /// Exit once the queue is drained and nothing is running.
    #[arg(long)]
    pub once: bool,

    /// Parse + validate, print the effective configuration, run nothing.
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Debug, Clone, Args)]
pub struct EnqueueArgs {
    /// Action reference the execution belongs to (policies key on it).
    #[arg(long, value_name = "REF")]
    pub action: String,

    /// Shell command the local runner executes.
    #[arg(long, value_name = "CMD")]
    pub cmd: String,

    /// Higher runs first.
    #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
    pub priority: i32,

    /// Wait before the execution becomes eligible, e.g. `500ms`, `10s`.
    #[arg(long, value_name = "DUR", value_parser = parse_duration)]
    pub delay: Option<Duration>,

    /// Opaque routing hint.
    #[arg(long, value_name = "S")]
    pub affinity: Option<String>,

    /// Kill the command after this many seconds.
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
