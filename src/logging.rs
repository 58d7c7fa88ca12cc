// src/logging.rs

//! Logging setup for `runq` using `tracing` + `tracing-subscriber`.
//!
//! Priority for determining the log level:
//! 1. `--log-level` CLI flag (if provided)
//! 2. `RUNQ_LOG` environment variable (a level such as "debug", or a full
//!    filter directive such as "runq::scheduler=trace,info")
//! 3. default to `info`
//!
//! Logs go to STDERR; `--dry-run` output and command ids go to STDOUT.

use anyhow::Result;
use tracing_subscriber::{fmt, EnvFilter};

use crate::cli::LogLevel;

pub const LOG_ENV: &str = "RUNQ_LOG";

/// Initialise global logging subscriber.
///
/// Safe to call once at startup.
pub fn init_logging(cli_level: Option<LogLevel>) -> Result<()> {
    let filter = match cli_level {
        Some(lvl) => EnvFilter::new(level_from_log_level(lvl).to_string()),
        None => std::env::var(LOG_ENV)
            .ok()
            .and_then(|s| parse_filter(&s))
            .unwrap_or_else(|| EnvFilter::new("info")),
    };

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to install tracing subscriber: {e}"))?;

    Ok(())
}

fn level_from_log_level(lvl: LogLevel) -> tracing::Level {
    match lvl {
        LogLevel::Error => tracing::Level::ERROR,
        LogLevel::Warn => tracing::Level::WARN,
        LogLevel::Info => tracing::Level::INFO,
        LogLevel::Debug => tracing::Level::DEBUG,
        LogLevel::Trace => tracing::Level::TRACE,
    }
}

fn parse_filter(s: &str) -> Option<EnvFilter> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    match s.to_lowercase().as_str() {
        "warning" => Some(EnvFilter::new("warn")),
        other => EnvFilter::try_new(other).ok(),
    }
}
