//! Logging setup using tracing.
//!
//! The service writes JSON lines to a daily-rolling file (one object per event, with the active
//! `dispatch` span fields attached) and human-readable output to stderr.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub const DEFAULT_FILTER: &str = "info,chatops=debug";

/// Overrides the platform data directory for log files.
pub const LOG_DIR_ENV: &str = "CHATOPS_LOG_DIR";

const LOG_FILE_PREFIX: &str = "chatops.log";

fn filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// File plus console logging for the long-running service.
///
/// Keep the returned guard alive for the process lifetime; dropping it flushes the file writer.
pub fn init() -> Result<(WorkerGuard, PathBuf)> {
    let override_dir = std::env::var_os(LOG_DIR_ENV).map(PathBuf::from);
    let log_dir = resolve_log_dir(override_dir.as_deref())?;
    std::fs::create_dir_all(&log_dir)
        .with_context(|| format!("Could not create log directory {}", log_dir.display()))?;

    let (writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::daily(&log_dir, LOG_FILE_PREFIX));

    let file_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(false)
        .with_writer(writer)
        .with_ansi(false);

    let console_layer = fmt::layer().with_writer(std::io::stderr).with_target(false);

    tracing_subscriber::registry()
        .with(filter())
        .with(file_layer)
        .with(console_layer)
        .try_init()?;

    tracing::debug!("Writing logs to {}", log_dir.display());
    Ok((guard, log_dir))
}

/// Console-only logging, for one-shot CLI commands and when no log directory is usable.
pub fn init_console() {
    let _ = tracing_subscriber::registry()
        .with(filter())
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .try_init();
}

/// `CHATOPS_LOG_DIR` when set, otherwise `<data dir>/logs`.
fn resolve_log_dir(override_dir: Option<&Path>) -> Result<PathBuf> {
    if let Some(dir) = override_dir {
        return Ok(dir.to_path_buf());
    }
    let dirs = directories::ProjectDirs::from("com", "chatops", "chatops")
        .context("Could not determine a data directory for log files")?;
    Ok(dirs.data_dir().join("logs"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_override_wins() {
        let dir = resolve_log_dir(Some(Path::new("/var/log/chatops"))).unwrap();
        assert_eq!(dir, PathBuf::from("/var/log/chatops"));
    }

    #[test]
    fn test_default_filter_parses() {
        assert!(EnvFilter::try_new(DEFAULT_FILTER).is_ok());
    }
}
