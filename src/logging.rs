//! Process-wide log setup.
//!
//! [`init`] installs the subscriber exactly once. Keep the returned
//! [`LogGuard`] alive until shutdown; dropping it flushes pending lines.

use std::fs::OpenOptions;
use std::io;

use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::EnvFilter;

use crate::config::LoggingConf;
use crate::error::VaultBackupError;

/// Flushes buffered log lines when dropped.
#[must_use = "dropping the guard stops log output"]
#[derive(Debug)]
pub struct LogGuard {
    _inner: WorkerGuard,
}

/// `RUST_LOG` when set, otherwise the configured level.
pub fn env_filter(conf: &LoggingConf) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&conf.level))
}

fn create_writer(conf: &LoggingConf) -> Result<(NonBlocking, WorkerGuard), VaultBackupError> {
    match &conf.file {
        None => Ok(tracing_appender::non_blocking(io::stdout())),
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent).map_err(|e| {
                    VaultBackupError::Logging(format!("{}: {}", parent.display(), e))
                })?;
            }
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|e| VaultBackupError::Logging(format!("{}: {}", path.display(), e)))?;
            Ok(tracing_appender::non_blocking(file))
        }
    }
}

/// Install the global subscriber.
pub fn init(conf: &LoggingConf) -> Result<LogGuard, VaultBackupError> {
    let (writer, guard) = create_writer(conf)?;
    tracing_subscriber::fmt()
        .with_env_filter(env_filter(conf))
        .with_ansi(conf.file.is_none())
        .with_target(false)
        .with_writer(writer)
        .try_init()
        .map_err(|e| VaultBackupError::Logging(e.to_string()))?;
    Ok(LogGuard { _inner: guard })
}
