//! Tracing subscriber setup.
//!
//! Log lines go to stderr and to a daily-rotated file under the configured
//! log directory. `RUST_LOG` overrides the configured level.

use std::fs;
use std::path::PathBuf;

use thiserror::Error;
use time::format_description::well_known::Rfc3339;
use time::UtcOffset;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling;
use tracing_subscriber::fmt::time::OffsetTime;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

/// File name prefix of the rotated log files.
const LOG_FILE_PREFIX: &str = "sentinel-mirror.log";

/// `[logging]` configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    /// Directory holding the rotated log files.
    pub directory: PathBuf,
    /// Default filter directive, e.g. `info` or `sentinel_mirror=debug`.
    pub level: String,
}

/// Errors raised while installing the subscriber.
#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("failed to create log directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid log level '{0}'")]
    InvalidLevel(String),

    #[error("failed to install log subscriber: {0}")]
    Init(String),
}

fn build_filter(env_directives: Option<&str>, level: &str) -> Result<EnvFilter, LoggingError> {
    if let Some(filter) = env_directives.and_then(|raw| EnvFilter::try_new(raw).ok()) {
        return Ok(filter);
    }
    EnvFilter::try_new(level).map_err(|_| LoggingError::InvalidLevel(level.to_string()))
}

/// Install the global subscriber.
///
/// The returned guard flushes the file writer on drop and must be held for
/// the lifetime of the program.
pub fn init(config: &LoggingConfig) -> Result<WorkerGuard, LoggingError> {
    fs::create_dir_all(&config.directory).map_err(|source| LoggingError::CreateDir {
        path: config.directory.clone(),
        source,
    })?;

    // Must be read before any thread is spawned.
    let offset = UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC);
    let timer = OffsetTime::new(offset, Rfc3339);
    let env_directives = std::env::var(EnvFilter::DEFAULT_ENV).ok();

    let (file_writer, guard) =
        tracing_appender::non_blocking(rolling::daily(&config.directory, LOG_FILE_PREFIX));

    tracing_subscriber::registry()
        .with(build_filter(env_directives.as_deref(), &config.level)?)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_timer(timer.clone())
                .with_target(false),
        )
        .with(
            fmt::layer()
                .with_writer(file_writer)
                .with_timer(timer)
                .with_ansi(false),
        )
        .try_init()
        .map_err(|e| LoggingError::Init(e.to_string()))?;

    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configured_level_is_used() {
        assert!(build_filter(None, "info").is_ok());
        assert!(build_filter(None, "sentinel_mirror=debug,warn").is_ok());
    }

    #[test]
    fn test_env_directives_override_level() {
        // An invalid configured level does not matter when RUST_LOG is usable
        assert!(build_filter(Some("debug"), "sentinel_mirror=loud").is_ok());
    }

    #[test]
    fn test_invalid_level_is_reported() {
        let err = build_filter(None, "sentinel_mirror=loud").unwrap_err();
        assert_eq!(err.to_string(), "invalid log level 'sentinel_mirror=loud'");
    }

    #[test]
    fn test_create_dir_error_names_path() {
        let err = LoggingError::CreateDir {
            path: PathBuf::from("/readonly/logs"),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        assert!(err.to_string().contains("/readonly/logs"));
    }
}
