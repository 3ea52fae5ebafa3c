//! CLI error type.

use std::fmt;

use sentinel_mirror::batch::BatchError;
use sentinel_mirror::client::ClientError;
use sentinel_mirror::config::ConfigError;
use sentinel_mirror::ledger::LedgerError;
use sentinel_mirror::logging::LoggingError;

/// Errors that stop a command before any request runs.
#[derive(Debug)]
pub enum CliError {
    Config(ConfigError),
    Logging(LoggingError),
    Requests(BatchError),
    /// The hub rejected the credentials or could not be reached.
    Hub(ClientError),
    Ledger(LedgerError),
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::Config(e) => write!(f, "{}", e),
            CliError::Logging(e) => write!(f, "{}", e),
            CliError::Requests(e) => write!(f, "{}", e),
            CliError::Hub(ClientError::Unauthorized) => write!(
                f,
                "hub rejected the credentials; check [hub] username and password"
            ),
            CliError::Hub(e) => write!(f, "hub unavailable: {}", e),
            CliError::Ledger(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for CliError {}

impl From<ConfigError> for CliError {
    fn from(e: ConfigError) -> Self {
        CliError::Config(e)
    }
}

impl From<LoggingError> for CliError {
    fn from(e: LoggingError) -> Self {
        CliError::Logging(e)
    }
}

impl From<BatchError> for CliError {
    fn from(e: BatchError) -> Self {
        CliError::Requests(e)
    }
}

impl From<ClientError> for CliError {
    fn from(e: ClientError) -> Self {
        CliError::Hub(e)
    }
}

impl From<LedgerError> for CliError {
    fn from(e: LedgerError) -> Self {
        CliError::Ledger(e)
    }
}
