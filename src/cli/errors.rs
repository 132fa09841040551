//! Failures of a CLI invocation
//!
//! Store failures keep the underlying [`StoreError`] so its external name
//! and code survive into the message printed on stderr.

use std::fmt;
use std::io;

use crate::errors::StoreError;

/// Why a command did not run to completion
#[derive(Debug)]
pub enum CliError {
    /// Config file unreadable or invalid
    Config(String),
    /// Reading or writing a file or stdout failed
    Io(String),
    /// Command arguments or input files are malformed
    InvalidInput(String),
    /// The store rejected the operation
    Store(StoreError),
}

impl CliError {
    /// Stable `KV_CLI_*` code
    pub fn code(&self) -> &'static str {
        match self {
            CliError::Config(_) => "KV_CLI_CONFIG_ERROR",
            CliError::Io(_) => "KV_CLI_IO_ERROR",
            CliError::InvalidInput(_) => "KV_CLI_INVALID_INPUT",
            CliError::Store(_) => "KV_CLI_STORE_FAILED",
        }
    }

    /// Human-readable detail, without the code
    pub fn message(&self) -> String {
        match self {
            CliError::Config(msg) | CliError::Io(msg) | CliError::InvalidInput(msg) => msg.clone(),
            CliError::Store(e) => format!("{} ({}): {}", e.name(), e.code().code(), e),
        }
    }

    /// Process exit status: 2 for bad input, 1 for everything else
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Config(_) | CliError::InvalidInput(_) => 2,
            CliError::Io(_) | CliError::Store(_) => 1,
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code(), self.message())
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CliError::Store(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for CliError {
    fn from(e: io::Error) -> Self {
        CliError::Io(e.to_string())
    }
}

impl From<serde_json::Error> for CliError {
    fn from(e: serde_json::Error) -> Self {
        CliError::Io(format!("cannot encode output: {}", e))
    }
}

impl From<StoreError> for CliError {
    fn from(e: StoreError) -> Self {
        CliError::Store(e)
    }
}

pub type CliResult<T> = Result<T, CliError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_error_keeps_name() {
        let err: CliError = StoreError::recovery("k", "no valid backups available").into();
        assert_eq!(err.code(), "KV_CLI_STORE_FAILED");
        assert!(err.message().starts_with("RecoveryError (KV_RECOVERY)"));
        assert!(err.to_string().starts_with("KV_CLI_STORE_FAILED: "));
        assert_eq!(err.exit_code(), 1);
    }

    #[test]
    fn test_bad_input_exits_with_two() {
        assert_eq!(CliError::InvalidInput("x".into()).exit_code(), 2);
        assert_eq!(CliError::Config("x".into()).exit_code(), 2);
    }
}
