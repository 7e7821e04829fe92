use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// Machine-readable failure class of a remote call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// The request never completed (connection refused, reset, ...).
    Transport,
    /// The call exceeded the configured request timeout.
    Timeout,
    /// The server refused the request (policy, constraint, bad input).
    Rejected,
    /// A single-row operation matched no row.
    NoRows,
    /// A conditional write lost to a concurrent writer.
    VersionConflict,
    /// The server answered with a row that does not decode.
    Malformed,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::Transport => "transport",
            ErrorCode::Timeout => "timeout",
            ErrorCode::Rejected => "rejected",
            ErrorCode::NoRows => "no_rows",
            ErrorCode::VersionConflict => "version_conflict",
            ErrorCode::Malformed => "malformed",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure of a remote store or change feed call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{code}: {message}")]
pub struct RemoteError {
    pub code: ErrorCode,
    pub message: String,
}

impl RemoteError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Transport, message)
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Rejected, message)
    }

    pub fn no_rows(table: &str, id: &str) -> Self {
        Self::new(ErrorCode::NoRows, format!("no {} row with id {}", table, id))
    }

    pub fn timeout(operation: &str, after: Duration) -> Self {
        Self::new(
            ErrorCode::Timeout,
            format!("{} did not complete within {:?}", operation, after),
        )
    }

    pub fn conflict(table: &str, id: &str, expected: u64, actual: u64) -> Self {
        Self::new(
            ErrorCode::VersionConflict,
            format!(
                "{}:{} changed underneath (expected version {}, actual {})",
                table, id, expected, actual
            ),
        )
    }

    /// Transport failures and timeouts may succeed on a second try.
    pub fn is_retryable(&self) -> bool {
        matches!(self.code, ErrorCode::Transport | ErrorCode::Timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_code() {
        let err = RemoteError::no_rows("clients", "c-9");
        assert_eq!(err.to_string(), "no_rows: no clients row with id c-9");
    }

    #[test]
    fn retryable_codes() {
        assert!(RemoteError::transport("reset").is_retryable());
        assert!(RemoteError::timeout("insert", Duration::from_millis(5)).is_retryable());
        assert!(!RemoteError::rejected("policy").is_retryable());
        assert!(!RemoteError::conflict("clients", "c-1", 1, 2).is_retryable());
    }
}
