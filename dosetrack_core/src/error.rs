//! Error types for the dosetrack_core library.

use std::io;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for dosetrack_core operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// IO error occurred
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Configuration validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Fraction with a non-positive denominator, unparseable text, or a
    /// result outside the `i64` range
    #[error("Invalid fraction: {0}")]
    InvalidFraction(String),

    #[error("Division by zero")]
    DivisionByZero,

    /// Malformed time of day
    #[error("Invalid time of day: {0}")]
    InvalidDayTime(String),

    /// Repeat rule argument out of range (e.g. every-N-days with n < 2)
    #[error("Invalid repeat argument: {0}")]
    InvalidRepeatArgument(String),

    /// The dose-time windows cannot place a moment
    #[error("Unattributable moment: {0}")]
    UnattributableMoment(String),

    /// Backfill requested before the last processed date was initialized
    #[error("Medication {0} has no last processed date")]
    MissingLastProcessedDate(String),

    /// Medication lookup failed
    #[error("Unknown medication: {0}")]
    UnknownMedication(String),

    /// Failure reported by a store collaborator
    #[error("Store error: {0}")]
    Store(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Whether retrying the same call may succeed.
    ///
    /// Only collaborator I/O failures are transient. Everything else is a
    /// caller or configuration bug and must be surfaced immediately.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Io(_) | Error::Store(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_io_and_store_are_retryable() {
        let io_err = Error::Io(io::Error::new(io::ErrorKind::Other, "disk"));
        assert!(io_err.is_retryable());
        assert!(Error::Store("locked".into()).is_retryable());

        assert!(!Error::DivisionByZero.is_retryable());
        assert!(!Error::InvalidFraction("1/0".into()).is_retryable());
        assert!(!Error::MissingLastProcessedDate("abc".into()).is_retryable());
        assert!(!Error::UnattributableMoment("gap".into()).is_retryable());
    }
}
