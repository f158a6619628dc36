//! Status codes shared by every part of the executor.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Outcome of a stage, an error handler or a whole pipeline run.
///
/// Codes are assigned explicitly where a class of failure is detected and are
/// serialized as their numeric value, which is also what stage programs use
/// as their process exit status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "i32", try_from = "i32")]
pub enum StatusCode {
    /// The process worked without errors.
    Ok,
    /// Invalid input parameters (e.g. a malformed month or year).
    InvalidParameters,
    /// Local system failure such as an I/O error.
    SystemError,
    /// Connection problems like timeouts or unavailable services.
    ConnectionError,
    /// The requested data could not be found.
    DataUnavailable,
    /// A file was invalid or data could not be extracted from it.
    InvalidFile,
    /// Something unexpected happened.
    Unknown,
    /// Stage or pipeline setup failed (fetching sources, creating volumes).
    SetupError,
    /// Building the stage image failed.
    BuildError,
    /// Running the stage image failed.
    RunError,
    /// The error handler stage failed.
    ErrorHandlerError,
    /// Cleaning up after a stage or pipeline failed.
    TeardownError,
}

impl Default for StatusCode {
    fn default() -> Self {
        Self::Ok
    }
}

impl StatusCode {
    /// Every status code, in numeric order.
    pub const ALL: [Self; 12] = [
        Self::Ok,
        Self::InvalidParameters,
        Self::SystemError,
        Self::ConnectionError,
        Self::DataUnavailable,
        Self::InvalidFile,
        Self::Unknown,
        Self::SetupError,
        Self::BuildError,
        Self::RunError,
        Self::ErrorHandlerError,
        Self::TeardownError,
    ];

    /// Returns the numeric code.
    #[must_use]
    pub const fn code(self) -> i32 {
        match self {
            Self::Ok => 0,
            Self::InvalidParameters => 1,
            Self::SystemError => 2,
            Self::ConnectionError => 3,
            Self::DataUnavailable => 4,
            Self::InvalidFile => 5,
            Self::Unknown => 6,
            Self::SetupError => 7,
            Self::BuildError => 8,
            Self::RunError => 9,
            Self::ErrorHandlerError => 10,
            Self::TeardownError => 11,
        }
    }

    /// Maps a numeric code back to a status, falling back to `Unknown`.
    #[must_use]
    pub fn from_code(code: i32) -> Self {
        Self::try_from(code).unwrap_or(Self::Unknown)
    }

    /// Human readable text for the status.
    #[must_use]
    pub const fn text(self) -> &'static str {
        match self {
            Self::Ok => "OK",
            Self::InvalidParameters => "Invalid Parameters",
            Self::SystemError => "System Error",
            Self::ConnectionError => "Connection Error",
            Self::DataUnavailable => "Data Unavailable",
            Self::InvalidFile => "Invalid File",
            Self::Unknown => "Unknown",
            Self::SetupError => "Setup Error",
            Self::BuildError => "Build Error",
            Self::RunError => "Run Error",
            Self::ErrorHandlerError => "Error Handler Error",
            Self::TeardownError => "Teardown Error",
        }
    }

    /// Returns true for `Ok`.
    #[must_use]
    pub const fn is_ok(self) -> bool {
        matches!(self, Self::Ok)
    }

    /// Returns true for any code other than `Ok`.
    #[must_use]
    pub const fn is_failure(self) -> bool {
        !self.is_ok()
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.text())
    }
}

impl From<StatusCode> for i32 {
    fn from(status: StatusCode) -> Self {
        status.code()
    }
}

/// Error returned when a numeric code is not part of the taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Unknown status code: {0}")]
pub struct UnknownStatusCode(pub i32);

impl TryFrom<i32> for StatusCode {
    type Error = UnknownStatusCode;

    fn try_from(code: i32) -> Result<Self, Self::Error> {
        Self::ALL
            .iter()
            .copied()
            .find(|status| status.code() == code)
            .ok_or(UnknownStatusCode(code))
    }
}

/// An error tagged with the status code a stage program should exit with.
///
/// Stage programs built on this crate wrap their failures in a `StatusError`
/// so that the executor sees a meaningful exit status.
#[derive(Debug, Error)]
#[error("{status}: {source}")]
pub struct StatusError {
    /// The status to report.
    pub status: StatusCode,
    /// The underlying failure.
    #[source]
    pub source: Box<dyn std::error::Error + Send + Sync>,
}

impl StatusError {
    /// Creates a new status error.
    pub fn new(
        status: StatusCode,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self {
            status,
            source: source.into(),
        }
    }

    /// The process exit status for this error.
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        self.status.code()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_codes_are_unique_and_round_trip() {
        for status in StatusCode::ALL {
            assert_eq!(StatusCode::try_from(status.code()), Ok(status));
        }
        let codes: HashSet<i32> = StatusCode::ALL.iter().map(|s| s.code()).collect();
        assert_eq!(codes.len(), StatusCode::ALL.len());
    }

    #[test]
    fn test_historical_numeric_values() {
        assert_eq!(StatusCode::Ok.code(), 0);
        assert_eq!(StatusCode::Unknown.code(), 6);
        assert_eq!(StatusCode::SetupError.code(), 7);
        assert_eq!(StatusCode::BuildError.code(), 8);
        assert_eq!(StatusCode::RunError.code(), 9);
        assert_eq!(StatusCode::ErrorHandlerError.code(), 10);
    }

    #[test]
    fn test_unknown_code() {
        assert_eq!(StatusCode::try_from(99), Err(UnknownStatusCode(99)));
        assert_eq!(StatusCode::from_code(99), StatusCode::Unknown);
        assert_eq!(StatusCode::from_code(8), StatusCode::BuildError);
    }

    #[test]
    fn test_display() {
        assert_eq!(StatusCode::Ok.to_string(), "OK");
        assert_eq!(StatusCode::BuildError.to_string(), "Build Error");
        assert_eq!(StatusCode::InvalidParameters.to_string(), "Invalid Parameters");
    }

    #[test]
    fn test_serializes_as_number() {
        let json = serde_json::to_string(&StatusCode::RunError).unwrap();
        assert_eq!(json, "9");
        let parsed: StatusCode = serde_json::from_str("11").unwrap();
        assert_eq!(parsed, StatusCode::TeardownError);
        assert!(serde_json::from_str::<StatusCode>("42").is_err());
    }

    #[test]
    fn test_status_error_exit_code() {
        let err = StatusError::new(StatusCode::DataUnavailable, "no rows for 2020/04");
        assert_eq!(err.exit_code(), 4);
        assert!(err.to_string().contains("Data Unavailable"));
        assert!(err.to_string().contains("no rows"));
    }

    #[test]
    fn test_failure_predicates() {
        assert!(StatusCode::Ok.is_ok());
        assert!(!StatusCode::Ok.is_failure());
        assert!(StatusCode::TeardownError.is_failure());
    }
}
