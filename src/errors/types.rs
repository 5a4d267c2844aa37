//! Error type definitions for the curator
//!
//! This module defines the error hierarchy used throughout the pipeline.
//! Only [`AppError`] is ever returned from a pipeline run; the other types are
//! recovered inside their stage and surface as reported data.

use std::time::Duration;
use thiserror::Error;

/// Top-level application error type
///
/// These are the only failures that stop a run. Everything that can go wrong
/// with an individual source or stream is recovered inside its stage.
#[derive(Error, Debug)]
pub enum AppError {
    /// Required input missing or unreadable, or invalid settings
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Filesystem errors while writing outputs
    #[error("I/O error: {context} - {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    /// Tabular input could not be decoded
    #[error("CSV error in {path}: {source}")]
    Csv {
        path: String,
        #[source]
        source: csv::Error,
    },

    /// HTTP client construction errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Generic internal errors
    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// Failures while fetching or expanding a playlist source
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SourceError {
    /// Network or filesystem failure
    #[error("source unavailable: {address} - {reason}")]
    Unavailable { address: String, reason: String },

    /// The fetch did not complete within the configured timeout
    #[error("source timed out after {timeout}: {address}")]
    Timeout { address: String, timeout: String },

    /// Non-success HTTP status
    #[error("source returned HTTP {status}: {address}")]
    HttpStatus { address: String, status: u16 },

    /// Body could not be decoded as a playlist document
    #[error("source could not be decoded: {address} - {reason}")]
    Decode { address: String, reason: String },

    /// Nested playlist chain deeper than the configured cap
    #[error("nested playlist depth {depth} exceeds limit at {address}")]
    RecursionLimit { address: String, depth: usize },

    /// Nested playlist already visited on the current expansion
    #[error("nested playlist cycle detected at {address}")]
    Cycle { address: String },
}

impl SourceError {
    /// The address this error refers to
    pub fn address(&self) -> &str {
        match self {
            SourceError::Unavailable { address, .. }
            | SourceError::Timeout { address, .. }
            | SourceError::HttpStatus { address, .. }
            | SourceError::Decode { address, .. }
            | SourceError::RecursionLimit { address, .. }
            | SourceError::Cycle { address } => address,
        }
    }

    /// Whether the source contributed nothing because it could not be read
    pub fn is_fetch_failure(&self) -> bool {
        matches!(
            self,
            SourceError::Unavailable { .. }
                | SourceError::Timeout { .. }
                | SourceError::HttpStatus { .. }
                | SourceError::Decode { .. }
        )
    }

    /// Failure description without the address
    pub fn reason(&self) -> String {
        match self {
            SourceError::Unavailable { reason, .. } => reason.clone(),
            SourceError::Timeout { timeout, .. } => format!("timed out after {timeout}"),
            SourceError::HttpStatus { status, .. } => format!("HTTP {status}"),
            SourceError::Decode { reason, .. } => format!("undecodable: {reason}"),
            SourceError::RecursionLimit { depth, .. } => {
                format!("nesting depth {depth} exceeds limit")
            }
            SourceError::Cycle { .. } => "already visited".to_string(),
        }
    }

    pub fn timeout<S: Into<String>>(address: S, timeout: Duration) -> Self {
        Self::Timeout {
            address: address.into(),
            timeout: humantime::format_duration(timeout).to_string(),
        }
    }

    pub fn unavailable<S: Into<String>, R: ToString>(address: S, reason: R) -> Self {
        Self::Unavailable {
            address: address.into(),
            reason: reason.to_string(),
        }
    }
}

/// Typed outcome of a failed liveness probe
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProbeFailure {
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("network error: {0}")]
    Network(String),

    #[error("unacceptable HTTP status {0}")]
    Status(u16),

    #[error("unexpected content type '{0}'")]
    UnexpectedContentType(String),

    #[error("empty response body")]
    EmptyBody,

    #[error("no recognizable media format")]
    UnrecognizedFormat,

    #[error("unsupported scheme '{0}'")]
    UnsupportedScheme(String),

    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("ffprobe: {0}")]
    Ffprobe(String),

    /// The probe task died before reporting
    #[error("probe aborted: {0}")]
    Aborted(String),
}

impl ProbeFailure {
    /// Short machine-friendly label, used for per-reason tallies
    pub fn kind(&self) -> &'static str {
        match self {
            ProbeFailure::Timeout(_) => "timeout",
            ProbeFailure::Network(_) => "network",
            ProbeFailure::Status(_) => "status",
            ProbeFailure::UnexpectedContentType(_) => "content-type",
            ProbeFailure::EmptyBody => "empty-body",
            ProbeFailure::UnrecognizedFormat => "unrecognized-format",
            ProbeFailure::UnsupportedScheme(_) => "unsupported-scheme",
            ProbeFailure::InvalidAddress(_) => "invalid-address",
            ProbeFailure::Ffprobe(_) => "ffprobe",
            ProbeFailure::Aborted(_) => "aborted",
        }
    }

    /// Failures that no amount of extra time can turn into a live stream
    pub fn is_permanent(&self) -> bool {
        matches!(self.kind(), "invalid-address" | "unsupported-scheme")
    }
}

/// Convenience methods for creating common error types
impl AppError {
    /// Create a configuration error with a custom message
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Wrap an I/O error with the operation that failed
    pub fn io<S: Into<String>>(context: S, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create an internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    pub fn is_configuration(&self) -> bool {
        matches!(self, AppError::Configuration { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_error_address_and_kind() {
        let err = SourceError::HttpStatus {
            address: "http://example.com/list.m3u".to_string(),
            status: 404,
        };
        assert_eq!(err.address(), "http://example.com/list.m3u");
        assert!(err.is_fetch_failure());

        let cycle = SourceError::Cycle {
            address: "http://example.com/self.m3u".to_string(),
        };
        assert!(!cycle.is_fetch_failure());
    }

    #[test]
    fn test_source_timeout_is_human_readable() {
        let err = SourceError::timeout("http://slow.example/list.m3u", Duration::from_secs(10));
        assert_eq!(
            err.to_string(),
            "source timed out after 10s: http://slow.example/list.m3u"
        );
        assert_eq!(err.reason(), "timed out after 10s");
    }

    #[test]
    fn test_probe_failure_display_and_kind() {
        assert_eq!(ProbeFailure::Status(404).to_string(), "unacceptable HTTP status 404");
        assert_eq!(ProbeFailure::Status(404).kind(), "status");
        assert_eq!(ProbeFailure::EmptyBody.kind(), "empty-body");
    }

    #[test]
    fn test_probe_failure_permanence() {
        assert!(ProbeFailure::InvalidAddress("::".into()).is_permanent());
        assert!(ProbeFailure::UnsupportedScheme("ftp".into()).is_permanent());
        assert!(!ProbeFailure::Timeout(Duration::from_secs(1)).is_permanent());
        assert!(!ProbeFailure::Status(404).is_permanent());
    }
}
