//! Errors raised while resolving, fetching and tagging media.

use reqwest::StatusCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AcquisitionError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{url} responded with status {status}")]
    Status { url: String, status: StatusCode },

    #[error("Unexpected page structure: {0}")]
    Parse(String),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("No match found: {0}")]
    NotFound(String),

    #[error("{tool} failed: {message}")]
    ExternalProcess { tool: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Store error: {0}")]
    Store(#[from] anyhow::Error),

    #[error("Download task panicked: {0}")]
    Panicked(String),
}

impl AcquisitionError {
    pub fn parse(message: impl Into<String>) -> Self {
        AcquisitionError::Parse(message.into())
    }

    pub fn external_process(tool: impl Into<String>, message: impl Into<String>) -> Self {
        AcquisitionError::ExternalProcess {
            tool: tool.into(),
            message: message.into(),
        }
    }

    /// Whether retrying the same request may succeed.
    ///
    /// Covers network level failures (connect, timeout, reset) and server
    /// side statuses. Layout mismatches, missing fields and process failures
    /// are deterministic.
    pub fn is_transient(&self) -> bool {
        match self {
            AcquisitionError::Http(e) => {
                e.is_timeout() || e.is_connect() || e.is_request() || e.is_body()
            }
            AcquisitionError::Status { status, .. } => {
                status.is_server_error() || *status == StatusCode::TOO_MANY_REQUESTS
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(code: u16) -> AcquisitionError {
        AcquisitionError::Status {
            url: "http://mirror/".to_string(),
            status: StatusCode::from_u16(code).unwrap(),
        }
    }

    #[test]
    fn test_server_errors_are_transient() {
        assert!(status(500).is_transient());
        assert!(status(503).is_transient());
        assert!(status(429).is_transient());
    }

    #[test]
    fn test_client_errors_are_not_transient() {
        assert!(!status(404).is_transient());
        assert!(!status(403).is_transient());
    }

    #[test]
    fn test_structural_errors_are_not_transient() {
        assert!(!AcquisitionError::parse("no table").is_transient());
        assert!(!AcquisitionError::MissingField("content-disposition".into()).is_transient());
        assert!(!AcquisitionError::external_process("ffmpeg", "exit 1").is_transient());
    }
}
