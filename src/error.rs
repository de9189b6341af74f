// Error handling module
// Fatal client errors and the classification of per-request failures

use serde::Serialize;
use thiserror::Error;

/// Error code recorded when a request fails before any structured code was seen.
///
/// Never collides with a real HTTP status.
pub const UNSET_ERROR_CODE: i64 = -1;

/// Errors that stop the measurement run before any request is attempted
#[derive(Error, Debug)]
pub enum ClientError {
    /// Missing or invalid endpoint/credential configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// The token encoding table could not be loaded
    #[error("Tokenizer initialization failed: {0}")]
    Tokenizer(String),

    /// The underlying HTTP client could not be built
    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),
}

/// Result type alias for fatal client operations
pub type Result<T> = std::result::Result<T, ClientError>;

/// How a single request failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Non-success status on the initial response
    HttpStatus,
    /// An `error` object arrived inside the event stream
    StreamProtocol,
    /// Connection, I/O or body decode failure
    Transport,
}

/// A classified per-request failure.
///
/// These never escape `execute`; they are folded into the outcome's metrics.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RequestFailure {
    #[error("HTTP status {status}: {body}")]
    HttpStatus { status: u16, body: String },

    #[error("Stream error {code}: {message}")]
    StreamProtocol { code: i64, message: String },

    #[error("Transport error: {0}")]
    Transport(String),
}

impl RequestFailure {
    pub fn kind(&self) -> FailureKind {
        match self {
            RequestFailure::HttpStatus { .. } => FailureKind::HttpStatus,
            RequestFailure::StreamProtocol { .. } => FailureKind::StreamProtocol,
            RequestFailure::Transport(_) => FailureKind::Transport,
        }
    }

    /// Error code to report in the metrics record
    pub fn code(&self) -> i64 {
        match self {
            RequestFailure::HttpStatus { status, .. } => i64::from(*status),
            RequestFailure::StreamProtocol { code, .. } => *code,
            RequestFailure::Transport(_) => UNSET_ERROR_CODE,
        }
    }

    /// Error message to report in the metrics record
    pub fn message(&self) -> &str {
        match self {
            RequestFailure::HttpStatus { body, .. } => body,
            RequestFailure::StreamProtocol { message, .. } => message,
            RequestFailure::Transport(description) => description,
        }
    }
}

impl From<reqwest::Error> for RequestFailure {
    fn from(e: reqwest::Error) -> Self {
        let error_kind = if e.is_timeout() {
            "timeout"
        } else if e.is_connect() {
            "connection_failed"
        } else if e.is_request() {
            "request_error"
        } else if e.is_body() {
            "body_error"
        } else if e.is_decode() {
            "decode_error"
        } else {
            "unknown"
        };
        RequestFailure::Transport(format!("{} (kind: {})", e, error_kind))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = ClientError::Config("OPENAI_API_KEY is not set".to_string());
        assert_eq!(
            err.to_string(),
            "Configuration error: OPENAI_API_KEY is not set"
        );

        let err = ClientError::Tokenizer("bad table".to_string());
        assert_eq!(err.to_string(), "Tokenizer initialization failed: bad table");
    }

    #[test]
    fn test_http_status_failure_fields() {
        let failure = RequestFailure::HttpStatus {
            status: 429,
            body: "Rate limit exceeded".to_string(),
        };
        assert_eq!(failure.kind(), FailureKind::HttpStatus);
        assert_eq!(failure.code(), 429);
        assert_eq!(failure.message(), "Rate limit exceeded");
        assert_eq!(failure.to_string(), "HTTP status 429: Rate limit exceeded");
    }

    #[test]
    fn test_stream_protocol_failure_fields() {
        let failure = RequestFailure::StreamProtocol {
            code: 503,
            message: "overloaded".to_string(),
        };
        assert_eq!(failure.kind(), FailureKind::StreamProtocol);
        assert_eq!(failure.code(), 503);
        assert_eq!(failure.message(), "overloaded");
    }

    #[test]
    fn test_transport_failure_uses_unset_code() {
        let failure = RequestFailure::Transport("connection reset".to_string());
        assert_eq!(failure.kind(), FailureKind::Transport);
        assert_eq!(failure.code(), UNSET_ERROR_CODE);
        assert_eq!(failure.message(), "connection reset");
    }
}
