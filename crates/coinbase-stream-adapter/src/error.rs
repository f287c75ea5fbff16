/*
[INPUT]:  Error sources (HTTP, API, serialization, signing, WebSocket lifecycle)
[OUTPUT]: Structured error types with context and retry hints
[POS]:    Error handling layer - unified error types for entire crate
[UPDATE]: When adding new error sources or improving error messages
*/

use std::time::Duration;

use reqwest::StatusCode;
use thiserror::Error;

/// Main error type for the Coinbase stream adapter
#[derive(Error, Debug)]
pub enum CoinbaseError {
    /// `connect()` was called while a live connection handle exists
    #[error("WebSocket connection already established, call disconnect() first")]
    AlreadyConnected,

    /// An operation needed an open connection and there is none
    #[error("WebSocket is not connected")]
    NotConnected,

    /// Inbound frame could not be decoded
    #[error("Malformed frame: {message}")]
    ProtocolParse { message: String, raw: String },

    /// The server answered with an explicit error frame
    #[error("Server error: {message} ({reason})")]
    ServerReported { message: String, reason: String },

    /// No pong arrived within the grace period after a ping
    #[error("Heartbeat timeout, no pong within {timeout:?}")]
    HeartbeatTimeout { timeout: Duration },

    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// API returned an error response
    #[error("API error (code {code}): {message}")]
    Api { code: i32, message: String },

    /// Serialization/deserialization failed
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// URL parsing failed
    #[error("Invalid URL: {0}")]
    UrlParse(#[from] url::ParseError),

    /// Transport level WebSocket error
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    /// The signing callback failed
    #[error("Signing failed: {0}")]
    Signing(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Connection timeout
    #[error("Connection timeout after {duration}s")]
    Timeout { duration: u64 },
}

impl CoinbaseError {
    /// Check if the error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CoinbaseError::Http(_)
                | CoinbaseError::Timeout { .. }
                | CoinbaseError::WebSocket(_)
                | CoinbaseError::HeartbeatTimeout { .. }
                | CoinbaseError::NotConnected
        )
    }

    /// Check if error indicates authentication failure
    pub fn is_auth_error(&self) -> bool {
        match self {
            CoinbaseError::Signing(_) => true,
            CoinbaseError::Api { code, .. } => *code == 401 || *code == 403,
            CoinbaseError::ServerReported { reason, message } => {
                let reason = reason.to_ascii_lowercase();
                let message = message.to_ascii_lowercase();
                reason.contains("auth") || message.contains("auth")
            }
            _ => false,
        }
    }

    /// Create an API error from status code and message
    pub fn api_error(status: StatusCode, message: impl Into<String>) -> Self {
        CoinbaseError::Api {
            code: status.as_u16() as i32,
            message: message.into(),
        }
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for CoinbaseError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        use tokio_tungstenite::tungstenite::Error as WsError;

        match err {
            // a bad endpoint will not get better by retrying
            WsError::Url(err) => CoinbaseError::Config(format!("invalid stream url: {err}")),
            WsError::HttpFormat(err) => CoinbaseError::Config(format!("invalid stream url: {err}")),
            other => CoinbaseError::WebSocket(other.to_string()),
        }
    }
}

/// Result type alias for adapter operations
pub type Result<T> = std::result::Result<T, CoinbaseError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_retryable() {
        let timeout_err = CoinbaseError::Timeout { duration: 10 };
        assert!(timeout_err.is_retryable());

        assert!(CoinbaseError::NotConnected.is_retryable());
        assert!(!CoinbaseError::AlreadyConnected.is_retryable());
    }

    #[test]
    fn test_error_is_auth_error() {
        let server = CoinbaseError::ServerReported {
            message: "Failed to subscribe".to_string(),
            reason: "user channel requires authentication".to_string(),
        };
        assert!(server.is_auth_error());
        assert!(CoinbaseError::api_error(StatusCode::UNAUTHORIZED, "bad key").is_auth_error());
        assert!(!CoinbaseError::NotConnected.is_auth_error());
    }

    #[test]
    fn test_bad_url_is_not_retryable() {
        use tokio_tungstenite::tungstenite::Error as WsError;
        use tokio_tungstenite::tungstenite::error::UrlError;

        let err = CoinbaseError::from(WsError::Url(UrlError::UnsupportedUrlScheme));
        assert!(matches!(err, CoinbaseError::Config(_)));
        assert!(!err.is_retryable());

        let err = CoinbaseError::from(WsError::ConnectionClosed);
        assert!(matches!(err, CoinbaseError::WebSocket(_)));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_api_error_creation() {
        let err = CoinbaseError::api_error(StatusCode::BAD_REQUEST, "Invalid product");
        match err {
            CoinbaseError::Api { code, message } => {
                assert_eq!(code, 400);
                assert_eq!(message, "Invalid product");
            }
            _ => panic!("Expected Api error variant"),
        }
    }
}
