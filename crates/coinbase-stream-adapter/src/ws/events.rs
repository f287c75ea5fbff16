/*
[INPUT]:  Connection lifecycle changes and demultiplexed inbound frames
[OUTPUT]: StreamEvent values delivered to the caller's receiver
[POS]:    WebSocket layer - public event surface of the stream client
[UPDATE]: When adding channels, lifecycle notifications or error payloads
*/

use std::fmt;
use std::time::Duration;

use serde_json::Value;

use crate::error::CoinbaseError;
use crate::types::{
    ErrorMessage, HeartbeatMessage, Level2Snapshot, Level2Update, StatusMessage,
    SubscriptionsMessage, TickerMessage, UserMessage,
};

/// Per-frame failure; the connection stays up when one of these is emitted
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageError {
    /// Frame was not valid JSON, or its body did not match its declared type
    Parse { raw: String, error: String },
    /// Explicit `error` frame sent by the server
    Server(ErrorMessage),
}

impl MessageError {
    pub fn message(&self) -> &str {
        match self {
            MessageError::Parse { error, .. } => error,
            MessageError::Server(server) => &server.message,
        }
    }

    /// Server supplied reason, e.g. "user channel requires authentication"
    pub fn reason(&self) -> Option<&str> {
        match self {
            MessageError::Parse { .. } => None,
            MessageError::Server(server) => server.reason.as_deref(),
        }
    }

    pub fn is_server_reported(&self) -> bool {
        matches!(self, MessageError::Server(_))
    }

    /// Server rejected the request for missing or bad credentials
    pub fn is_auth_error(&self) -> bool {
        self.is_server_reported() && CoinbaseError::from(self.clone()).is_auth_error()
    }
}

impl fmt::Display for MessageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageError::Parse { error, .. } => write!(f, "malformed frame: {error}"),
            MessageError::Server(server) => match &server.reason {
                Some(reason) => write!(f, "{} ({reason})", server.message),
                None => f.write_str(&server.message),
            },
        }
    }
}

impl From<MessageError> for CoinbaseError {
    fn from(err: MessageError) -> Self {
        match err {
            MessageError::Parse { raw, error } => CoinbaseError::ProtocolParse {
                message: error,
                raw,
            },
            MessageError::Server(server) => CoinbaseError::ServerReported {
                message: server.message,
                reason: server.reason.unwrap_or_default(),
            },
        }
    }
}

/// Everything the stream client reports to its caller
#[derive(Debug, Clone)]
pub enum StreamEvent {
    /// Transport reported open; emitted for the first session and every reconnect
    Open,
    /// Transport reported closed (or the caller disconnected)
    Close,
    /// Transport level failure (DNS, refused connection, handshake, I/O)
    Error(String),
    /// A reconnect attempt will start after `delay`
    Reconnecting { attempt: u32, delay: Duration },
    /// Frame with an unknown discriminator, or any frame when raw echo is enabled
    RawMessage(Value),
    MessageError(MessageError),
    SubscriptionsUpdated(SubscriptionsMessage),
    Ticker(TickerMessage),
    TickerBatch(TickerMessage),
    Level2Snapshot(Level2Snapshot),
    Level2Update(Level2Update),
    Status(StatusMessage),
    User(UserMessage),
    Heartbeat(HeartbeatMessage),
}

/// Payload-free mirror of [`StreamEvent`], handy for filtering and logging
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Open,
    Close,
    Error,
    Reconnecting,
    RawMessage,
    MessageError,
    SubscriptionsUpdated,
    Ticker,
    TickerBatch,
    Level2Snapshot,
    Level2Update,
    Status,
    User,
    Heartbeat,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Open => "open",
            EventKind::Close => "close",
            EventKind::Error => "error",
            EventKind::Reconnecting => "reconnecting",
            EventKind::RawMessage => "raw_message",
            EventKind::MessageError => "message_error",
            EventKind::SubscriptionsUpdated => "subscriptions_updated",
            EventKind::Ticker => "ticker",
            EventKind::TickerBatch => "ticker_batch",
            EventKind::Level2Snapshot => "level2_snapshot",
            EventKind::Level2Update => "level2_update",
            EventKind::Status => "status",
            EventKind::User => "user",
            EventKind::Heartbeat => "heartbeat",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl StreamEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            StreamEvent::Open => EventKind::Open,
            StreamEvent::Close => EventKind::Close,
            StreamEvent::Error(_) => EventKind::Error,
            StreamEvent::Reconnecting { .. } => EventKind::Reconnecting,
            StreamEvent::RawMessage(_) => EventKind::RawMessage,
            StreamEvent::MessageError(_) => EventKind::MessageError,
            StreamEvent::SubscriptionsUpdated(_) => EventKind::SubscriptionsUpdated,
            StreamEvent::Ticker(_) => EventKind::Ticker,
            StreamEvent::TickerBatch(_) => EventKind::TickerBatch,
            StreamEvent::Level2Snapshot(_) => EventKind::Level2Snapshot,
            StreamEvent::Level2Update(_) => EventKind::Level2Update,
            StreamEvent::Status(_) => EventKind::Status,
            StreamEvent::User(_) => EventKind::User,
            StreamEvent::Heartbeat(_) => EventKind::Heartbeat,
        }
    }

    /// Lifecycle notifications as opposed to frame payloads
    pub fn is_lifecycle(&self) -> bool {
        matches!(
            self.kind(),
            EventKind::Open | EventKind::Close | EventKind::Error | EventKind::Reconnecting
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_error_converts_with_reason() {
        let err = MessageError::Server(ErrorMessage {
            message: "Failed to subscribe".to_string(),
            reason: Some("user channel requires authentication".to_string()),
        });
        assert_eq!(err.reason(), Some("user channel requires authentication"));
        assert!(err.is_auth_error());
        assert_eq!(
            err.to_string(),
            "Failed to subscribe (user channel requires authentication)"
        );

        match CoinbaseError::from(err) {
            CoinbaseError::ServerReported { message, reason } => {
                assert_eq!(message, "Failed to subscribe");
                assert_eq!(reason, "user channel requires authentication");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_parse_error_keeps_raw_payload() {
        let err = MessageError::Parse {
            raw: "{oops".to_string(),
            error: "expected value".to_string(),
        };
        assert!(!err.is_server_reported());
        assert!(!err.is_auth_error());
        assert_eq!(err.reason(), None);

        match CoinbaseError::from(err) {
            CoinbaseError::ProtocolParse { raw, .. } => assert_eq!(raw, "{oops"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_kind_mirrors_variant() {
        assert_eq!(StreamEvent::Open.kind(), EventKind::Open);
        assert_eq!(
            StreamEvent::Reconnecting {
                attempt: 1,
                delay: Duration::from_millis(10)
            }
            .kind()
            .as_str(),
            "reconnecting"
        );
        assert!(StreamEvent::Close.is_lifecycle());
        assert!(!StreamEvent::RawMessage(Value::Null).is_lifecycle());
    }
}
