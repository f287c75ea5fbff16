/*
[INPUT]:  Inbound text frames and the subscription registry
[OUTPUT]: Typed StreamEvents (one per frame, plus an optional raw echo)
[POS]:    WebSocket layer - message demultiplexer
[UPDATE]: When adding channel payloads or changing error routing
*/

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::types::{
    ErrorMessage, HeartbeatMessage, Level2Snapshot, Level2Update, StatusMessage,
    SubscriptionsMessage, TickerMessage, UserMessage,
};
use crate::ws::events::{MessageError, StreamEvent};
use crate::ws::message::{InboundKind, InboundMessage};
use crate::ws::registry::SubscriptionRegistry;

const MESSAGE_SAMPLE_LIMIT: usize = 3;
const OTHER_LOG_LIMIT: usize = 3;
const PARSE_FAIL_LOG_LIMIT: usize = 3;
const RAW_LOG_MAX_BYTES: usize = 1024;

/// Turns text frames into events. Never fails: bad frames become `MessageError`.
#[derive(Debug, Default)]
pub struct Demultiplexer {
    emit_raw_messages: bool,
    message_samples: usize,
    other_samples: usize,
    parse_fail_samples: usize,
}

impl Demultiplexer {
    pub fn new(emit_raw_messages: bool) -> Self {
        Self {
            emit_raw_messages,
            ..Self::default()
        }
    }

    /// Route one frame. A `subscriptions` frame also replaces the registry's confirmed state.
    pub fn route(&mut self, text: &str, registry: &mut SubscriptionRegistry) -> Vec<StreamEvent> {
        let message = match InboundMessage::parse(text) {
            Ok(message) => message,
            Err(err) => {
                self.log_parse_fail_once(&err.to_string(), text);
                return vec![StreamEvent::MessageError(MessageError::Parse {
                    raw: text.to_string(),
                    error: err.to_string(),
                })];
            }
        };

        let mut events = Vec::with_capacity(2);
        if self.emit_raw_messages && message.kind != InboundKind::Unknown {
            events.push(StreamEvent::RawMessage(message.value.clone()));
        }

        let typed = match message.kind {
            InboundKind::Subscriptions => {
                decode::<SubscriptionsMessage>(&message.value).map(|subscriptions| {
                    registry.replace(subscriptions.channels.clone());
                    StreamEvent::SubscriptionsUpdated(subscriptions)
                })
            }
            InboundKind::Error => decode::<ErrorMessage>(&message.value)
                .map(|error| StreamEvent::MessageError(MessageError::Server(error))),
            InboundKind::Ticker => decode::<TickerMessage>(&message.value).map(StreamEvent::Ticker),
            InboundKind::TickerBatch => {
                decode::<TickerMessage>(&message.value).map(StreamEvent::TickerBatch)
            }
            InboundKind::Level2Snapshot => {
                decode::<Level2Snapshot>(&message.value).map(StreamEvent::Level2Snapshot)
            }
            InboundKind::Level2Update => {
                decode::<Level2Update>(&message.value).map(StreamEvent::Level2Update)
            }
            InboundKind::Status => decode::<StatusMessage>(&message.value).map(StreamEvent::Status),
            InboundKind::Heartbeat => {
                decode::<HeartbeatMessage>(&message.value).map(StreamEvent::Heartbeat)
            }
            InboundKind::User => decode::<UserMessage>(&message.value).map(StreamEvent::User),
            InboundKind::Unknown => {
                self.log_other_message_once(message.discriminator.as_deref(), text);
                Ok(StreamEvent::RawMessage(message.value))
            }
        };

        match typed {
            Ok(event) => {
                self.log_message_sample_once(&event);
                events.push(event);
            }
            Err(err) => {
                let discriminator = message.discriminator.as_deref().unwrap_or("unknown");
                let error = format!("invalid {discriminator} frame: {err}");
                self.log_parse_fail_once(&error, text);
                events.push(StreamEvent::MessageError(MessageError::Parse {
                    raw: text.to_string(),
                    error,
                }));
            }
        }

        events
    }

    fn log_message_sample_once(&mut self, event: &StreamEvent) {
        if self.message_samples >= MESSAGE_SAMPLE_LIMIT {
            return;
        }
        self.message_samples += 1;

        let product_id = match event {
            StreamEvent::Ticker(ticker) | StreamEvent::TickerBatch(ticker) => {
                Some(ticker.product_id.as_str())
            }
            StreamEvent::Level2Snapshot(snapshot) => Some(snapshot.product_id.as_str()),
            StreamEvent::Level2Update(update) => Some(update.product_id.as_str()),
            _ => None,
        };

        if let Some(product_id) = product_id {
            info!(
                sample_index = self.message_samples,
                sample_limit = MESSAGE_SAMPLE_LIMIT,
                kind = %event.kind(),
                product_id,
                "ws message sample"
            );
        } else {
            info!(
                sample_index = self.message_samples,
                sample_limit = MESSAGE_SAMPLE_LIMIT,
                kind = %event.kind(),
                "ws message sample"
            );
        }
    }

    fn log_other_message_once(&mut self, discriminator: Option<&str>, raw: &str) {
        if self.other_samples >= OTHER_LOG_LIMIT {
            return;
        }
        self.other_samples += 1;

        info!(
            sample_index = self.other_samples,
            sample_limit = OTHER_LOG_LIMIT,
            discriminator = discriminator.unwrap_or("none"),
            bytes = raw.len(),
            "ws message type unrecognized"
        );
        let preview = truncate_for_log(raw, RAW_LOG_MAX_BYTES);
        debug!(
            sample_index = self.other_samples,
            sample_limit = OTHER_LOG_LIMIT,
            message = %preview,
            "ws message type unrecognized"
        );
    }

    fn log_parse_fail_once(&mut self, error: &str, raw: &str) {
        if self.parse_fail_samples >= PARSE_FAIL_LOG_LIMIT {
            return;
        }
        self.parse_fail_samples += 1;

        warn!(
            sample_index = self.parse_fail_samples,
            sample_limit = PARSE_FAIL_LOG_LIMIT,
            error,
            bytes = raw.len(),
            "ws message parse failed"
        );
        let preview = truncate_for_log(raw, RAW_LOG_MAX_BYTES);
        debug!(
            sample_index = self.parse_fail_samples,
            sample_limit = PARSE_FAIL_LOG_LIMIT,
            message = %preview,
            "ws message parse failed"
        );
    }
}

fn decode<T: DeserializeOwned>(value: &Value) -> serde_json::Result<T> {
    serde_json::from_value(value.clone())
}

/// Cut `value` to at most `max_bytes`, respecting char boundaries
pub(crate) fn truncate_for_log(value: &str, max_bytes: usize) -> String {
    if value.len() <= max_bytes {
        return value.to_string();
    }

    let mut end = max_bytes;
    while end > 0 && !value.is_char_boundary(end) {
        end -= 1;
    }

    format!("{}...(truncated, {} bytes)", &value[..end], value.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ChannelName;

    fn route(demux: &mut Demultiplexer, raw: &str) -> Vec<StreamEvent> {
        let mut registry = SubscriptionRegistry::new();
        demux.route(raw, &mut registry)
    }

    #[test]
    fn test_ticker_routed() {
        let mut demux = Demultiplexer::new(false);
        let events = route(
            &mut demux,
            r#"{"type":"ticker","product_id":"BTC-USD","price":"42000.5"}"#,
        );
        assert_eq!(events.len(), 1);
        match &events[0] {
            StreamEvent::Ticker(ticker) => assert_eq!(ticker.product_id, "BTC-USD"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_subscriptions_replace_confirmed_state() {
        let mut demux = Demultiplexer::new(false);
        let mut registry = SubscriptionRegistry::new();

        demux.route(
            r#"{"type":"subscriptions","channels":[{"name":"ticker","product_ids":["BTC-USD"]}]}"#,
            &mut registry,
        );
        assert_eq!(registry.confirmed().len(), 1);

        let events = demux.route(r#"{"type":"subscriptions","channels":[]}"#, &mut registry);
        match &events[0] {
            StreamEvent::SubscriptionsUpdated(message) => assert!(message.channels.is_empty()),
            other => panic!("unexpected {other:?}"),
        }
        assert!(registry.confirmed().is_empty());
    }

    #[test]
    fn test_subscriptions_single_object_form() {
        let mut demux = Demultiplexer::new(false);
        let mut registry = SubscriptionRegistry::new();
        demux.route(
            r#"{"type":"subscriptions","channels":{"channel":"ticker_1000","product_ids":["BTC-USD"]}}"#,
            &mut registry,
        );
        assert_eq!(registry.confirmed()[0].channel, ChannelName::Ticker1000);
    }

    #[test]
    fn test_server_error_keeps_reason() {
        let mut demux = Demultiplexer::new(false);
        let events = route(
            &mut demux,
            r#"{"type":"error","message":"Failed to subscribe","reason":"user channel requires authentication"}"#,
        );
        match &events[0] {
            StreamEvent::MessageError(err) => {
                assert!(err.is_server_reported());
                assert_eq!(err.reason(), Some("user channel requires authentication"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_malformed_json_becomes_parse_error() {
        let mut demux = Demultiplexer::new(true);
        let events = route(&mut demux, "{not json");
        assert_eq!(events.len(), 1);
        match &events[0] {
            StreamEvent::MessageError(MessageError::Parse { raw, .. }) => {
                assert_eq!(raw, "{not json")
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_known_type_with_bad_body_is_parse_error() {
        let mut demux = Demultiplexer::new(false);
        let events = route(&mut demux, r#"{"type":"ticker","price":"42000"}"#);
        match &events[0] {
            StreamEvent::MessageError(MessageError::Parse { error, .. }) => {
                assert!(error.starts_with("invalid ticker frame"))
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_unknown_type_forwarded_raw_once() {
        let mut demux = Demultiplexer::new(true);
        let events = route(&mut demux, r#"{"type":"auction","product_id":"BTC-USD"}"#);
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], StreamEvent::RawMessage(_)));
    }

    #[test]
    fn test_raw_echo_precedes_typed_event() {
        let mut demux = Demultiplexer::new(true);
        let events = route(
            &mut demux,
            r#"{"type":"l2update","product_id":"BTC-USD","changes":[["buy","100.0","0"]]}"#,
        );
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], StreamEvent::RawMessage(_)));
        match &events[1] {
            StreamEvent::Level2Update(update) => assert!(update.changes[0].is_removal()),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_truncate_for_log_respects_char_boundary() {
        let value = "ééééé";
        let truncated = truncate_for_log(value, 3);
        assert!(truncated.starts_with('é'));
        assert!(truncated.contains("truncated"));
        assert_eq!(truncate_for_log("short", 10), "short");
    }
}
