/*
[INPUT]:  Raw inbound text frames
[OUTPUT]: Parsed JSON value plus its routing kind
[POS]:    WebSocket layer - frame classification by `type`/`channel` discriminator
[UPDATE]: When the feed adds message types or renames discriminators
*/

use serde_json::Value;

/// Routing class of an inbound frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InboundKind {
    Subscriptions,
    Error,
    Ticker,
    TickerBatch,
    Level2Snapshot,
    Level2Update,
    Status,
    Heartbeat,
    User,
    Unknown,
}

impl InboundKind {
    pub fn from_discriminator(discriminator: &str) -> Self {
        match discriminator {
            "subscriptions" => InboundKind::Subscriptions,
            "error" => InboundKind::Error,
            "ticker" => InboundKind::Ticker,
            "ticker_batch" => InboundKind::TickerBatch,
            "snapshot" => InboundKind::Level2Snapshot,
            "l2update" => InboundKind::Level2Update,
            "status" => InboundKind::Status,
            "heartbeat" | "heartbeats" => InboundKind::Heartbeat,
            "user" | "received" | "open" | "done" | "match" | "change" | "activate" => {
                InboundKind::User
            }
            _ => InboundKind::Unknown,
        }
    }
}

/// One decoded frame, not yet converted into its typed payload
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub kind: InboundKind,
    pub discriminator: Option<String>,
    pub value: Value,
}

impl InboundMessage {
    /// Parse a text frame; only invalid JSON fails here
    pub fn parse(text: &str) -> serde_json::Result<Self> {
        let value: Value = serde_json::from_str(text)?;
        let discriminator = discriminator(&value).map(str::to_string);
        let kind = discriminator
            .as_deref()
            .map(InboundKind::from_discriminator)
            .unwrap_or(InboundKind::Unknown);

        Ok(Self {
            kind,
            discriminator,
            value,
        })
    }
}

/// `type` wins over `channel`; non-string values are ignored
pub fn discriminator(value: &Value) -> Option<&str> {
    value
        .get("type")
        .and_then(Value::as_str)
        .or_else(|| value.get("channel").and_then(Value::as_str))
}
