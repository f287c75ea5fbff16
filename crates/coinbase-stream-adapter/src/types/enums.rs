/*
[INPUT]:  Channel names and wire discriminators used by the streaming feed
[OUTPUT]: Typed Rust enums with serialization support
[POS]:    Data layer - type definitions for stream communication
[UPDATE]: When the feed adds channels or request types
*/

use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

/// Outbound request type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestType {
    Subscribe,
    Unsubscribe,
}

impl RequestType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestType::Subscribe => "subscribe",
            RequestType::Unsubscribe => "unsubscribe",
        }
    }
}

/// Named logical stream offered by the feed.
///
/// Names the client does not know yet are carried verbatim in `Other` so a
/// server-side addition can still be subscribed to and confirmed.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ChannelName {
    Heartbeat,
    Heartbeats,
    Status,
    Ticker,
    /// Ticker throttled to one update per second; answered with `ticker` frames
    Ticker1000,
    TickerBatch,
    Level2,
    Level2Batch,
    User,
    Matches,
    Full,
    Other(String),
}

impl ChannelName {
    pub fn as_str(&self) -> &str {
        match self {
            ChannelName::Heartbeat => "heartbeat",
            ChannelName::Heartbeats => "heartbeats",
            ChannelName::Status => "status",
            ChannelName::Ticker => "ticker",
            ChannelName::Ticker1000 => "ticker_1000",
            ChannelName::TickerBatch => "ticker_batch",
            ChannelName::Level2 => "level2",
            ChannelName::Level2Batch => "level2_batch",
            ChannelName::User => "user",
            ChannelName::Matches => "matches",
            ChannelName::Full => "full",
            ChannelName::Other(name) => name,
        }
    }

    /// Whether subscriptions to this channel are scoped by product ids.
    ///
    /// Unknown channels report `true`; whether they carry products is then
    /// decided by what the caller subscribed with.
    pub fn has_product_dimension(&self) -> bool {
        !matches!(self, ChannelName::Status | ChannelName::Heartbeats)
    }
}

impl FromStr for ChannelName {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "heartbeat" => ChannelName::Heartbeat,
            "heartbeats" => ChannelName::Heartbeats,
            "status" => ChannelName::Status,
            "ticker" => ChannelName::Ticker,
            "ticker_1000" => ChannelName::Ticker1000,
            "ticker_batch" => ChannelName::TickerBatch,
            "level2" | "l2_data" => ChannelName::Level2,
            "level2_batch" => ChannelName::Level2Batch,
            "user" => ChannelName::User,
            "matches" => ChannelName::Matches,
            "full" => ChannelName::Full,
            other => ChannelName::Other(other.to_string()),
        })
    }
}

impl From<&str> for ChannelName {
    fn from(value: &str) -> Self {
        match value.parse() {
            Ok(name) => name,
            Err(never) => match never {},
        }
    }
}

impl fmt::Display for ChannelName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for ChannelName {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ChannelName {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(ChannelName::from(raw.as_str()))
    }
}
