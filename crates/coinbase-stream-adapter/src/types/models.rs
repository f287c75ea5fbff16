/*
[INPUT]:  Channel payload schemas (ticker, level2, status, heartbeat, user)
[OUTPUT]: Typed Rust structs with serialization support
[POS]:    Data layer - market data and account event records
[UPDATE]: When channel payload schemas change or new channels are added
*/

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::types::Side;

/// Ticker update, delivered for `ticker`, `ticker_1000` and `ticker_batch`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickerMessage {
    pub product_id: String,
    #[serde(default)]
    pub sequence: Option<u64>,
    #[serde(default)]
    pub trade_id: Option<u64>,
    #[serde(default)]
    pub price: Option<Decimal>,
    #[serde(default)]
    pub open_24h: Option<Decimal>,
    #[serde(default)]
    pub volume_24h: Option<Decimal>,
    #[serde(default)]
    pub low_24h: Option<Decimal>,
    #[serde(default)]
    pub high_24h: Option<Decimal>,
    #[serde(default)]
    pub volume_30d: Option<Decimal>,
    #[serde(default)]
    pub best_bid: Option<Decimal>,
    #[serde(default)]
    pub best_ask: Option<Decimal>,
    #[serde(default)]
    pub side: Option<Side>,
    #[serde(default)]
    pub last_size: Option<Decimal>,
    #[serde(default)]
    pub time: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One `[price, size]` book level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceLevel(pub Decimal, pub Decimal);

impl PriceLevel {
    pub fn price(&self) -> Decimal {
        self.0
    }

    pub fn size(&self) -> Decimal {
        self.1
    }
}

/// Full order book image sent once after subscribing to `level2`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Level2Snapshot {
    pub product_id: String,
    #[serde(default)]
    pub bids: Vec<PriceLevel>,
    #[serde(default)]
    pub asks: Vec<PriceLevel>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One `[side, price, size]` change; a zero size removes the level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Level2Change(pub Side, pub Decimal, pub Decimal);

impl Level2Change {
    pub fn side(&self) -> Side {
        self.0
    }

    pub fn price(&self) -> Decimal {
        self.1
    }

    pub fn size(&self) -> Decimal {
        self.2
    }

    pub fn is_removal(&self) -> bool {
        self.2.is_zero()
    }
}

/// Incremental order book change
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Level2Update {
    pub product_id: String,
    #[serde(default)]
    pub time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub changes: Vec<Level2Change>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusProduct {
    pub id: String,
    #[serde(default)]
    pub base_currency: Option<String>,
    #[serde(default)]
    pub quote_currency: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub status_message: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusCurrency {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Product and currency catalogue pushed on the `status` channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusMessage {
    #[serde(default)]
    pub products: Vec<StatusProduct>,
    #[serde(default)]
    pub currencies: Vec<StatusCurrency>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Server-side heartbeat frame (distinct from the WebSocket ping/pong liveness check)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeartbeatMessage {
    #[serde(default)]
    pub product_id: Option<String>,
    #[serde(default)]
    pub sequence: Option<u64>,
    #[serde(default)]
    pub last_trade_id: Option<u64>,
    #[serde(default)]
    pub time: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Account event from the authenticated `user` channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserMessage {
    #[serde(rename = "type", default)]
    pub message_type: Option<String>,
    #[serde(default)]
    pub order_id: Option<String>,
    #[serde(default)]
    pub product_id: Option<String>,
    #[serde(default)]
    pub side: Option<Side>,
    #[serde(default)]
    pub price: Option<Decimal>,
    #[serde(default)]
    pub size: Option<Decimal>,
    #[serde(default)]
    pub remaining_size: Option<Decimal>,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub sequence: Option<u64>,
    #[serde(default)]
    pub time: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_ticker_decimals_from_strings() {
        let ticker: TickerMessage = serde_json::from_str(
            r#"{
                "type": "ticker",
                "sequence": 5928281084,
                "product_id": "BTC-USD",
                "price": "8500.11",
                "best_bid": "8500.10",
                "best_ask": "8500.12",
                "side": "buy",
                "time": "2014-11-07T08:19:27.028459Z"
            }"#,
        )
        .unwrap();

        assert_eq!(ticker.product_id, "BTC-USD");
        assert_eq!(ticker.price, Some(Decimal::from_str("8500.11").unwrap()));
        assert_eq!(ticker.side, Some(Side::Buy));
        assert_eq!(ticker.extra.get("type"), Some(&Value::from("ticker")));
    }

    #[test]
    fn test_level2_update_changes() {
        let update: Level2Update = serde_json::from_str(
            r#"{
                "type": "l2update",
                "product_id": "BTC-USD",
                "time": "2019-08-14T20:42:27.265Z",
                "changes": [["buy", "10101.80000000", "0.162567"], ["sell", "10102.00", "0"]]
            }"#,
        )
        .unwrap();

        assert_eq!(update.changes.len(), 2);
        assert_eq!(update.changes[0].side(), Side::Buy);
        assert!(!update.changes[0].is_removal());
        assert!(update.changes[1].is_removal());
    }

    #[test]
    fn test_user_message_keeps_type() {
        let message: UserMessage = serde_json::from_str(
            r#"{"type":"done","order_id":"d50ec984","reason":"filled","product_id":"BTC-USD","remaining_size":"0"}"#,
        )
        .unwrap();

        assert_eq!(message.message_type.as_deref(), Some("done"));
        assert_eq!(message.reason.as_deref(), Some("filled"));
        assert_eq!(message.remaining_size, Some(Decimal::ZERO));
    }
}
