/*
[INPUT]:  Server confirmation, error and REST time payloads
[OUTPUT]: Typed Rust structs with lenient deserialization
[POS]:    Data layer - response definitions
[UPDATE]: When confirmation or error payload formats change
*/

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::types::{Channel, ChannelName};

/// Registry entry: a channel and the products subscribed on it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelSubscription {
    pub channel: ChannelName,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_ids: Option<BTreeSet<String>>,
}

impl ChannelSubscription {
    pub fn new(channel: ChannelName) -> Self {
        Self {
            channel,
            product_ids: None,
        }
    }

    /// Convert back into a request channel for replay
    pub fn to_channel(&self) -> Channel {
        match &self.product_ids {
            Some(ids) => Channel::with_products(self.channel.clone(), ids.iter().cloned()),
            None => Channel::new(self.channel.clone()),
        }
    }
}

impl From<&Channel> for ChannelSubscription {
    fn from(channel: &Channel) -> Self {
        Self {
            channel: channel.channel.clone(),
            product_ids: channel
                .product_ids
                .as_ref()
                .filter(|ids| !ids.is_empty())
                .map(|ids| ids.iter().cloned().collect()),
        }
    }
}

/// Confirmation listing every channel the server currently streams to us
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawSubscriptions")]
pub struct SubscriptionsMessage {
    pub channels: Vec<ChannelSubscription>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ChannelEntry {
    Name(ChannelName),
    Scoped {
        #[serde(alias = "name")]
        channel: ChannelName,
        #[serde(default)]
        product_ids: Option<Vec<String>>,
    },
}

impl From<ChannelEntry> for ChannelSubscription {
    fn from(entry: ChannelEntry) -> Self {
        match entry {
            ChannelEntry::Name(channel) => ChannelSubscription::new(channel),
            ChannelEntry::Scoped {
                channel,
                product_ids,
            } => ChannelSubscription::from(&Channel {
                channel,
                product_ids,
            }),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    Many(Vec<ChannelEntry>),
    One(ChannelEntry),
}

#[derive(Deserialize)]
struct RawSubscriptionEvent {
    #[serde(default)]
    subscriptions: BTreeMap<String, Vec<String>>,
}

#[derive(Deserialize)]
struct RawSubscriptions {
    #[serde(default)]
    channels: Option<OneOrMany>,
    #[serde(default)]
    events: Vec<RawSubscriptionEvent>,
}

impl From<RawSubscriptions> for SubscriptionsMessage {
    fn from(raw: RawSubscriptions) -> Self {
        let channels = match raw.channels {
            Some(OneOrMany::Many(entries)) => entries.into_iter().map(Into::into).collect(),
            Some(OneOrMany::One(entry)) => vec![entry.into()],
            None => raw
                .events
                .into_iter()
                .flat_map(|event| event.subscriptions)
                .map(|(name, ids)| {
                    let channel = ChannelName::from(name.as_str());
                    if channel.has_product_dimension() {
                        ChannelSubscription::from(&Channel::with_products(channel, ids))
                    } else {
                        ChannelSubscription::new(channel)
                    }
                })
                .collect(),
        };
        Self { channels }
    }
}

/// Error frame reported by the server, kept verbatim
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorMessage {
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// GET /brokerage/time response
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ServerTime {
    pub iso: DateTime<Utc>,
    #[serde(rename = "epochSeconds", alias = "epoch", deserialize_with = "lenient_i64")]
    pub epoch_seconds: i64,
    #[serde(rename = "epochMillis", default, deserialize_with = "lenient_opt_i64")]
    pub epoch_millis: Option<i64>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum NumberLike {
    Int(i64),
    Float(f64),
    Text(String),
}

impl NumberLike {
    fn to_i64<E: serde::de::Error>(self) -> Result<i64, E> {
        match self {
            NumberLike::Int(value) => Ok(value),
            NumberLike::Float(value) => Ok(value.trunc() as i64),
            NumberLike::Text(text) => text
                .split('.')
                .next()
                .unwrap_or_default()
                .parse()
                .map_err(E::custom),
        }
    }
}

fn lenient_i64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
    NumberLike::deserialize(deserializer)?.to_i64()
}

fn lenient_opt_i64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<i64>, D::Error> {
    Option::<NumberLike>::deserialize(deserializer)?
        .map(NumberLike::to_i64)
        .transpose()
}
