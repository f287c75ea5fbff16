/*
[INPUT]:  Caller subscription intents and signer output
[OUTPUT]: Serializable outbound frames for the streaming feed
[POS]:    Data layer - request frame definitions
[UPDATE]: When the subscribe/unsubscribe frame format changes
*/

use serde::{Deserialize, Serialize};

use crate::auth::Signature;
use crate::types::{ChannelName, RequestType};

/// One channel, optionally scoped to a set of products
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    pub channel: ChannelName,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_ids: Option<Vec<String>>,
}

impl Channel {
    /// Channel without a product dimension
    pub fn new(channel: impl Into<ChannelName>) -> Self {
        Self {
            channel: channel.into(),
            product_ids: None,
        }
    }

    /// Channel scoped to products. An empty list is treated as "no products".
    pub fn with_products<I, S>(channel: impl Into<ChannelName>, product_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let ids: Vec<String> = product_ids.into_iter().map(Into::into).collect();
        Self {
            channel: channel.into(),
            product_ids: if ids.is_empty() { None } else { Some(ids) },
        }
    }

    pub fn product_ids(&self) -> &[String] {
        self.product_ids.as_deref().unwrap_or_default()
    }
}

impl From<ChannelName> for Channel {
    fn from(channel: ChannelName) -> Self {
        Channel::new(channel)
    }
}

/// Argument accepted by subscribe/unsubscribe: one channel, many, or a bare name
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Channels(pub Vec<Channel>);

impl Channels {
    pub fn into_vec(self) -> Vec<Channel> {
        self.0
    }
}

impl From<Channel> for Channels {
    fn from(channel: Channel) -> Self {
        Channels(vec![channel])
    }
}

impl From<Vec<Channel>> for Channels {
    fn from(channels: Vec<Channel>) -> Self {
        Channels(channels)
    }
}

impl From<&[Channel]> for Channels {
    fn from(channels: &[Channel]) -> Self {
        Channels(channels.to_vec())
    }
}

impl From<ChannelName> for Channels {
    fn from(name: ChannelName) -> Self {
        Channels(vec![Channel::new(name)])
    }
}

/// Outbound subscribe/unsubscribe frame
///
/// `{type, channel: {channel, product_ids?}, key, signature, timestamp}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriptionRequest {
    #[serde(rename = "type")]
    pub request_type: RequestType,
    pub channel: Channel,
    pub key: String,
    pub signature: String,
    pub timestamp: String,
}

impl SubscriptionRequest {
    pub fn new(request_type: RequestType, channel: Channel, signature: Signature) -> Self {
        Self {
            request_type,
            channel,
            key: signature.key,
            signature: signature.signature,
            timestamp: signature.timestamp,
        }
    }
}
