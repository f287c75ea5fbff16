/*
[INPUT]:  Subscribe/unsubscribe intents and server `subscriptions` confirmations
[OUTPUT]: Intended channel set (replayed on reconnect) and last confirmed set
[POS]:    WebSocket layer - subscription state, no I/O
[UPDATE]: When subscription merge rules or confirmation handling change
*/

use std::collections::{BTreeMap, BTreeSet};

use crate::types::{ChannelName, ChannelSubscription};

/// In-memory record of desired and confirmed subscriptions.
///
/// Intended state is written optimistically by subscribe/unsubscribe and is
/// the source for replay after a reconnect. Confirmed state is overwritten
/// by every `subscriptions` frame; the latest frame wins.
#[derive(Debug, Clone, Default)]
pub struct SubscriptionRegistry {
    intended: BTreeMap<ChannelName, ChannelSubscription>,
    confirmed: Vec<ChannelSubscription>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge `product_ids` into the channel entry, creating it if needed
    pub fn add(&mut self, channel: &ChannelName, product_ids: Option<&[String]>) {
        let entry = self
            .intended
            .entry(channel.clone())
            .or_insert_with(|| ChannelSubscription::new(channel.clone()));

        if let Some(ids) = product_ids.filter(|ids| !ids.is_empty()) {
            entry
                .product_ids
                .get_or_insert_with(BTreeSet::new)
                .extend(ids.iter().cloned());
        }
    }

    /// Remove `product_ids` from the channel entry, or the whole entry when
    /// none are given. Channels without a product dimension go at once, and
    /// entries left without products are dropped.
    pub fn remove(&mut self, channel: &ChannelName, product_ids: Option<&[String]>) {
        let ids = match product_ids.filter(|ids| !ids.is_empty()) {
            Some(ids) if channel.has_product_dimension() => ids,
            _ => {
                self.intended.remove(channel);
                return;
            }
        };

        let Some(entry) = self.intended.get_mut(channel) else {
            return;
        };

        let drop_entry = match entry.product_ids.as_mut() {
            Some(set) => {
                for id in ids {
                    set.remove(id);
                }
                set.is_empty()
            }
            None => true,
        };

        if drop_entry {
            self.intended.remove(channel);
        }
    }

    /// Overwrite the confirmed state with a server confirmation
    pub fn replace(&mut self, channels: Vec<ChannelSubscription>) {
        self.confirmed = channels;
    }

    /// Intended subscriptions, ordered by channel name
    pub fn snapshot(&self) -> Vec<ChannelSubscription> {
        self.intended.values().cloned().collect()
    }

    /// Channels as last confirmed by the server
    pub fn confirmed(&self) -> Vec<ChannelSubscription> {
        self.confirmed.clone()
    }

    pub fn get(&self, channel: &ChannelName) -> Option<&ChannelSubscription> {
        self.intended.get(channel)
    }

    pub fn is_empty(&self) -> bool {
        self.intended.is_empty()
    }

    pub fn len(&self) -> usize {
        self.intended.len()
    }

    pub fn clear(&mut self) {
        self.intended.clear();
        self.confirmed.clear();
    }
}
