//! The authoritative subscription and retained-message store.
//!
//! `$`-prefixed topics live in their own partition for both subscriptions
//! and retained messages, so a bare `#` or `+` subscription can never
//! observe `$SYS`-style state. The partition is structural: nothing ever
//! matches across the two stores.

use mqttv311_protocol::topic::{is_valid_topic, topic_matches};
use mqttv311_protocol::types::QoS;
use bytes::Bytes;
use std::collections::HashMap;
use tracing::debug;

/// One client's subscription to one topic filter. Unique per
/// (client, filter) pair: re-subscribing updates the QoS in place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    pub client_id: String,
    pub topic_filter: String,
    pub qos: QoS,
}

/// A retained payload stored under an exact (non-wildcard) topic name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetainedMessage {
    pub payload: Bytes,
    pub qos: QoS,
}

#[derive(Debug, Default)]
pub struct SubscriptionStore {
    subscriptions: Vec<Subscription>,
    dollar_subscriptions: Vec<Subscription>,
    retained: HashMap<String, RetainedMessage>,
    dollar_retained: HashMap<String, RetainedMessage>,
}

impl SubscriptionStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.subscriptions.clear();
        self.dollar_subscriptions.clear();
        self.retained.clear();
        self.dollar_retained.clear();
    }

    fn partition(&self, topic: &str) -> &Vec<Subscription> {
        if topic.starts_with('$') {
            &self.dollar_subscriptions
        } else {
            &self.subscriptions
        }
    }

    fn partition_mut(&mut self, topic: &str) -> &mut Vec<Subscription> {
        if topic.starts_with('$') {
            &mut self.dollar_subscriptions
        } else {
            &mut self.subscriptions
        }
    }

    fn retained_partition(&self, topic: &str) -> &HashMap<String, RetainedMessage> {
        if topic.starts_with('$') {
            &self.dollar_retained
        } else {
            &self.retained
        }
    }

    /// Registers or updates a subscription. An invalid filter is silently
    /// ignored: no entry is created and no error is raised. Returns
    /// whether the filter was accepted.
    pub fn subscribe(&mut self, client_id: &str, topic_filter: &str, qos: QoS) -> bool {
        if !is_valid_topic(topic_filter) {
            debug!(client_id, topic_filter, "ignoring invalid topic filter");
            return false;
        }
        let subscriptions = self.partition_mut(topic_filter);
        if let Some(existing) = subscriptions
            .iter_mut()
            .find(|s| s.client_id == client_id && s.topic_filter == topic_filter)
        {
            existing.qos = qos;
            return true;
        }
        subscriptions.push(Subscription {
            client_id: client_id.to_string(),
            topic_filter: topic_filter.to_string(),
            qos,
        });
        true
    }

    /// Removes one (client, filter) entry; removing a non-existent entry
    /// is not an error. Topic filters compare byte for byte
    /// (MQTT-3.10.4-1).
    pub fn unsubscribe(&mut self, client_id: &str, topic_filter: &str) -> bool {
        if !is_valid_topic(topic_filter) {
            return false;
        }
        let subscriptions = self.partition_mut(topic_filter);
        let before = subscriptions.len();
        subscriptions.retain(|s| !(s.client_id == client_id && s.topic_filter == topic_filter));
        before != subscriptions.len()
    }

    /// Removes every subscription held by a client, in both partitions.
    pub fn clear_subscriptions(&mut self, client_id: &str) {
        self.subscriptions.retain(|s| s.client_id != client_id);
        self.dollar_subscriptions.retain(|s| s.client_id != client_id);
    }

    /// Distinct client identifiers whose filters match the published
    /// topic, in first-match order.
    #[must_use]
    pub fn subscribers(&self, topic: &str) -> Vec<String> {
        let mut result: Vec<String> = Vec::new();
        for subscription in self.partition(topic) {
            if topic_matches(&subscription.topic_filter, topic)
                && !result.contains(&subscription.client_id)
            {
                result.push(subscription.client_id.clone());
            }
        }
        result
    }

    /// The individual subscriptions of one client matching a topic.
    #[must_use]
    pub fn subscriptions_matching(&self, topic: &str, client_id: &str) -> Vec<&Subscription> {
        self.partition(topic)
            .iter()
            .filter(|s| s.client_id == client_id && topic_matches(&s.topic_filter, topic))
            .collect()
    }

    /// The effective delivery QoS for a client with overlapping matching
    /// filters: the maximum over all of them (MQTT-3.3.5-1).
    #[must_use]
    pub fn qos_of(&self, client_id: &str, topic: &str) -> Option<QoS> {
        self.subscriptions_matching(topic, client_id)
            .iter()
            .map(|s| s.qos)
            .max()
    }

    /// Stores or overwrites a retained message; a zero-length payload
    /// deletes the entry instead (MQTT-3.3.1-11).
    pub fn set_retained(&mut self, topic: &str, payload: Bytes, qos: QoS) {
        if !is_valid_topic(topic) {
            return;
        }
        let retained = if topic.starts_with('$') {
            &mut self.dollar_retained
        } else {
            &mut self.retained
        };
        if payload.is_empty() {
            if retained.remove(topic).is_some() {
                debug!(topic, "deleted retained message");
            }
        } else {
            retained.insert(topic.to_string(), RetainedMessage { payload, qos });
        }
    }

    #[must_use]
    pub fn retained(&self, topic: &str) -> Option<&RetainedMessage> {
        self.retained_partition(topic).get(topic)
    }

    /// All stored retained-topic keys matching a filter, used to seed a
    /// new subscription.
    #[must_use]
    pub fn retained_topics(&self, topic_filter: &str) -> Vec<String> {
        if !is_valid_topic(topic_filter) {
            return Vec::new();
        }
        self.retained_partition(topic_filter)
            .keys()
            .filter(|topic| topic_matches(topic_filter, topic))
            .cloned()
            .collect()
    }
}
