use serde::{Deserialize, Serialize};

fn default_true() -> bool {
    true
}

/// Broker policy switches. Defaults match the reference behavior: single
/// delivery for overlapping subscriptions, QoS 0 dropped for disconnected
/// sessions, QoS 2 delivery deferred until PUBREL, zero-length client
/// identifiers rejected.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[allow(clippy::struct_excessive_bools)]
pub struct BrokerConfig {
    /// When a client holds several subscriptions matching one published
    /// topic: deliver once at the maximum matching QoS (true), or once
    /// per matching subscription at `min(subscription QoS, publish QoS)`
    /// (false).
    #[serde(default = "default_true")]
    pub overlapping_single_delivery: bool,

    /// Drop QoS 0 publications for disconnected non-clean sessions
    /// instead of queueing them for the next connection.
    #[serde(default = "default_true")]
    pub drop_qos0_when_disconnected: bool,

    /// Defer inbound QoS 2 delivery until PUBREL instead of delivering at
    /// PUBLISH receipt.
    #[serde(default = "default_true")]
    pub publish_on_pubrel: bool,

    /// Accept a zero-length client identifier (clean sessions only) by
    /// assigning a generated one (MQTT-3.1.3-6/-7).
    #[serde(default)]
    pub allow_zero_length_client_ids: bool,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            overlapping_single_delivery: true,
            drop_qos0_when_disconnected: true,
            publish_on_pubrel: true,
            allow_zero_length_client_ids: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = BrokerConfig::default();
        assert!(config.overlapping_single_delivery);
        assert!(config.drop_qos0_when_disconnected);
        assert!(config.publish_on_pubrel);
        assert!(!config.allow_zero_length_client_ids);
    }

    #[test]
    fn test_deserialize_with_defaults() {
        let config: BrokerConfig =
            serde_json::from_str(r#"{"allow_zero_length_client_ids": true}"#).unwrap();
        assert!(config.allow_zero_length_client_ids);
        assert!(config.publish_on_pubrel);

        let round_trip = serde_json::to_string(&config).unwrap();
        let parsed: BrokerConfig = serde_json::from_str(&round_trip).unwrap();
        assert!(parsed.allow_zero_length_client_ids);
    }
}
