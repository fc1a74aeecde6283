use crate::packet::connack::ConnectReturnCode;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, MqttError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MqttError {
    /// The buffer does not yet hold a complete packet. Never fatal: the
    /// caller keeps the buffered bytes and waits for more.
    #[error("incomplete packet: more bytes required")]
    InsufficientData,

    #[error("malformed packet: {0}")]
    MalformedPacket(String),

    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    #[error("invalid packet type: {0}")]
    InvalidPacketType(u8),

    #[error("invalid QoS: {0}")]
    InvalidQoS(u8),

    #[error("invalid topic: {0}")]
    InvalidTopic(String),

    #[error("string too long: {0} bytes exceeds maximum of 65535")]
    StringTooLong(usize),

    #[error("packet too large: remaining length {0} exceeds maximum of 268435455")]
    PacketTooLarge(usize),

    #[error("connection refused: {0:?}")]
    ConnectionRefused(ConnectReturnCode),

    #[error("not authorized")]
    NotAuthorized,

    #[error("not connected")]
    NotConnected,
}

impl MqttError {
    /// Whether this error must tear down the connection. Everything except
    /// `InsufficientData` is fatal per MQTT-4.8.0-1.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        !matches!(self, MqttError::InsufficientData)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = MqttError::MalformedPacket("bad connect flags".to_string());
        assert_eq!(err.to_string(), "malformed packet: bad connect flags");

        let err = MqttError::StringTooLong(70000);
        assert_eq!(
            err.to_string(),
            "string too long: 70000 bytes exceeds maximum of 65535"
        );
    }

    #[test]
    fn test_fatality_tiers() {
        assert!(!MqttError::InsufficientData.is_fatal());
        assert!(MqttError::MalformedPacket(String::new()).is_fatal());
        assert!(MqttError::NotAuthorized.is_fatal());
        assert!(MqttError::ProtocolViolation(String::new()).is_fatal());
    }
}
