use crate::encoding::{decode_string, encode_string};
use crate::error::{MqttError, Result};
use crate::packet::FixedHeader;
use crate::types::{Message, QoS};
use bytes::{Buf, BufMut, Bytes};

/// MQTT PUBLISH packet.
///
/// The packet identifier is present and nonzero exactly when QoS is 1 or 2
/// (MQTT-2.3.1-1, MQTT-2.3.1-5).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishPacket {
    pub dup: bool,
    pub qos: QoS,
    pub retain: bool,
    pub topic: String,
    pub packet_id: Option<u16>,
    pub payload: Bytes,
}

impl PublishPacket {
    #[must_use]
    pub fn new(topic: impl Into<String>, payload: impl Into<Bytes>, qos: QoS) -> Self {
        Self {
            dup: false,
            qos,
            retain: false,
            topic: topic.into(),
            packet_id: None,
            payload: payload.into(),
        }
    }

    #[must_use]
    pub fn with_packet_id(mut self, packet_id: u16) -> Self {
        self.packet_id = Some(packet_id);
        self
    }

    #[must_use]
    pub fn with_retain(mut self, retain: bool) -> Self {
        self.retain = retain;
        self
    }

    #[must_use]
    pub fn with_dup(mut self, dup: bool) -> Self {
        self.dup = dup;
        self
    }

    /// The application-level view of this publication.
    #[must_use]
    pub fn message(&self) -> Message {
        Message {
            topic: self.topic.clone(),
            payload: self.payload.clone(),
            qos: self.qos,
            retain: self.retain,
        }
    }

    pub(crate) fn encode_body<B: BufMut>(&self, buf: &mut B) -> Result<()> {
        encode_string(buf, &self.topic)?;
        if self.qos != QoS::AtMostOnce {
            let Some(packet_id) = self.packet_id else {
                return Err(MqttError::MalformedPacket(
                    "PUBLISH with QoS > 0 requires a packet identifier".to_string(),
                ));
            };
            buf.put_u16(packet_id);
        }
        buf.put_slice(&self.payload);
        Ok(())
    }

    pub(crate) fn decode_body<B: Buf>(buf: &mut B, header: &FixedHeader) -> Result<Self> {
        if header.qos == QoS::AtMostOnce && header.dup {
            return Err(MqttError::MalformedPacket(
                "PUBLISH with QoS 0 must not set DUP".to_string(),
            ));
        }
        let topic = decode_string(buf)?;
        let packet_id = if header.qos != QoS::AtMostOnce {
            if buf.remaining() < 2 {
                return Err(MqttError::MalformedPacket(
                    "PUBLISH missing packet identifier".to_string(),
                ));
            }
            let id = buf.get_u16();
            if id == 0 {
                return Err(MqttError::MalformedPacket(
                    "PUBLISH packet identifier must be nonzero".to_string(),
                ));
            }
            Some(id)
        } else {
            None
        };
        let payload = buf.copy_to_bytes(buf.remaining());
        Ok(Self {
            dup: header.dup,
            qos: header.qos,
            retain: header.retain,
            topic,
            packet_id,
            payload,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::Packet;

    fn round_trip(packet: PublishPacket) -> PublishPacket {
        let bytes = Packet::Publish(packet).encode().unwrap();
        let (decoded, consumed) = Packet::decode(&bytes).unwrap();
        assert_eq!(consumed, bytes.len());
        match decoded {
            Packet::Publish(p) => p,
            other => panic!("expected PUBLISH, got {}", other.packet_type()),
        }
    }

    #[test]
    fn test_publish_round_trip_qos0() {
        let decoded = round_trip(PublishPacket::new("topic/device/1", &b"21.0"[..], QoS::AtMostOnce));
        assert_eq!(decoded.topic, "topic/device/1");
        assert_eq!(&decoded.payload[..], b"21.0");
        assert_eq!(decoded.packet_id, None);
        assert!(!decoded.dup);
        assert!(!decoded.retain);
    }

    #[test]
    fn test_publish_round_trip_all_flags() {
        // Seed case: DUP=1, QoS=1, Retain=1, payload with high-bit bytes.
        let packet = PublishPacket::new(
            "topic/device/1",
            Bytes::from_static(&[0xC3, 0xA9, 0xFF, 0x00, 0x7F]),
            QoS::AtLeastOnce,
        )
        .with_packet_id(42)
        .with_dup(true)
        .with_retain(true);
        let decoded = round_trip(packet.clone());
        assert_eq!(decoded, packet);
    }

    #[test]
    fn test_publish_empty_payload() {
        let decoded = round_trip(PublishPacket::new("a/b", Bytes::new(), QoS::AtMostOnce));
        assert!(decoded.payload.is_empty());
    }

    #[test]
    fn test_publish_qos0_with_packet_id_bytes_become_payload() {
        // A QoS 0 publish carries no identifier field: any extra bytes are payload.
        let bytes = Packet::Publish(
            PublishPacket::new("t", &b"\x00\x07rest"[..], QoS::AtMostOnce),
        )
        .encode()
        .unwrap();
        let (decoded, _) = Packet::decode(&bytes).unwrap();
        match decoded {
            Packet::Publish(p) => {
                assert_eq!(p.packet_id, None);
                assert_eq!(&p.payload[..], b"\x00\x07rest");
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_publish_qos1_requires_nonzero_packet_id() {
        // topic "t", id 0
        let bytes = [0x32, 0x05, 0x00, 0x01, b't', 0x00, 0x00];
        let result = Packet::decode(&bytes);
        assert!(matches!(result, Err(MqttError::MalformedPacket(_))));
    }

    #[test]
    fn test_publish_qos0_dup_rejected() {
        let bytes = [0x38, 0x03, 0x00, 0x01, b't'];
        let result = Packet::decode(&bytes);
        assert!(matches!(result, Err(MqttError::MalformedPacket(_))));
    }

    #[test]
    fn test_publish_encode_without_id_fails_for_qos1() {
        let packet = Packet::Publish(PublishPacket::new("t", &b"x"[..], QoS::AtLeastOnce));
        assert!(packet.encode().is_err());
    }

    #[test]
    fn test_publish_invalid_topic_utf8_rejected() {
        let bytes = [0x30, 0x04, 0x00, 0x02, 0xED, 0xA0];
        let result = Packet::decode(&bytes);
        assert!(matches!(result, Err(MqttError::MalformedPacket(_))));
    }
}
