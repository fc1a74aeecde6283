use crate::encoding::{decode_string, encode_string};
use crate::error::{MqttError, Result};
use crate::packet::FixedHeader;
use crate::types::QoS;
use bytes::{Buf, BufMut};

/// One (topic filter, requested QoS) pair in a SUBSCRIBE payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionRequest {
    pub filter: String,
    pub qos: QoS,
}

impl SubscriptionRequest {
    #[must_use]
    pub fn new(filter: impl Into<String>, qos: QoS) -> Self {
        Self {
            filter: filter.into(),
            qos,
        }
    }
}

/// MQTT SUBSCRIBE packet: a nonzero packet identifier and a nonempty list
/// of subscription requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscribePacket {
    pub packet_id: u16,
    pub filters: Vec<SubscriptionRequest>,
}

impl SubscribePacket {
    #[must_use]
    pub fn new(packet_id: u16) -> Self {
        Self {
            packet_id,
            filters: Vec::new(),
        }
    }

    #[must_use]
    pub fn add_filter(mut self, filter: impl Into<String>, qos: QoS) -> Self {
        self.filters.push(SubscriptionRequest::new(filter, qos));
        self
    }

    pub(crate) fn encode_body<B: BufMut>(&self, buf: &mut B) -> Result<()> {
        if self.filters.is_empty() {
            return Err(MqttError::MalformedPacket(
                "SUBSCRIBE must contain at least one topic filter".to_string(),
            ));
        }
        buf.put_u16(self.packet_id);
        for request in &self.filters {
            encode_string(buf, &request.filter)?;
            buf.put_u8(request.qos.as_u8());
        }
        Ok(())
    }

    pub(crate) fn decode_body<B: Buf>(buf: &mut B, header: &FixedHeader) -> Result<Self> {
        expect_subscribe_flags(header)?;
        if buf.remaining() < 2 {
            return Err(MqttError::MalformedPacket(
                "SUBSCRIBE missing packet identifier".to_string(),
            ));
        }
        let packet_id = buf.get_u16();
        if packet_id == 0 {
            return Err(MqttError::MalformedPacket(
                "SUBSCRIBE packet identifier must be nonzero".to_string(),
            ));
        }
        let mut filters = Vec::new();
        while buf.has_remaining() {
            let filter = decode_string(buf)?;
            if !buf.has_remaining() {
                return Err(MqttError::MalformedPacket(
                    "SUBSCRIBE filter missing requested QoS".to_string(),
                ));
            }
            let qos = QoS::try_from(buf.get_u8())?;
            filters.push(SubscriptionRequest { filter, qos });
        }
        if filters.is_empty() {
            return Err(MqttError::MalformedPacket(
                "SUBSCRIBE must contain at least one topic filter".to_string(),
            ));
        }
        Ok(Self { packet_id, filters })
    }
}

/// SUBSCRIBE and UNSUBSCRIBE share the 0b0010 fixed-header flags
/// (MQTT-3.8.1-1, MQTT-3.10.1-1).
pub(crate) fn expect_subscribe_flags(header: &FixedHeader) -> Result<()> {
    if header.dup || header.retain || header.qos != QoS::AtLeastOnce {
        return Err(MqttError::MalformedPacket(format!(
            "invalid {} flags: DUP={} QoS={} Retain={}",
            header.packet_type, header.dup, header.qos, header.retain
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::Packet;

    #[test]
    fn test_subscribe_round_trip() {
        // Seed case: [("topic/device/1", 0)].
        let packet = SubscribePacket::new(3).add_filter("topic/device/1", QoS::AtMostOnce);
        let bytes = Packet::Subscribe(packet.clone()).encode().unwrap();
        assert_eq!(bytes[0], 0x82);
        let (decoded, _) = Packet::decode(&bytes).unwrap();
        assert_eq!(decoded, Packet::Subscribe(packet));
    }

    #[test]
    fn test_subscribe_multiple_filters_in_order() {
        let packet = SubscribePacket::new(7)
            .add_filter("room/+/temp", QoS::AtLeastOnce)
            .add_filter("alerts/#", QoS::ExactlyOnce);
        let bytes = Packet::Subscribe(packet).encode().unwrap();
        let (decoded, _) = Packet::decode(&bytes).unwrap();
        match decoded {
            Packet::Subscribe(p) => {
                assert_eq!(p.filters.len(), 2);
                assert_eq!(p.filters[0].filter, "room/+/temp");
                assert_eq!(p.filters[0].qos, QoS::AtLeastOnce);
                assert_eq!(p.filters[1].filter, "alerts/#");
                assert_eq!(p.filters[1].qos, QoS::ExactlyOnce);
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_subscribe_zero_packet_id_rejected() {
        let bytes = [0x82, 0x06, 0x00, 0x00, 0x00, 0x01, b'a', 0x00];
        assert!(matches!(
            Packet::decode(&bytes),
            Err(MqttError::MalformedPacket(_))
        ));
    }

    #[test]
    fn test_subscribe_empty_payload_rejected() {
        let bytes = [0x82, 0x02, 0x00, 0x01];
        assert!(matches!(
            Packet::decode(&bytes),
            Err(MqttError::MalformedPacket(_))
        ));
    }

    #[test]
    fn test_subscribe_invalid_requested_qos_rejected() {
        let bytes = [0x82, 0x06, 0x00, 0x01, 0x00, 0x01, b'a', 0x03];
        assert_eq!(Packet::decode(&bytes), Err(MqttError::InvalidQoS(3)));
    }

    #[test]
    fn test_subscribe_wrong_flags_rejected() {
        let bytes = [0x80, 0x06, 0x00, 0x01, 0x00, 0x01, b'a', 0x00];
        assert!(matches!(
            Packet::decode(&bytes),
            Err(MqttError::MalformedPacket(_))
        ));
    }

    #[test]
    fn test_subscribe_encode_empty_rejected() {
        assert!(Packet::Subscribe(SubscribePacket::new(1)).encode().is_err());
    }
}
