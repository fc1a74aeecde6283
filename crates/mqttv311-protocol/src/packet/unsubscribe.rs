use crate::encoding::{decode_string, encode_string};
use crate::error::{MqttError, Result};
use crate::packet::subscribe::expect_subscribe_flags;
use crate::packet::FixedHeader;
use bytes::{Buf, BufMut};

/// MQTT UNSUBSCRIBE packet: a nonzero packet identifier and a nonempty
/// list of topic filters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsubscribePacket {
    pub packet_id: u16,
    pub filters: Vec<String>,
}

impl UnsubscribePacket {
    #[must_use]
    pub fn new(packet_id: u16) -> Self {
        Self {
            packet_id,
            filters: Vec::new(),
        }
    }

    #[must_use]
    pub fn add_filter(mut self, filter: impl Into<String>) -> Self {
        self.filters.push(filter.into());
        self
    }

    pub(crate) fn encode_body<B: BufMut>(&self, buf: &mut B) -> Result<()> {
        if self.filters.is_empty() {
            return Err(MqttError::MalformedPacket(
                "UNSUBSCRIBE must contain at least one topic filter".to_string(),
            ));
        }
        buf.put_u16(self.packet_id);
        for filter in &self.filters {
            encode_string(buf, filter)?;
        }
        Ok(())
    }

    pub(crate) fn decode_body<B: Buf>(buf: &mut B, header: &FixedHeader) -> Result<Self> {
        expect_subscribe_flags(header)?;
        if buf.remaining() < 2 {
            return Err(MqttError::MalformedPacket(
                "UNSUBSCRIBE missing packet identifier".to_string(),
            ));
        }
        let packet_id = buf.get_u16();
        if packet_id == 0 {
            return Err(MqttError::MalformedPacket(
                "UNSUBSCRIBE packet identifier must be nonzero".to_string(),
            ));
        }
        let mut filters = Vec::new();
        while buf.has_remaining() {
            filters.push(decode_string(buf)?);
        }
        if filters.is_empty() {
            return Err(MqttError::MalformedPacket(
                "UNSUBSCRIBE must contain at least one topic filter".to_string(),
            ));
        }
        Ok(Self { packet_id, filters })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::Packet;

    #[test]
    fn test_unsubscribe_round_trip() {
        // Seed case: ["topic/device/1", "topic2"].
        let packet = UnsubscribePacket::new(21)
            .add_filter("topic/device/1")
            .add_filter("topic2");
        let bytes = Packet::Unsubscribe(packet.clone()).encode().unwrap();
        assert_eq!(bytes[0], 0xA2);
        let (decoded, _) = Packet::decode(&bytes).unwrap();
        assert_eq!(decoded, Packet::Unsubscribe(packet));
    }

    #[test]
    fn test_unsubscribe_empty_payload_rejected() {
        let bytes = [0xA2, 0x02, 0x00, 0x15];
        assert!(matches!(
            Packet::decode(&bytes),
            Err(MqttError::MalformedPacket(_))
        ));
    }

    #[test]
    fn test_unsubscribe_zero_packet_id_rejected() {
        let bytes = [0xA2, 0x05, 0x00, 0x00, 0x00, 0x01, b'a'];
        assert!(matches!(
            Packet::decode(&bytes),
            Err(MqttError::MalformedPacket(_))
        ));
    }

    #[test]
    fn test_unsubscribe_wrong_flags_rejected() {
        let bytes = [0xA0, 0x05, 0x00, 0x01, 0x00, 0x01, b'a'];
        assert!(matches!(
            Packet::decode(&bytes),
            Err(MqttError::MalformedPacket(_))
        ));
    }
}
