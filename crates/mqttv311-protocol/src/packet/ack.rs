//! The fixed-size acknowledgment packets: PUBACK, PUBREC, PUBREL, PUBCOMP,
//! and UNSUBACK. Each is a two-byte body holding the packet identifier.

use crate::error::{MqttError, Result};
use crate::packet::FixedHeader;
use crate::types::QoS;
use bytes::{Buf, BufMut};

macro_rules! define_ack_packet {
    (
        $(#[$meta:meta])*
        $name:ident, $type_name:literal, $qos:expr
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub struct $name {
            pub packet_id: u16,
        }

        impl $name {
            #[must_use]
            pub fn new(packet_id: u16) -> Self {
                Self { packet_id }
            }

            pub(crate) fn encode_body<B: BufMut>(&self, buf: &mut B) {
                buf.put_u16(self.packet_id);
            }

            pub(crate) fn decode_body<B: Buf>(buf: &mut B, header: &FixedHeader) -> Result<Self> {
                header.expect_flags($qos)?;
                if header.remaining_length != 2 {
                    return Err(MqttError::MalformedPacket(concat!(
                        $type_name,
                        " must have remaining length 2"
                    )
                    .to_string()));
                }
                Ok(Self {
                    packet_id: buf.get_u16(),
                })
            }
        }
    };
}

define_ack_packet!(
    /// QoS 1 publish acknowledgment.
    PubAckPacket, "PUBACK", QoS::AtMostOnce
);
define_ack_packet!(
    /// First QoS 2 acknowledgment: publish received.
    PubRecPacket, "PUBREC", QoS::AtMostOnce
);
define_ack_packet!(
    /// Second QoS 2 acknowledgment: publish release. The only
    /// acknowledgment whose fixed-header QoS bits are 0b01 (MQTT-3.6.1-1).
    PubRelPacket, "PUBREL", QoS::AtLeastOnce
);
define_ack_packet!(
    /// Final QoS 2 acknowledgment: publish complete.
    PubCompPacket, "PUBCOMP", QoS::AtMostOnce
);
define_ack_packet!(
    /// Unsubscribe acknowledgment.
    UnsubAckPacket, "UNSUBACK", QoS::AtMostOnce
);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::{Packet, PacketType};

    #[test]
    fn test_ack_round_trips() {
        let cases = [
            (Packet::Puback(PubAckPacket::new(1)), PacketType::Puback),
            (Packet::Pubrec(PubRecPacket::new(500)), PacketType::Pubrec),
            (Packet::Pubrel(PubRelPacket::new(65535)), PacketType::Pubrel),
            (Packet::Pubcomp(PubCompPacket::new(7)), PacketType::Pubcomp),
            (Packet::Unsuback(UnsubAckPacket::new(9)), PacketType::Unsuback),
        ];
        for (packet, packet_type) in cases {
            let bytes = packet.encode().unwrap();
            assert_eq!(bytes.len(), 4);
            let (decoded, consumed) = Packet::decode(&bytes).unwrap();
            assert_eq!(consumed, 4);
            assert_eq!(decoded, packet);
            assert_eq!(decoded.packet_type(), packet_type);
        }
    }

    #[test]
    fn test_pubrel_fixed_header_qos_bit() {
        let bytes = Packet::Pubrel(PubRelPacket::new(10)).encode().unwrap();
        assert_eq!(bytes[0], 0x62);

        // PUBREL with QoS 0 flags is malformed
        let result = Packet::decode(&[0x60, 0x02, 0x00, 0x0A]);
        assert!(matches!(result, Err(MqttError::MalformedPacket(_))));
    }

    #[test]
    fn test_puback_with_qos_flag_rejected() {
        let result = Packet::decode(&[0x42, 0x02, 0x00, 0x01]);
        assert!(matches!(result, Err(MqttError::MalformedPacket(_))));
    }

    #[test]
    fn test_ack_wrong_remaining_length_rejected() {
        let result = Packet::decode(&[0x40, 0x03, 0x00, 0x01, 0x00]);
        assert!(matches!(result, Err(MqttError::MalformedPacket(_))));

        let result = Packet::decode(&[0x40, 0x01, 0x00]);
        assert!(matches!(result, Err(MqttError::MalformedPacket(_))));
    }
}
