use crate::error::{MqttError, Result};
use crate::packet::FixedHeader;
use crate::types::QoS;
use bytes::{Buf, BufMut};

/// CONNACK return codes (MQTT-3.2.2.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectReturnCode {
    Accepted = 0,
    RefusedProtocolVersion = 1,
    RefusedIdentifierRejected = 2,
    RefusedServerUnavailable = 3,
    RefusedBadCredentials = 4,
    RefusedNotAuthorized = 5,
}

impl TryFrom<u8> for ConnectReturnCode {
    type Error = MqttError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(ConnectReturnCode::Accepted),
            1 => Ok(ConnectReturnCode::RefusedProtocolVersion),
            2 => Ok(ConnectReturnCode::RefusedIdentifierRejected),
            3 => Ok(ConnectReturnCode::RefusedServerUnavailable),
            4 => Ok(ConnectReturnCode::RefusedBadCredentials),
            5 => Ok(ConnectReturnCode::RefusedNotAuthorized),
            _ => Err(MqttError::MalformedPacket(format!(
                "invalid CONNACK return code: {value}"
            ))),
        }
    }
}

/// MQTT CONNACK packet: the session-present flag and a return code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnAckPacket {
    pub session_present: bool,
    pub return_code: ConnectReturnCode,
}

impl ConnAckPacket {
    #[must_use]
    pub fn new(session_present: bool, return_code: ConnectReturnCode) -> Self {
        Self {
            session_present,
            return_code,
        }
    }

    #[must_use]
    pub fn refused(return_code: ConnectReturnCode) -> Self {
        Self::new(false, return_code)
    }

    pub(crate) fn encode_body<B: BufMut>(&self, buf: &mut B) {
        buf.put_u8(u8::from(self.session_present));
        buf.put_u8(self.return_code as u8);
    }

    pub(crate) fn decode_body<B: Buf>(buf: &mut B, header: &FixedHeader) -> Result<Self> {
        header.expect_flags(QoS::AtMostOnce)?;
        if header.remaining_length != 2 {
            return Err(MqttError::MalformedPacket(
                "CONNACK must have remaining length 2".to_string(),
            ));
        }
        let ack_flags = buf.get_u8();
        if ack_flags & !0x01 != 0 {
            return Err(MqttError::MalformedPacket(
                "CONNACK acknowledge flags must be zero except session present".to_string(),
            ));
        }
        let return_code = ConnectReturnCode::try_from(buf.get_u8())?;
        Ok(Self {
            session_present: ack_flags & 0x01 == 1,
            return_code,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::Packet;

    #[test]
    fn test_connack_round_trip() {
        for (present, code) in [
            (false, ConnectReturnCode::Accepted),
            (true, ConnectReturnCode::Accepted),
            (false, ConnectReturnCode::RefusedProtocolVersion),
            (false, ConnectReturnCode::RefusedBadCredentials),
        ] {
            let packet = Packet::Connack(ConnAckPacket::new(present, code));
            let bytes = packet.encode().unwrap();
            assert_eq!(bytes.len(), 4);
            let (decoded, _) = Packet::decode(&bytes).unwrap();
            assert_eq!(decoded, packet);
        }
    }

    #[test]
    fn test_connack_invalid_ack_flags_rejected() {
        // session-present byte with a reserved bit set
        let result = Packet::decode(&[0x20, 0x02, 0x02, 0x00]);
        assert!(matches!(result, Err(MqttError::MalformedPacket(_))));
    }

    #[test]
    fn test_connack_wrong_remaining_length_rejected() {
        let result = Packet::decode(&[0x20, 0x03, 0x00, 0x00, 0x00]);
        assert!(matches!(result, Err(MqttError::MalformedPacket(_))));
    }

    #[test]
    fn test_connack_invalid_return_code_rejected() {
        let result = Packet::decode(&[0x20, 0x02, 0x00, 0x06]);
        assert!(matches!(result, Err(MqttError::MalformedPacket(_))));
    }
}
