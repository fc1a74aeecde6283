use crate::error::{MqttError, Result};
use crate::packet::FixedHeader;
use crate::types::QoS;
use bytes::{Buf, BufMut};

/// Per-filter SUBACK return code: a granted QoS or the failure marker
/// (MQTT-3.8.4-5).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SubscribeReturnCode {
    GrantedQoS0 = 0x00,
    GrantedQoS1 = 0x01,
    GrantedQoS2 = 0x02,
    Failure = 0x80,
}

impl SubscribeReturnCode {
    #[must_use]
    pub fn granted(qos: QoS) -> Self {
        match qos {
            QoS::AtMostOnce => SubscribeReturnCode::GrantedQoS0,
            QoS::AtLeastOnce => SubscribeReturnCode::GrantedQoS1,
            QoS::ExactlyOnce => SubscribeReturnCode::GrantedQoS2,
        }
    }

    #[must_use]
    pub fn is_failure(self) -> bool {
        self == SubscribeReturnCode::Failure
    }
}

impl TryFrom<u8> for SubscribeReturnCode {
    type Error = MqttError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0x00 => Ok(SubscribeReturnCode::GrantedQoS0),
            0x01 => Ok(SubscribeReturnCode::GrantedQoS1),
            0x02 => Ok(SubscribeReturnCode::GrantedQoS2),
            0x80 => Ok(SubscribeReturnCode::Failure),
            _ => Err(MqttError::MalformedPacket(format!(
                "invalid SUBACK return code: 0x{value:02X}"
            ))),
        }
    }
}

/// MQTT SUBACK packet: return codes in the same order as the SUBSCRIBE
/// request, under the same packet identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubAckPacket {
    pub packet_id: u16,
    pub return_codes: Vec<SubscribeReturnCode>,
}

impl SubAckPacket {
    #[must_use]
    pub fn new(packet_id: u16, return_codes: Vec<SubscribeReturnCode>) -> Self {
        Self {
            packet_id,
            return_codes,
        }
    }

    pub(crate) fn encode_body<B: BufMut>(&self, buf: &mut B) {
        buf.put_u16(self.packet_id);
        for code in &self.return_codes {
            buf.put_u8(*code as u8);
        }
    }

    pub(crate) fn decode_body<B: Buf>(buf: &mut B, header: &FixedHeader) -> Result<Self> {
        header.expect_flags(QoS::AtMostOnce)?;
        if buf.remaining() < 2 {
            return Err(MqttError::MalformedPacket(
                "SUBACK missing packet identifier".to_string(),
            ));
        }
        let packet_id = buf.get_u16();
        let mut return_codes = Vec::with_capacity(buf.remaining());
        while buf.has_remaining() {
            return_codes.push(SubscribeReturnCode::try_from(buf.get_u8())?);
        }
        Ok(Self {
            packet_id,
            return_codes,
        })
    }
}
