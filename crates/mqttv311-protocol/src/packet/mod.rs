//! MQTT 3.1.1 control packets: the fixed header, the closed `Packet`
//! variant type over all fourteen packet kinds, and the encode/decode
//! entry points used by the stream reassembler.

pub mod ack;
pub mod connack;
pub mod connect;
pub mod publish;
pub mod suback;
pub mod subscribe;
pub mod unsubscribe;

use crate::encoding::{decode_remaining_length, encode_remaining_length};
use crate::error::{MqttError, Result};
use crate::types::QoS;
use bytes::{Buf, BufMut, BytesMut};
use std::fmt;

pub use ack::{PubAckPacket, PubCompPacket, PubRecPacket, PubRelPacket, UnsubAckPacket};
pub use connack::ConnAckPacket;
pub use connect::ConnectPacket;
pub use publish::PublishPacket;
pub use suback::SubAckPacket;
pub use subscribe::SubscribePacket;
pub use unsubscribe::UnsubscribePacket;

/// The four-bit control packet type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PacketType {
    Connect = 1,
    Connack = 2,
    Publish = 3,
    Puback = 4,
    Pubrec = 5,
    Pubrel = 6,
    Pubcomp = 7,
    Subscribe = 8,
    Suback = 9,
    Unsubscribe = 10,
    Unsuback = 11,
    Pingreq = 12,
    Pingresp = 13,
    Disconnect = 14,
}

impl PacketType {
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            PacketType::Connect => "CONNECT",
            PacketType::Connack => "CONNACK",
            PacketType::Publish => "PUBLISH",
            PacketType::Puback => "PUBACK",
            PacketType::Pubrec => "PUBREC",
            PacketType::Pubrel => "PUBREL",
            PacketType::Pubcomp => "PUBCOMP",
            PacketType::Subscribe => "SUBSCRIBE",
            PacketType::Suback => "SUBACK",
            PacketType::Unsubscribe => "UNSUBSCRIBE",
            PacketType::Unsuback => "UNSUBACK",
            PacketType::Pingreq => "PINGREQ",
            PacketType::Pingresp => "PINGRESP",
            PacketType::Disconnect => "DISCONNECT",
        }
    }
}

impl TryFrom<u8> for PacketType {
    type Error = MqttError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            1 => Ok(PacketType::Connect),
            2 => Ok(PacketType::Connack),
            3 => Ok(PacketType::Publish),
            4 => Ok(PacketType::Puback),
            5 => Ok(PacketType::Pubrec),
            6 => Ok(PacketType::Pubrel),
            7 => Ok(PacketType::Pubcomp),
            8 => Ok(PacketType::Subscribe),
            9 => Ok(PacketType::Suback),
            10 => Ok(PacketType::Unsubscribe),
            11 => Ok(PacketType::Unsuback),
            12 => Ok(PacketType::Pingreq),
            13 => Ok(PacketType::Pingresp),
            14 => Ok(PacketType::Disconnect),
            _ => Err(MqttError::InvalidPacketType(value)),
        }
    }
}

impl fmt::Display for PacketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The fixed header present on every control packet: packet type, the
/// DUP/QoS/Retain flag bits, and the remaining length of the body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedHeader {
    pub packet_type: PacketType,
    pub dup: bool,
    pub qos: QoS,
    pub retain: bool,
    pub remaining_length: u32,
}

impl FixedHeader {
    #[must_use]
    pub fn new(packet_type: PacketType, remaining_length: u32) -> Self {
        Self {
            packet_type,
            dup: false,
            qos: QoS::AtMostOnce,
            retain: false,
            remaining_length,
        }
    }

    pub fn encode<B: BufMut>(&self, buf: &mut B) -> Result<()> {
        let byte = (self.packet_type as u8) << 4
            | u8::from(self.dup) << 3
            | self.qos.as_u8() << 1
            | u8::from(self.retain);
        buf.put_u8(byte);
        encode_remaining_length(buf, self.remaining_length)
    }

    /// Decodes the fixed header from the front of `buf`, returning the
    /// header and its encoded length.
    pub fn decode(buf: &[u8]) -> Result<(Self, usize)> {
        let Some(&b0) = buf.first() else {
            return Err(MqttError::InsufficientData);
        };
        let packet_type = PacketType::try_from(b0 >> 4)?;
        let qos = QoS::try_from((b0 >> 1) & 0x03)?;
        let (remaining_length, len_bytes) = decode_remaining_length(&buf[1..])?;
        Ok((
            Self {
                packet_type,
                dup: (b0 >> 3) & 1 == 1,
                qos,
                retain: b0 & 1 == 1,
                remaining_length,
            },
            1 + len_bytes,
        ))
    }

    /// Checks the flag bits against the values mandated for this packet
    /// type (MQTT-2.2.2-1/-2).
    pub(crate) fn expect_flags(&self, qos: QoS) -> Result<()> {
        if self.dup || self.retain || self.qos != qos {
            return Err(MqttError::MalformedPacket(format!(
                "invalid {} flags: DUP={} QoS={} Retain={}",
                self.packet_type, self.dup, self.qos, self.retain
            )));
        }
        Ok(())
    }

    pub(crate) fn expect_empty(&self) -> Result<()> {
        self.expect_flags(QoS::AtMostOnce)?;
        if self.remaining_length != 0 {
            return Err(MqttError::MalformedPacket(format!(
                "{} must have remaining length 0",
                self.packet_type
            )));
        }
        Ok(())
    }
}

impl fmt::Display for FixedHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} DUP={} QoS={} Retain={}",
            self.packet_type, self.dup, self.qos, self.retain
        )
    }
}

/// A decoded MQTT 3.1.1 control packet.
///
/// An immutable value object once decoded; encoding is a pure function of
/// the value. Dispatching over this enum keeps packet handling exhaustive:
/// adding a packet kind without a handler fails to compile.
#[derive(Debug, Clone, PartialEq)]
pub enum Packet {
    Connect(Box<ConnectPacket>),
    Connack(ConnAckPacket),
    Publish(PublishPacket),
    Puback(PubAckPacket),
    Pubrec(PubRecPacket),
    Pubrel(PubRelPacket),
    Pubcomp(PubCompPacket),
    Subscribe(SubscribePacket),
    Suback(SubAckPacket),
    Unsubscribe(UnsubscribePacket),
    Unsuback(UnsubAckPacket),
    Pingreq,
    Pingresp,
    Disconnect,
}

impl Packet {
    #[must_use]
    pub fn packet_type(&self) -> PacketType {
        match self {
            Packet::Connect(_) => PacketType::Connect,
            Packet::Connack(_) => PacketType::Connack,
            Packet::Publish(_) => PacketType::Publish,
            Packet::Puback(_) => PacketType::Puback,
            Packet::Pubrec(_) => PacketType::Pubrec,
            Packet::Pubrel(_) => PacketType::Pubrel,
            Packet::Pubcomp(_) => PacketType::Pubcomp,
            Packet::Subscribe(_) => PacketType::Subscribe,
            Packet::Suback(_) => PacketType::Suback,
            Packet::Unsubscribe(_) => PacketType::Unsubscribe,
            Packet::Unsuback(_) => PacketType::Unsuback,
            Packet::Pingreq => PacketType::Pingreq,
            Packet::Pingresp => PacketType::Pingresp,
            Packet::Disconnect => PacketType::Disconnect,
        }
    }

    /// Encodes the packet into wire bytes: fixed header, minimal-length
    /// remaining-length varint, then the body.
    pub fn encode(&self) -> Result<BytesMut> {
        let mut body = BytesMut::new();
        let mut header = match self {
            Packet::Connect(p) => {
                p.encode_body(&mut body)?;
                FixedHeader::new(PacketType::Connect, 0)
            }
            Packet::Connack(p) => {
                p.encode_body(&mut body);
                FixedHeader::new(PacketType::Connack, 0)
            }
            Packet::Publish(p) => {
                p.encode_body(&mut body)?;
                let mut header = FixedHeader::new(PacketType::Publish, 0);
                header.dup = p.dup;
                header.qos = p.qos;
                header.retain = p.retain;
                header
            }
            Packet::Puback(p) => {
                p.encode_body(&mut body);
                FixedHeader::new(PacketType::Puback, 0)
            }
            Packet::Pubrec(p) => {
                p.encode_body(&mut body);
                FixedHeader::new(PacketType::Pubrec, 0)
            }
            Packet::Pubrel(p) => {
                p.encode_body(&mut body);
                let mut header = FixedHeader::new(PacketType::Pubrel, 0);
                header.qos = QoS::AtLeastOnce;
                header
            }
            Packet::Pubcomp(p) => {
                p.encode_body(&mut body);
                FixedHeader::new(PacketType::Pubcomp, 0)
            }
            Packet::Subscribe(p) => {
                p.encode_body(&mut body)?;
                let mut header = FixedHeader::new(PacketType::Subscribe, 0);
                header.qos = QoS::AtLeastOnce;
                header
            }
            Packet::Suback(p) => {
                p.encode_body(&mut body);
                FixedHeader::new(PacketType::Suback, 0)
            }
            Packet::Unsubscribe(p) => {
                p.encode_body(&mut body)?;
                let mut header = FixedHeader::new(PacketType::Unsubscribe, 0);
                header.qos = QoS::AtLeastOnce;
                header
            }
            Packet::Unsuback(p) => {
                p.encode_body(&mut body);
                FixedHeader::new(PacketType::Unsuback, 0)
            }
            Packet::Pingreq => FixedHeader::new(PacketType::Pingreq, 0),
            Packet::Pingresp => FixedHeader::new(PacketType::Pingresp, 0),
            Packet::Disconnect => FixedHeader::new(PacketType::Disconnect, 0),
        };
        #[allow(clippy::cast_possible_truncation)]
        {
            header.remaining_length = body.len() as u32;
        }
        let mut out = BytesMut::with_capacity(body.len() + 5);
        header.encode(&mut out)?;
        out.extend_from_slice(&body);
        Ok(out)
    }

    /// Decodes one packet from the front of `buf`.
    ///
    /// Returns the packet and the total number of bytes it occupied.
    /// `InsufficientData` means the buffer holds less than the declared
    /// packet length and the caller must wait for more bytes; every other
    /// error is a malformed packet.
    pub fn decode(buf: &[u8]) -> Result<(Self, usize)> {
        let (header, header_len) = FixedHeader::decode(buf)?;
        let total = header_len + header.remaining_length as usize;
        if buf.len() < total {
            return Err(MqttError::InsufficientData);
        }
        let mut body = &buf[header_len..total];
        let packet = match header.packet_type {
            PacketType::Connect => {
                Packet::Connect(Box::new(ConnectPacket::decode_body(&mut body, &header)?))
            }
            PacketType::Connack => Packet::Connack(ConnAckPacket::decode_body(&mut body, &header)?),
            PacketType::Publish => Packet::Publish(PublishPacket::decode_body(&mut body, &header)?),
            PacketType::Puback => Packet::Puback(PubAckPacket::decode_body(&mut body, &header)?),
            PacketType::Pubrec => Packet::Pubrec(PubRecPacket::decode_body(&mut body, &header)?),
            PacketType::Pubrel => Packet::Pubrel(PubRelPacket::decode_body(&mut body, &header)?),
            PacketType::Pubcomp => Packet::Pubcomp(PubCompPacket::decode_body(&mut body, &header)?),
            PacketType::Subscribe => {
                Packet::Subscribe(SubscribePacket::decode_body(&mut body, &header)?)
            }
            PacketType::Suback => Packet::Suback(SubAckPacket::decode_body(&mut body, &header)?),
            PacketType::Unsubscribe => {
                Packet::Unsubscribe(UnsubscribePacket::decode_body(&mut body, &header)?)
            }
            PacketType::Unsuback => Packet::Unsuback(UnsubAckPacket::decode_body(&mut body, &header)?),
            PacketType::Pingreq => {
                header.expect_empty()?;
                Packet::Pingreq
            }
            PacketType::Pingresp => {
                header.expect_empty()?;
                Packet::Pingresp
            }
            PacketType::Disconnect => {
                header.expect_empty()?;
                Packet::Disconnect
            }
        };
        if body.has_remaining() {
            return Err(MqttError::MalformedPacket(format!(
                "{} body not fully consumed: {} trailing bytes",
                header.packet_type,
                body.remaining()
            )));
        }
        Ok((packet, total))
    }
}

impl fmt::Display for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Packet::Connect(p) => write!(
                f,
                "CONNECT client_id={} clean_session={} keep_alive={}",
                p.client_id, p.clean_session, p.keep_alive
            ),
            Packet::Connack(p) => write!(
                f,
                "CONNACK session_present={} return_code={:?}",
                p.session_present, p.return_code
            ),
            Packet::Publish(p) => {
                write!(
                    f,
                    "PUBLISH topic={} QoS={} DUP={} Retain={}",
                    p.topic, p.qos, p.dup, p.retain
                )?;
                if let Some(id) = p.packet_id {
                    write!(f, " id={id}")?;
                }
                Ok(())
            }
            Packet::Puback(p) => write!(f, "PUBACK id={}", p.packet_id),
            Packet::Pubrec(p) => write!(f, "PUBREC id={}", p.packet_id),
            Packet::Pubrel(p) => write!(f, "PUBREL id={}", p.packet_id),
            Packet::Pubcomp(p) => write!(f, "PUBCOMP id={}", p.packet_id),
            Packet::Subscribe(p) => write!(f, "SUBSCRIBE id={} filters={}", p.packet_id, p.filters.len()),
            Packet::Suback(p) => write!(f, "SUBACK id={} codes={}", p.packet_id, p.return_codes.len()),
            Packet::Unsubscribe(p) => {
                write!(f, "UNSUBSCRIBE id={} filters={}", p.packet_id, p.filters.len())
            }
            Packet::Unsuback(p) => write!(f, "UNSUBACK id={}", p.packet_id),
            Packet::Pingreq => f.write_str("PINGREQ"),
            Packet::Pingresp => f.write_str("PINGRESP"),
            Packet::Disconnect => f.write_str("DISCONNECT"),
        }
    }
}
