use crate::encoding::{decode_binary, decode_string, encode_binary, encode_string};
use crate::error::{MqttError, Result};
use crate::packet::FixedHeader;
use crate::types::{QoS, Will};
use bytes::{Buf, BufMut, Bytes};

/// Connect flag bit positions (MQTT-3.1.2).
const FLAG_RESERVED: u8 = 0x01;
const FLAG_CLEAN_SESSION: u8 = 0x02;
const FLAG_WILL: u8 = 0x04;
const FLAG_WILL_RETAIN: u8 = 0x20;
const FLAG_PASSWORD: u8 = 0x40;
const FLAG_USERNAME: u8 = 0x80;

/// MQTT CONNECT packet.
///
/// The protocol name and version decode leniently; whether they are
/// acceptable is a dispatch decision (silent close for a foreign name,
/// CONNACK return code 1 for an unsupported version). Everything else is
/// validated here and is malformed on violation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectPacket {
    pub protocol_name: String,
    pub protocol_version: u8,
    pub clean_session: bool,
    pub keep_alive: u16,
    pub client_id: String,
    pub will: Option<Will>,
    pub username: Option<String>,
    pub password: Option<Bytes>,
}

impl ConnectPacket {
    #[must_use]
    pub fn new(client_id: impl Into<String>) -> Self {
        Self {
            protocol_name: "MQTT".to_string(),
            protocol_version: 4,
            clean_session: true,
            keep_alive: 60,
            client_id: client_id.into(),
            will: None,
            username: None,
            password: None,
        }
    }

    #[must_use]
    pub fn with_clean_session(mut self, clean_session: bool) -> Self {
        self.clean_session = clean_session;
        self
    }

    #[must_use]
    pub fn with_keep_alive(mut self, seconds: u16) -> Self {
        self.keep_alive = seconds;
        self
    }

    #[must_use]
    pub fn with_will(mut self, will: Will) -> Self {
        self.will = Some(will);
        self
    }

    #[must_use]
    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: Option<Bytes>,
    ) -> Self {
        self.username = Some(username.into());
        self.password = password;
        self
    }

    fn connect_flags(&self) -> u8 {
        let mut flags = 0;
        if self.clean_session {
            flags |= FLAG_CLEAN_SESSION;
        }
        if let Some(will) = &self.will {
            flags |= FLAG_WILL | will.qos.as_u8() << 3;
            if will.retain {
                flags |= FLAG_WILL_RETAIN;
            }
        }
        if self.username.is_some() {
            flags |= FLAG_USERNAME;
        }
        if self.password.is_some() {
            flags |= FLAG_PASSWORD;
        }
        flags
    }

    pub(crate) fn encode_body<B: BufMut>(&self, buf: &mut B) -> Result<()> {
        encode_string(buf, &self.protocol_name)?;
        buf.put_u8(self.protocol_version);
        buf.put_u8(self.connect_flags());
        buf.put_u16(self.keep_alive);
        encode_string(buf, &self.client_id)?;
        if let Some(will) = &self.will {
            encode_string(buf, &will.topic)?;
            encode_binary(buf, &will.payload)?;
        }
        if let Some(username) = &self.username {
            encode_string(buf, username)?;
        }
        if let Some(password) = &self.password {
            encode_binary(buf, password)?;
        }
        Ok(())
    }

    pub(crate) fn decode_body<B: Buf>(buf: &mut B, header: &FixedHeader) -> Result<Self> {
        header.expect_flags(QoS::AtMostOnce)?;

        let protocol_name = decode_string(buf)?;
        if !buf.has_remaining() {
            return Err(MqttError::MalformedPacket(
                "CONNECT missing protocol version".to_string(),
            ));
        }
        let protocol_version = buf.get_u8();

        if buf.remaining() < 3 {
            return Err(MqttError::MalformedPacket(
                "CONNECT missing connect flags or keep alive".to_string(),
            ));
        }
        let flags = buf.get_u8();
        if flags & FLAG_RESERVED != 0 {
            return Err(MqttError::MalformedPacket(
                "CONNECT reserved flag bit must be zero".to_string(),
            ));
        }
        let clean_session = flags & FLAG_CLEAN_SESSION != 0;
        let will_flag = flags & FLAG_WILL != 0;
        let will_qos_bits = (flags >> 3) & 0x03;
        let will_retain = flags & FLAG_WILL_RETAIN != 0;
        let password_flag = flags & FLAG_PASSWORD != 0;
        let username_flag = flags & FLAG_USERNAME != 0;

        if !will_flag && (will_qos_bits != 0 || will_retain) {
            return Err(MqttError::MalformedPacket(
                "CONNECT will QoS and will retain must be zero without will flag".to_string(),
            ));
        }
        if password_flag && !username_flag {
            return Err(MqttError::MalformedPacket(
                "CONNECT password flag set without username flag".to_string(),
            ));
        }
        let will_qos = QoS::try_from(will_qos_bits)?;

        let keep_alive = buf.get_u16();
        let client_id = decode_string(buf)?;

        let will = if will_flag {
            let topic = decode_string(buf)?;
            let payload = decode_binary(buf)?;
            Some(Will {
                topic,
                payload,
                qos: will_qos,
                retain: will_retain,
            })
        } else {
            None
        };

        let username = if username_flag {
            Some(decode_string(buf)?)
        } else {
            None
        };
        let password = if password_flag {
            Some(decode_binary(buf)?)
        } else {
            None
        };

        Ok(Self {
            protocol_name,
            protocol_version,
            clean_session,
            keep_alive,
            client_id,
            will,
            username,
            password,
        })
    }
}
