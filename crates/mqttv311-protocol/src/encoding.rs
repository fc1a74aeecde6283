//! Primitive field encoding shared by all packet bodies: big-endian
//! integers, length-prefixed UTF-8 strings, length-prefixed binary data,
//! and the variable-length remaining-length integer.

use crate::error::{MqttError, Result};
use bytes::{Buf, BufMut, Bytes};

/// Largest value representable by the four-byte remaining-length encoding.
pub const MAX_REMAINING_LENGTH: u32 = 268_435_455;

/// Encodes a remaining-length value in the minimal number of bytes
/// (1-4, seven data bits plus a continuation bit per byte).
pub fn encode_remaining_length<B: BufMut>(buf: &mut B, value: u32) -> Result<()> {
    if value > MAX_REMAINING_LENGTH {
        return Err(MqttError::PacketTooLarge(value as usize));
    }
    let mut x = value;
    loop {
        #[allow(clippy::cast_possible_truncation)]
        let mut digit = (x % 128) as u8;
        x /= 128;
        if x > 0 {
            digit |= 0x80;
        }
        buf.put_u8(digit);
        if x == 0 {
            return Ok(());
        }
    }
}

/// Decodes a remaining-length value from the front of `buf`.
///
/// Returns the value and the number of bytes consumed. A buffer that ends
/// mid-encoding is `InsufficientData`; a fourth byte that still carries the
/// continuation bit is `MalformedPacket` (encoding overflow), per
/// MQTT-2.2.3.
pub fn decode_remaining_length(buf: &[u8]) -> Result<(u32, usize)> {
    let mut value = 0u32;
    let mut multiplier = 1u32;
    for i in 0..4 {
        let Some(&digit) = buf.get(i) else {
            return Err(MqttError::InsufficientData);
        };
        value += u32::from(digit & 0x7F) * multiplier;
        if digit & 0x80 == 0 {
            return Ok((value, i + 1));
        }
        multiplier *= 128;
    }
    Err(MqttError::MalformedPacket(
        "remaining length exceeds four bytes".to_string(),
    ))
}

/// Encodes a UTF-8 string with a two-byte big-endian length prefix.
pub fn encode_string<B: BufMut>(buf: &mut B, s: &str) -> Result<()> {
    if s.len() > 65535 {
        return Err(MqttError::StringTooLong(s.len()));
    }
    #[allow(clippy::cast_possible_truncation)]
    buf.put_u16(s.len() as u16);
    buf.put_slice(s.as_bytes());
    Ok(())
}

/// Decodes a length-prefixed UTF-8 string.
///
/// Rejects invalid UTF-8 (which also excludes the surrogate range
/// U+D800-U+DFFF, per MQTT-1.5.3-1), embedded NUL (MQTT-1.5.3-2), and
/// embedded U+FEFF (MQTT-1.5.3-3). Insufficient body bytes here are
/// malformed, not incomplete: the caller only decodes bodies once the full
/// packet is buffered.
pub fn decode_string<B: Buf>(buf: &mut B) -> Result<String> {
    let raw = decode_binary(buf)?;
    let s = std::str::from_utf8(&raw)
        .map_err(|_| MqttError::MalformedPacket("invalid UTF-8 in string field".to_string()))?;
    if s.contains('\u{0000}') {
        return Err(MqttError::MalformedPacket(
            "NUL character in string field".to_string(),
        ));
    }
    if s.contains('\u{FEFF}') {
        return Err(MqttError::MalformedPacket(
            "U+FEFF in string field".to_string(),
        ));
    }
    Ok(s.to_string())
}

/// Encodes binary data with a two-byte big-endian length prefix.
pub fn encode_binary<B: BufMut>(buf: &mut B, data: &[u8]) -> Result<()> {
    if data.len() > 65535 {
        return Err(MqttError::StringTooLong(data.len()));
    }
    #[allow(clippy::cast_possible_truncation)]
    buf.put_u16(data.len() as u16);
    buf.put_slice(data);
    Ok(())
}

/// Decodes a length-prefixed binary field without UTF-8 validation.
pub fn decode_binary<B: Buf>(buf: &mut B) -> Result<Bytes> {
    if buf.remaining() < 2 {
        return Err(MqttError::MalformedPacket(
            "missing length prefix".to_string(),
        ));
    }
    let len = buf.get_u16() as usize;
    if buf.remaining() < len {
        return Err(MqttError::MalformedPacket(
            "length-prefixed field exceeds available data".to_string(),
        ));
    }
    Ok(buf.copy_to_bytes(len))
}
