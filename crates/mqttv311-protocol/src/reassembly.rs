//! Per-connection reassembly of a raw byte stream into complete packets.
//!
//! The transport hands the protocol arbitrary byte chunks; a chunk may hold
//! a fraction of a packet or several packets back to back. Partial data is
//! buffered untouched until more bytes arrive.

use crate::error::{MqttError, Result};
use crate::packet::Packet;
use crate::types::ConnectionId;
use bytes::{Buf, BytesMut};
use std::collections::HashMap;

/// Append-only byte accumulator per connection, draining complete packets
/// from the front.
#[derive(Debug, Default)]
pub struct StreamBuffer {
    buffers: HashMap<ConnectionId, BytesMut>,
}

impl StreamBuffer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, connection: ConnectionId, bytes: &[u8]) {
        self.buffers
            .entry(connection)
            .or_default()
            .extend_from_slice(bytes);
    }

    #[must_use]
    pub fn has_pending_packet(&self, connection: ConnectionId) -> bool {
        self.buffers.get(&connection).is_some_and(|b| !b.is_empty())
    }

    /// Attempts to decode one packet from the front of the connection's
    /// buffer.
    ///
    /// `Ok(Some(packet))` consumes exactly the packet's bytes.
    /// `Ok(None)` means the buffer holds an incomplete packet; it is left
    /// untouched and the caller must wait for more bytes. Any error is a
    /// malformed packet and fatal for the connection.
    pub fn next_packet(&mut self, connection: ConnectionId) -> Result<Option<Packet>> {
        let Some(buffer) = self.buffers.get_mut(&connection) else {
            return Ok(None);
        };
        match Packet::decode(buffer) {
            Ok((packet, consumed)) => {
                buffer.advance(consumed);
                Ok(Some(packet))
            }
            Err(MqttError::InsufficientData) => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Drops buffered bytes for a closed connection.
    pub fn remove(&mut self, connection: ConnectionId) {
        self.buffers.remove(&connection);
    }
}
