//! Test support: an in-memory transport that records everything the core
//! sends, decodable back into packets for assertions.

use crate::transport::Transport;
use mqttv311_protocol::packet::Packet;
use parking_lot::Mutex;
use std::sync::Arc;

#[derive(Debug, Default)]
struct MockState {
    sent: Vec<u8>,
    closed: bool,
}

/// A cloneable in-memory [`Transport`]. Clones share state, so a test can
/// hand one clone to the broker or client and inspect the other.
#[derive(Debug, Clone, Default)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
}

impl MockTransport {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw bytes written so far, without consuming them.
    #[must_use]
    pub fn sent_bytes(&self) -> Vec<u8> {
        self.state.lock().sent.clone()
    }

    /// Drains the raw bytes written so far, e.g. to shuttle them into the
    /// other end of a simulated connection.
    pub fn take_bytes(&self) -> Vec<u8> {
        std::mem::take(&mut self.state.lock().sent)
    }

    /// Decodes and drains every packet written so far.
    ///
    /// # Panics
    /// Panics when the recorded stream holds malformed or truncated
    /// packets; tests treat that as a failure.
    pub fn take_packets(&self) -> Vec<Packet> {
        let bytes = std::mem::take(&mut self.state.lock().sent);
        let mut packets = Vec::new();
        let mut offset = 0;
        while offset < bytes.len() {
            let (packet, consumed) =
                Packet::decode(&bytes[offset..]).expect("mock transport holds a complete packet");
            packets.push(packet);
            offset += consumed;
        }
        packets
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }
}

impl Transport for MockTransport {
    fn send(&mut self, bytes: &[u8]) {
        self.state.lock().sent.extend_from_slice(bytes);
    }

    fn close(&mut self) {
        self.state.lock().closed = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_transport_records_and_decodes() {
        let transport = MockTransport::new();
        let mut handle: Box<dyn Transport> = Box::new(transport.clone());
        handle.send(&Packet::Pingreq.encode().unwrap());
        handle.send(&Packet::Pingresp.encode().unwrap());

        let packets = transport.take_packets();
        assert_eq!(packets, vec![Packet::Pingreq, Packet::Pingresp]);
        assert!(transport.take_packets().is_empty());

        handle.close();
        assert!(transport.is_closed());
    }
}
