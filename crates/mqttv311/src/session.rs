//! Per-client session state, independent of any one connection.
//!
//! A session with `clean_session = false` survives disconnects and keeps
//! its in-flight tracks; a clean session is discarded when its connection
//! goes away. The client-side counterpart drives the same state.

use mqttv311_protocol::inflight::InflightTracker;
use mqttv311_protocol::packet::publish::PublishPacket;
use mqttv311_protocol::packet::Packet;
use mqttv311_protocol::types::{ConnectionId, QoS, Will};
use bytes::Bytes;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// A session times out when no packet arrived within 1.5x its keep-alive
/// interval (MQTT-3.1.2-22): 1500 milliseconds of grace per interval
/// second.
const KEEPALIVE_GRACE_MILLIS_PER_SECOND: u64 = 1500;

#[derive(Debug)]
pub struct Session {
    pub client_id: String,
    pub clean_session: bool,
    /// Keep-alive interval in seconds; zero disables the timeout.
    pub keep_alive: u16,
    pub connected: bool,
    /// The live connection currently bound to this session, if any. Must
    /// agree with the broker's connection table while connected.
    pub connection: Option<ConnectionId>,
    pub will: Option<Will>,
    /// Token handed to the authorization collaborator; the CONNECT
    /// username when one was presented.
    pub auth_token: Option<String>,
    last_packet: Instant,
    drop_qos0: bool,
    inflight: InflightTracker,
}

impl Session {
    #[must_use]
    pub fn new(client_id: impl Into<String>, drop_qos0: bool) -> Self {
        Self {
            client_id: client_id.into(),
            clean_session: true,
            keep_alive: 60,
            connected: false,
            connection: None,
            will: None,
            auth_token: None,
            last_packet: Instant::now(),
            drop_qos0,
            inflight: InflightTracker::new(),
        }
    }

    /// A publication arrived for this session to deliver to its peer.
    ///
    /// QoS 1/2 publications get a fresh message identifier and enter the
    /// outbound in-flight track. Returns the packet to put on the wire,
    /// or `None` when the session is disconnected (QoS 1/2 wait for the
    /// next connection; QoS 0 is queued or dropped per policy).
    pub fn outbound_publish(
        &mut self,
        topic: &str,
        payload: Bytes,
        qos: QoS,
        retain: bool,
    ) -> Option<Packet> {
        let mut packet = PublishPacket::new(topic, payload, qos).with_retain(retain);
        if qos != QoS::AtMostOnce {
            let packet_id = self.inflight.next_packet_id();
            packet = packet.with_packet_id(packet_id);
            self.inflight.track_outbound(packet.clone());
        }
        if self.connected {
            return Some(Packet::Publish(packet));
        }
        match qos {
            QoS::AtMostOnce if self.drop_qos0 => {
                debug!(
                    client_id = %self.client_id,
                    topic,
                    "dropping QoS 0 message for disconnected session"
                );
            }
            QoS::AtMostOnce => self.inflight.track_outbound(packet),
            _ => debug!(
                client_id = %self.client_id,
                topic,
                "storing QoS 1/2 message for disconnected session"
            ),
        }
        None
    }

    /// The reconnect replay of every outstanding outbound message
    /// (MQTT-4.4.0-1).
    pub fn resend_packets(&mut self) -> Vec<Packet> {
        let packets = self.inflight.resend_packets();
        if !packets.is_empty() {
            info!(
                client_id = %self.client_id,
                count = packets.len(),
                "resending unfinished publications"
            );
        }
        packets
    }

    pub fn handle_puback(&mut self, packet_id: u16) {
        self.inflight.acknowledge(packet_id);
    }

    /// Returns true when a PUBREL must be sent in response (MQTT-3.5.4-1).
    pub fn handle_pubrec(&mut self, packet_id: u16) -> bool {
        self.inflight.record_receipt(packet_id)
    }

    pub fn handle_pubcomp(&mut self, packet_id: u16) {
        self.inflight.complete(packet_id);
    }

    /// Returns true when this identifier was not yet in the inbound track
    /// and the publication may be delivered.
    pub fn record_inbound(&mut self, packet: PublishPacket) -> bool {
        self.inflight.record_inbound(packet)
    }

    pub fn release_inbound(&mut self, packet_id: u16) -> Option<PublishPacket> {
        self.inflight.release_inbound(packet_id)
    }

    /// Allocates a message identifier for a non-publish send (SUBSCRIBE,
    /// UNSUBSCRIBE).
    pub fn next_packet_id(&mut self) -> u16 {
        self.inflight.next_packet_id()
    }

    #[must_use]
    pub fn outbound_len(&self) -> usize {
        self.inflight.outbound_len()
    }

    /// Records packet activity for keep-alive accounting.
    pub fn touch(&mut self) {
        self.last_packet = Instant::now();
    }

    #[must_use]
    pub fn keepalive_expired(&self, now: Instant) -> bool {
        if self.keep_alive == 0 {
            return false;
        }
        let grace =
            Duration::from_millis(u64::from(self.keep_alive) * KEEPALIVE_GRACE_MILLIS_PER_SECOND);
        now.duration_since(self.last_packet) > grace
    }

    pub fn take_will(&mut self) -> Option<Will> {
        self.will.take()
    }

    pub fn clear_will(&mut self) {
        self.will = None;
    }
}
