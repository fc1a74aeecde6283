//! In-flight delivery state for one endpoint: the QoS 1/2 acknowledgment
//! machines, the inbound exactly-once dedup record, and message-identifier
//! allocation. Used unchanged by the broker's per-session state and by the
//! client.

use crate::packet::ack::PubRelPacket;
use crate::packet::publish::PublishPacket;
use crate::packet::Packet;
use crate::types::QoS;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use tracing::warn;

/// Delivery sub-state of an outbound QoS 1/2 publication.
///
/// QoS 1 stays `Sent` until PUBACK removes it. QoS 2 moves `Sent` →
/// `AwaitingPubComp` on PUBREC and is removed on PUBCOMP.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutboundState {
    Sent,
    AwaitingPubComp,
}

#[derive(Debug, Clone)]
struct OutboundPublish {
    packet: PublishPacket,
    state: OutboundState,
}

/// Tracks one endpoint's in-flight publications in both directions.
///
/// Outbound entries keep their original send order so that reconnect
/// replay preserves publication order (MQTT-4.6.0-6). The ordered list
/// may also hold queued QoS 0 publications for a disconnected session
/// when the drop-QoS-0 policy is off; those replay once and are dropped.
#[derive(Debug, Default)]
pub struct InflightTracker {
    outbound: Vec<OutboundPublish>,
    inbound: HashMap<u16, PublishPacket>,
    next_id: u16,
}

impl InflightTracker {
    #[must_use]
    pub fn new() -> Self {
        Self {
            outbound: Vec::new(),
            inbound: HashMap::new(),
            next_id: 1,
        }
    }

    /// Allocates the next message identifier: 1→65535→1, skipping 0.
    ///
    /// Collision with a still-in-flight identifier is not checked; the
    /// 16-bit range and low concurrent in-flight volume make this
    /// practically safe, but it is a documented constraint rather than an
    /// invariant.
    pub fn next_packet_id(&mut self) -> u16 {
        let id = self.next_id;
        self.next_id = if id == 65535 { 1 } else { id + 1 };
        id
    }

    /// Records an outbound publication awaiting acknowledgment (or a
    /// queued QoS 0 publication for a disconnected session).
    pub fn track_outbound(&mut self, packet: PublishPacket) {
        self.outbound.push(OutboundPublish {
            packet,
            state: OutboundState::Sent,
        });
    }

    #[must_use]
    pub fn outbound_len(&self) -> usize {
        self.outbound.len()
    }

    #[must_use]
    pub fn inbound_len(&self) -> usize {
        self.inbound.len()
    }

    #[must_use]
    pub fn outbound_state(&self, packet_id: u16) -> Option<OutboundState> {
        self.find(packet_id).map(|i| self.outbound[i].state)
    }

    fn find(&self, packet_id: u16) -> Option<usize> {
        self.outbound
            .iter()
            .position(|o| o.packet.packet_id == Some(packet_id))
    }

    /// PUBACK received: completes a QoS 1 delivery.
    ///
    /// A PUBACK for a QoS 2 message or an unknown identifier is a local
    /// inconsistency: reported and ignored.
    pub fn acknowledge(&mut self, packet_id: u16) {
        match self.find(packet_id) {
            Some(index) if self.outbound[index].packet.qos == QoS::AtLeastOnce => {
                self.outbound.remove(index);
            }
            Some(index) => warn!(
                packet_id,
                qos = %self.outbound[index].packet.qos,
                "PUBACK received for message with wrong QoS"
            ),
            None => warn!(packet_id, "PUBACK received for unknown message"),
        }
    }

    /// PUBREC received: advances a QoS 2 delivery to `AwaitingPubComp`.
    ///
    /// Returns true when the caller must answer with PUBREL. A PUBREC for
    /// a message not in `Sent` state, with the wrong QoS, or unknown is
    /// reported and ignored.
    pub fn record_receipt(&mut self, packet_id: u16) -> bool {
        match self.find(packet_id) {
            Some(index) if self.outbound[index].packet.qos == QoS::ExactlyOnce => {
                if self.outbound[index].state == OutboundState::Sent {
                    self.outbound[index].state = OutboundState::AwaitingPubComp;
                    true
                } else {
                    warn!(packet_id, "PUBREC received for message in wrong state");
                    false
                }
            }
            Some(index) => {
                warn!(
                    packet_id,
                    qos = %self.outbound[index].packet.qos,
                    "PUBREC received for message with wrong QoS"
                );
                false
            }
            None => {
                warn!(packet_id, "PUBREC received for unknown message");
                false
            }
        }
    }

    /// PUBCOMP received: completes a QoS 2 delivery.
    pub fn complete(&mut self, packet_id: u16) {
        match self.find(packet_id) {
            Some(index) if self.outbound[index].packet.qos == QoS::ExactlyOnce => {
                if self.outbound[index].state == OutboundState::AwaitingPubComp {
                    self.outbound.remove(index);
                } else {
                    warn!(packet_id, "PUBCOMP received for message in wrong state");
                }
            }
            Some(index) => warn!(
                packet_id,
                qos = %self.outbound[index].packet.qos,
                "PUBCOMP received for message with wrong QoS"
            ),
            None => warn!(packet_id, "PUBCOMP received for unknown message"),
        }
    }

    /// Records an inbound QoS 2 publication awaiting release.
    ///
    /// Returns true when the identifier was not yet tracked; a duplicate
    /// PUBLISH before release keeps the first record and returns false so
    /// the caller does not re-deliver.
    pub fn record_inbound(&mut self, packet: PublishPacket) -> bool {
        let Some(packet_id) = packet.packet_id else {
            return false;
        };
        match self.inbound.entry(packet_id) {
            Entry::Vacant(entry) => {
                entry.insert(packet);
                true
            }
            Entry::Occupied(_) => false,
        }
    }

    /// PUBREL received: removes and returns the recorded inbound
    /// publication, if any.
    pub fn release_inbound(&mut self, packet_id: u16) -> Option<PublishPacket> {
        self.inbound.remove(&packet_id)
    }

    /// Produces the reconnect replay, in original send order: queued QoS 0
    /// publications once (then dropped), QoS 1 and QoS 2 `Sent` as PUBLISH
    /// with DUP set and the identifier unchanged (MQTT-4.4.0-2,
    /// MQTT-2.3.1-4), QoS 2 `AwaitingPubComp` as PUBREL.
    pub fn resend_packets(&mut self) -> Vec<Packet> {
        let mut packets = Vec::with_capacity(self.outbound.len());
        for outbound in &mut self.outbound {
            match (outbound.packet.qos, outbound.state) {
                (QoS::AtMostOnce, _) => packets.push(Packet::Publish(outbound.packet.clone())),
                (QoS::AtLeastOnce | QoS::ExactlyOnce, OutboundState::Sent) => {
                    outbound.packet.dup = true;
                    packets.push(Packet::Publish(outbound.packet.clone()));
                }
                (_, OutboundState::AwaitingPubComp) => {
                    if let Some(packet_id) = outbound.packet.packet_id {
                        packets.push(Packet::Pubrel(PubRelPacket::new(packet_id)));
                    }
                }
            }
        }
        self.outbound.retain(|o| o.packet.qos != QoS::AtMostOnce);
        packets
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn publish(id: u16, qos: QoS) -> PublishPacket {
        PublishPacket::new("t", Bytes::from_static(b"payload"), qos).with_packet_id(id)
    }

    #[test]
    fn test_packet_id_wraps_skipping_zero() {
        let mut tracker = InflightTracker::new();
        assert_eq!(tracker.next_packet_id(), 1);
        assert_eq!(tracker.next_packet_id(), 2);
        tracker.next_id = 65535;
        assert_eq!(tracker.next_packet_id(), 65535);
        assert_eq!(tracker.next_packet_id(), 1);
    }

    #[test]
    fn test_qos1_flow() {
        let mut tracker = InflightTracker::new();
        tracker.track_outbound(publish(5, QoS::AtLeastOnce));
        assert_eq!(tracker.outbound_state(5), Some(OutboundState::Sent));

        tracker.acknowledge(5);
        assert_eq!(tracker.outbound_len(), 0);
    }

    #[test]
    fn test_qos2_flow() {
        let mut tracker = InflightTracker::new();
        tracker.track_outbound(publish(6, QoS::ExactlyOnce));

        assert!(tracker.record_receipt(6));
        assert_eq!(tracker.outbound_state(6), Some(OutboundState::AwaitingPubComp));

        // A second PUBREC must not trigger another PUBREL.
        assert!(!tracker.record_receipt(6));

        tracker.complete(6);
        assert_eq!(tracker.outbound_len(), 0);
    }

    #[test]
    fn test_inconsistent_acks_ignored() {
        let mut tracker = InflightTracker::new();
        tracker.track_outbound(publish(7, QoS::ExactlyOnce));

        // PUBACK for a QoS 2 message, and acks for unknown identifiers.
        tracker.acknowledge(7);
        tracker.acknowledge(99);
        assert!(!tracker.record_receipt(99));
        tracker.complete(99);
        tracker.complete(7); // still Sent, wrong state
        assert_eq!(tracker.outbound_len(), 1);
    }

    #[test]
    fn test_inbound_dedup() {
        let mut tracker = InflightTracker::new();
        assert!(tracker.record_inbound(publish(5, QoS::ExactlyOnce)));
        assert!(!tracker.record_inbound(publish(5, QoS::ExactlyOnce)));
        assert_eq!(tracker.inbound_len(), 1);

        let released = tracker.release_inbound(5).unwrap();
        assert_eq!(released.packet_id, Some(5));
        assert!(tracker.release_inbound(5).is_none());
    }

    #[test]
    fn test_resend_sets_dup_and_keeps_ids() {
        let mut tracker = InflightTracker::new();
        tracker.track_outbound(publish(1, QoS::AtLeastOnce));
        tracker.track_outbound(publish(2, QoS::ExactlyOnce));
        tracker.track_outbound(publish(3, QoS::ExactlyOnce));
        assert!(tracker.record_receipt(3));

        let packets = tracker.resend_packets();
        assert_eq!(packets.len(), 3);
        match &packets[0] {
            Packet::Publish(p) => {
                assert!(p.dup);
                assert_eq!(p.packet_id, Some(1));
            }
            other => panic!("expected PUBLISH, got {other}"),
        }
        match &packets[1] {
            Packet::Publish(p) => {
                assert!(p.dup);
                assert_eq!(p.packet_id, Some(2));
            }
            other => panic!("expected PUBLISH, got {other}"),
        }
        match &packets[2] {
            Packet::Pubrel(p) => assert_eq!(p.packet_id, 3),
            other => panic!("expected PUBREL, got {other}"),
        }

        // The in-flight entries survive for the next reconnect.
        assert_eq!(tracker.outbound_len(), 3);
    }

    #[test]
    fn test_resend_drains_queued_qos0() {
        let mut tracker = InflightTracker::new();
        tracker.track_outbound(PublishPacket::new("t", Bytes::new(), QoS::AtMostOnce));
        tracker.track_outbound(publish(1, QoS::AtLeastOnce));

        let packets = tracker.resend_packets();
        assert_eq!(packets.len(), 2);
        match &packets[0] {
            Packet::Publish(p) => assert!(!p.dup),
            other => panic!("expected PUBLISH, got {other}"),
        }
        assert_eq!(tracker.outbound_len(), 1);
    }
}
