//! PUBLISH routing and acknowledgment handling: per-QoS responses, the
//! inbound exactly-once track, authorization, and subscriber fan-out.

use super::Broker;
use mqttv311_protocol::error::{MqttError, Result};
use mqttv311_protocol::packet::ack::{PubAckPacket, PubCompPacket, PubRecPacket, PubRelPacket};
use mqttv311_protocol::packet::publish::PublishPacket;
use mqttv311_protocol::packet::Packet;
use mqttv311_protocol::types::{ConnectionId, QoS};
use bytes::Bytes;
use tracing::{info, warn};

impl Broker {
    pub(super) fn handle_publish(
        &mut self,
        connection: ConnectionId,
        packet: &PublishPacket,
    ) -> Result<()> {
        if packet.topic.contains('+') || packet.topic.contains('#') {
            // MQTT-3.3.2-2: wildcards are forbidden in published topic
            // names.
            return Err(MqttError::ProtocolViolation(format!(
                "wildcard in published topic name: {}",
                packet.topic
            )));
        }
        let Some(client_id) = self.client_id_for(connection) else {
            return Ok(());
        };
        match packet.qos {
            QoS::AtMostOnce => self.publish_message(&client_id, packet)?,
            QoS::AtLeastOnce => {
                let Some(packet_id) = packet.packet_id else {
                    return Err(MqttError::MalformedPacket(
                        "QoS 1 PUBLISH without packet identifier".to_string(),
                    ));
                };
                self.publish_message(&client_id, packet)?;
                // MQTT-2.3.1-6: PUBACK carries the publish identifier.
                self.send_packet(connection, &Packet::Puback(PubAckPacket::new(packet_id)));
            }
            QoS::ExactlyOnce => {
                let Some(packet_id) = packet.packet_id else {
                    return Err(MqttError::MalformedPacket(
                        "QoS 2 PUBLISH without packet identifier".to_string(),
                    ));
                };
                let first_receipt = self
                    .sessions
                    .get_mut(&client_id)
                    .is_some_and(|session| session.record_inbound(packet.clone()));
                // A repeated identifier before release never re-delivers.
                if first_receipt && !self.config.publish_on_pubrel {
                    self.publish_message(&client_id, packet)?;
                }
                self.send_packet(connection, &Packet::Pubrec(PubRecPacket::new(packet_id)));
            }
        }
        Ok(())
    }

    /// PUBACK: the peer confirmed reception of a QoS 1 publish.
    pub(super) fn handle_puback(&mut self, connection: ConnectionId, packet_id: u16) {
        if let Some(session) = self.session_for_mut(connection) {
            session.handle_puback(packet_id);
        }
    }

    /// PUBREC: first half of the QoS 2 handshake; answered with PUBREL
    /// (MQTT-3.5.4-1).
    pub(super) fn handle_pubrec(&mut self, connection: ConnectionId, packet_id: u16) {
        let advanced = self
            .session_for_mut(connection)
            .is_some_and(|session| session.handle_pubrec(packet_id));
        if advanced {
            self.send_packet(connection, &Packet::Pubrel(PubRelPacket::new(packet_id)));
        }
    }

    /// PUBREL: releases an inbound QoS 2 publication. PUBCOMP is sent
    /// unconditionally, even for an unknown identifier (MQTT-3.6.4-1).
    pub(super) fn handle_pubrel(&mut self, connection: ConnectionId, packet_id: u16) -> Result<()> {
        let Some(client_id) = self.client_id_for(connection) else {
            return Ok(());
        };
        let released = self
            .sessions
            .get_mut(&client_id)
            .and_then(|session| session.release_inbound(packet_id));
        match released {
            Some(publish) => {
                if self.config.publish_on_pubrel {
                    self.publish_message(&client_id, &publish)?;
                }
            }
            None => warn!(client_id = %client_id, packet_id, "PUBREL for unknown message identifier"),
        }
        self.send_packet(connection, &Packet::Pubcomp(PubCompPacket::new(packet_id)));
        Ok(())
    }

    /// PUBCOMP: the peer completed a QoS 2 delivery.
    pub(super) fn handle_pubcomp(&mut self, connection: ConnectionId, packet_id: u16) {
        if let Some(session) = self.session_for_mut(connection) {
            session.handle_pubcomp(packet_id);
        }
    }

    /// Authorization gate in front of the fan-out. Denial terminates the
    /// publishing connection (MQTT-3.3.5-2).
    pub(super) fn publish_message(
        &mut self,
        publisher: &str,
        packet: &PublishPacket,
    ) -> Result<()> {
        if let Some(checker) = &self.security {
            let token = self
                .sessions
                .get(publisher)
                .and_then(|session| session.auth_token.clone());
            if !checker.can_publish(token.as_deref(), &packet.topic) {
                info!(
                    client_id = publisher,
                    topic = %packet.topic,
                    "unauthorized publish"
                );
                return Err(MqttError::NotAuthorized);
            }
        }
        self.route_publish(packet);
        Ok(())
    }

    /// Updates the retained store and fans the publication out to every
    /// matching subscriber. Will messages route here directly, without an
    /// authorization check.
    pub(super) fn route_publish(&mut self, packet: &PublishPacket) {
        if packet.retain {
            // MQTT-2.1.2-6
            self.store
                .set_retained(&packet.topic, packet.payload.clone(), packet.qos);
        }
        for subscriber in self.store.subscribers(&packet.topic) {
            if self.config.overlapping_single_delivery {
                // Single delivery at the subscriber's maximum matching
                // QoS (MQTT-3.3.5-1).
                let Some(qos) = self.store.qos_of(&subscriber, &packet.topic) else {
                    continue;
                };
                self.deliver(&subscriber, &packet.topic, packet.payload.clone(), qos, false);
            } else {
                let qos_levels: Vec<QoS> = self
                    .store
                    .subscriptions_matching(&packet.topic, &subscriber)
                    .iter()
                    .map(|subscription| subscription.qos.min(packet.qos))
                    .collect();
                for qos in qos_levels {
                    self.deliver(&subscriber, &packet.topic, packet.payload.clone(), qos, false);
                }
            }
        }
    }

    /// Hands one publication to one subscriber's session and puts the
    /// resulting packet on its connection, when it has one.
    pub(super) fn deliver(
        &mut self,
        client_id: &str,
        topic: &str,
        payload: Bytes,
        qos: QoS,
        retain: bool,
    ) {
        let Some(session) = self.sessions.get_mut(client_id) else {
            return;
        };
        let connection = session.connection;
        let outgoing = session.outbound_publish(topic, payload, qos, retain);
        if let (Some(packet), Some(connection)) = (outgoing, connection) {
            self.send_packet(connection, &packet);
        }
    }

    fn session_for_mut(&mut self, connection: ConnectionId) -> Option<&mut crate::session::Session> {
        let client_id = self.bindings.get(&connection)?;
        self.sessions.get_mut(client_id)
    }
}
