//! SUBSCRIBE/UNSUBSCRIBE handling: per-filter authorization, retained
//! seeding, and the acknowledgment packets.

use super::Broker;
use mqttv311_protocol::packet::ack::UnsubAckPacket;
use mqttv311_protocol::packet::suback::{SubAckPacket, SubscribeReturnCode};
use mqttv311_protocol::packet::subscribe::SubscribePacket;
use mqttv311_protocol::packet::unsubscribe::UnsubscribePacket;
use mqttv311_protocol::packet::Packet;
use mqttv311_protocol::types::{ConnectionId, QoS};
use tracing::{debug, info};

impl Broker {
    pub(super) fn handle_subscribe(&mut self, connection: ConnectionId, packet: &SubscribePacket) {
        let Some(client_id) = self.client_id_for(connection) else {
            return;
        };
        // MQTT-3.8.4-5, MQTT-3.9.3-1: one return code per filter, in
        // request order.
        let mut return_codes = Vec::with_capacity(packet.filters.len());
        for request in &packet.filters {
            if self.can_subscribe(&client_id, &request.filter) {
                self.store
                    .subscribe(&client_id, &request.filter, request.qos);
                // MQTT-2.1.2-7: matching retained messages seed the new
                // subscription before the SUBACK goes out.
                self.seed_retained(&client_id, &request.filter, request.qos);
                return_codes.push(SubscribeReturnCode::granted(request.qos));
            } else {
                info!(client_id = %client_id, filter = %request.filter, "subscription denied");
                return_codes.push(SubscribeReturnCode::Failure);
            }
        }
        // MQTT-3.8.4-1/-2: SUBACK under the same identifier.
        self.send_packet(
            connection,
            &Packet::Suback(SubAckPacket::new(packet.packet_id, return_codes)),
        );
    }

    pub(super) fn handle_unsubscribe(
        &mut self,
        connection: ConnectionId,
        packet: &UnsubscribePacket,
    ) {
        let Some(client_id) = self.client_id_for(connection) else {
            return;
        };
        for filter in &packet.filters {
            if !self.store.unsubscribe(&client_id, filter) {
                // MQTT-3.10.4-5: acknowledged regardless.
                debug!(client_id = %client_id, filter = %filter, "unsubscribe matched nothing");
            }
        }
        // MQTT-3.10.4-4: UNSUBACK under the same identifier, always.
        self.send_packet(
            connection,
            &Packet::Unsuback(UnsubAckPacket::new(packet.packet_id)),
        );
    }

    /// Delivers every retained message matching a fresh subscription, at
    /// `min(retained QoS, granted QoS)` and with the retain flag set
    /// (MQTT-2.1.2-9).
    fn seed_retained(&mut self, client_id: &str, filter: &str, granted_qos: QoS) {
        let mut seeds = Vec::new();
        for topic in self.store.retained_topics(filter) {
            if let Some(retained) = self.store.retained(&topic) {
                seeds.push((topic, retained.payload.clone(), retained.qos));
            }
        }
        for (topic, payload, qos) in seeds {
            self.deliver(client_id, &topic, payload, qos.min(granted_qos), true);
        }
    }

    fn can_subscribe(&self, client_id: &str, filter: &str) -> bool {
        let Some(checker) = &self.security else {
            return true;
        };
        let token = self
            .sessions
            .get(client_id)
            .and_then(|session| session.auth_token.as_deref());
        checker.can_subscribe(token, filter)
    }
}
