//! CONNECT handling: protocol checks, client-identifier rules, session
//! takeover and resume, authentication, and the in-flight replay.

use super::Broker;
use crate::session::Session;
use mqttv311_protocol::packet::connack::{ConnAckPacket, ConnectReturnCode};
use mqttv311_protocol::packet::connect::ConnectPacket;
use mqttv311_protocol::packet::Packet;
use mqttv311_protocol::types::ConnectionId;
use tracing::{error, info};

impl Broker {
    pub(super) fn handle_connect(&mut self, connection: ConnectionId, packet: ConnectPacket) {
        if self.bindings.contains_key(&connection) {
            // MQTT-3.1.0-2: a second CONNECT is a protocol violation. The
            // session disconnects cleanly, so no will is published.
            error!(%connection, "second CONNECT on connection");
            self.graceful_disconnect(connection);
            return;
        }
        if packet.protocol_name != "MQTT" {
            // MQTT-3.1.2-1: close without any response.
            error!(
                %connection,
                protocol_name = %packet.protocol_name,
                "wrong protocol name, closing connection"
            );
            self.close_connection(connection);
            return;
        }
        if packet.protocol_version != 4 {
            // MQTT-3.1.2-2
            error!(
                %connection,
                protocol_version = packet.protocol_version,
                "unsupported protocol version"
            );
            self.refuse(connection, ConnectReturnCode::RefusedProtocolVersion);
            return;
        }

        let mut client_id = packet.client_id.clone();
        if client_id.is_empty() {
            // MQTT-3.1.3-7/-8: only acceptable with clean session, and
            // only when the broker assigns identifiers.
            if !self.config.allow_zero_length_client_ids || !packet.clean_session {
                info!(%connection, "rejecting zero-length client identifier");
                self.refuse(connection, ConnectReturnCode::RefusedIdentifierRejected);
                return;
            }
            client_id = self.generate_client_id();
            info!(%connection, client_id = %client_id, "assigned generated client identifier");
        }

        // MQTT-3.1.4-2: a second connection under the same identifier
        // unbinds the old one before the new session attaches.
        let old_connection = self
            .sessions
            .get(&client_id)
            .and_then(|session| session.connection);
        if let Some(old_connection) = old_connection {
            info!(client_id = %client_id, %old_connection, "client identifier takeover, disconnecting old connection");
            self.graceful_disconnect(old_connection);
        }

        // MQTT-3.1.3-2: the identifier retrieves existing session state
        // unless a clean session was requested.
        let resumed = !packet.clean_session && self.sessions.contains_key(&client_id);

        if !self.authenticate(packet.username.as_deref(), packet.password.as_deref()) {
            // MQTT-3.2.2-5
            info!(client_id = %client_id, "authentication failed");
            self.refuse(connection, ConnectReturnCode::RefusedBadCredentials);
            return;
        }

        if packet.clean_session {
            // MQTT-3.1.2-6: discard any prior state held under this
            // identifier.
            self.sessions.remove(&client_id);
            self.store.clear_subscriptions(&client_id);
        }

        let drop_qos0 = self.config.drop_qos0_when_disconnected;
        let session = self
            .sessions
            .entry(client_id.clone())
            .or_insert_with(|| Session::new(client_id.clone(), drop_qos0));
        session.clean_session = packet.clean_session;
        session.keep_alive = packet.keep_alive;
        session.auth_token = packet.username.clone();
        session.will = packet.will.clone();
        session.connected = true;
        session.connection = Some(connection);
        session.touch();
        self.bindings.insert(connection, client_id.clone());

        info!(client_id = %client_id, %connection, resumed, "client connected");
        self.send_packet(
            connection,
            &Packet::Connack(ConnAckPacket::new(resumed, ConnectReturnCode::Accepted)),
        );

        // MQTT-4.4.0-1: replay outstanding in-flight messages before any
        // new traffic.
        let replay = self
            .sessions
            .get_mut(&client_id)
            .map(Session::resend_packets)
            .unwrap_or_default();
        for packet in replay {
            self.send_packet(connection, &packet);
        }
    }

    fn refuse(&mut self, connection: ConnectionId, return_code: ConnectReturnCode) {
        self.send_packet(connection, &Packet::Connack(ConnAckPacket::refused(return_code)));
        self.close_connection(connection);
    }

    fn authenticate(&self, username: Option<&str>, password: Option<&[u8]>) -> bool {
        self.security
            .as_ref()
            .is_none_or(|checker| checker.authenticate(username, password))
    }

    fn generate_client_id(&mut self) -> String {
        loop {
            self.generated_ids += 1;
            let client_id = format!("auto-{}", self.generated_ids);
            if !self.sessions.contains_key(&client_id) {
                return client_id;
            }
        }
    }
}
