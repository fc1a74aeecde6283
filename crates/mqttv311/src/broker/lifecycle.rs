//! Connection teardown: graceful disconnects, abrupt terminations with
//! will delivery, and keep-alive enforcement.

use super::Broker;
use mqttv311_protocol::packet::publish::PublishPacket;
use mqttv311_protocol::types::ConnectionId;
use std::time::Instant;
use tracing::info;

impl Broker {
    /// An orderly DISCONNECT packet: the will is discarded without being
    /// published (MQTT-3.14.4-3), then the session detaches.
    pub(super) fn handle_client_disconnect(&mut self, connection: ConnectionId) {
        if let Some(client_id) = self.bindings.get(&connection) {
            if let Some(session) = self.sessions.get_mut(client_id) {
                session.clear_will();
            }
        }
        self.graceful_disconnect(connection);
    }

    /// Notification from the driver that a connection died without a
    /// DISCONNECT. The will, if any, is published before the session
    /// detaches (MQTT-3.1.2-8).
    pub fn connection_closed(&mut self, connection: ConnectionId) {
        self.terminate_connection(connection);
    }

    /// Periodic keep-alive tick for one connection, driven externally.
    /// Terminates the connection abruptly when its last activity is older
    /// than 1.5x the negotiated keep-alive interval (MQTT-3.1.2-22).
    pub fn keepalive_check(&mut self, connection: ConnectionId) {
        self.keepalive_check_at(connection, Instant::now());
    }

    /// Injectable form of [`Broker::keepalive_check`].
    pub fn keepalive_check_at(&mut self, connection: ConnectionId, now: Instant) {
        let Some(client_id) = self.bindings.get(&connection) else {
            return;
        };
        let expired = self
            .sessions
            .get(client_id)
            .is_some_and(|session| session.keepalive_expired(now));
        if expired {
            info!(%connection, "keep-alive timeout");
            self.terminate_connection(connection);
        }
    }

    /// Abrupt termination: publishes the will, then performs the same
    /// state transition as a graceful disconnect.
    pub(super) fn terminate_connection(&mut self, connection: ConnectionId) {
        if let Some(client_id) = self.bindings.get(&connection).cloned() {
            let will = self
                .sessions
                .get_mut(&client_id)
                .and_then(crate::session::Session::take_will);
            if let Some(will) = will {
                info!(client_id = %client_id, topic = %will.topic, "publishing will message");
                let packet = PublishPacket::new(will.topic, will.payload, will.qos)
                    .with_retain(will.retain);
                self.route_publish(&packet);
            }
        }
        self.graceful_disconnect(connection);
    }

    /// Detaches the session from its connection and closes the transport.
    /// Clean sessions are discarded with their subscriptions
    /// (MQTT-3.1.2-6); persistent sessions keep subscriptions and
    /// in-flight tracks but lose their will (MQTT-3.1.2-10).
    pub(super) fn graceful_disconnect(&mut self, connection: ConnectionId) {
        if let Some(client_id) = self.bindings.remove(&connection) {
            let clean = if let Some(session) = self.sessions.get_mut(&client_id) {
                session.connected = false;
                session.connection = None;
                session.clear_will();
                session.clean_session
            } else {
                false
            };
            if clean {
                info!(client_id = %client_id, "discarding clean session state");
                self.sessions.remove(&client_id);
                self.store.clear_subscriptions(&client_id);
            } else {
                info!(client_id = %client_id, "session state persisted across disconnect");
            }
        }
        self.close_connection(connection);
    }

    /// Drops the transport and any buffered bytes for a connection.
    pub(super) fn close_connection(&mut self, connection: ConnectionId) {
        if let Some(mut transport) = self.transports.remove(&connection) {
            transport.close();
        }
        self.stream.remove(connection);
    }
}
