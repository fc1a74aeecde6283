//! The broker dispatch: the per-connection state machine, packet routing,
//! subscription fan-out, and session lifecycle.
//!
//! All authoritative state (session table, subscription and retained
//! store, connection bindings) is owned here and mutated by nothing else.
//! The broker takes `&mut self` on every driver call and performs no
//! internal locking: the embedder serializes access, either by handling
//! network events on one thread or by wrapping the broker in a single
//! writer lock.

mod config;
mod connect;
mod lifecycle;
mod publish;
mod subscribe;

pub use config::BrokerConfig;

use crate::security::SecurityChecker;
use crate::session::Session;
use crate::subscription::SubscriptionStore;
use crate::transport::Transport;
use mqttv311_protocol::error::{MqttError, Result};
use mqttv311_protocol::packet::{Packet, PacketType};
use mqttv311_protocol::reassembly::StreamBuffer;
use mqttv311_protocol::types::ConnectionId;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, warn};

/// One in-process MQTT 3.1.1 broker instance.
///
/// An explicit value with an explicit constructor and reset, never a
/// process-wide singleton.
pub struct Broker {
    config: BrokerConfig,
    security: Option<Arc<dyn SecurityChecker>>,
    /// Sessions keyed by client identifier; entries outlive connections
    /// for non-clean sessions.
    sessions: HashMap<String, Session>,
    /// Connection handle -> bound client identifier. Agrees with
    /// `Session::connection` while connected.
    bindings: HashMap<ConnectionId, String>,
    transports: HashMap<ConnectionId, Box<dyn Transport>>,
    store: SubscriptionStore,
    stream: StreamBuffer,
    generated_ids: u64,
}

impl Broker {
    #[must_use]
    pub fn new(config: BrokerConfig) -> Self {
        Self {
            config,
            security: None,
            sessions: HashMap::new(),
            bindings: HashMap::new(),
            transports: HashMap::new(),
            store: SubscriptionStore::new(),
            stream: StreamBuffer::new(),
            generated_ids: 0,
        }
    }

    #[must_use]
    pub fn with_security_checker(mut self, checker: Arc<dyn SecurityChecker>) -> Self {
        self.security = Some(checker);
        self
    }

    /// Forgets all broker state: sessions, subscriptions, retained
    /// messages, bindings, and registered transports.
    pub fn reinitialize(&mut self) {
        debug!("reinitializing broker");
        self.sessions.clear();
        self.bindings.clear();
        self.transports.clear();
        self.store.clear();
        self.stream = StreamBuffer::new();
        self.generated_ids = 0;
    }

    #[must_use]
    pub fn config(&self) -> &BrokerConfig {
        &self.config
    }

    /// Registers the transport for a freshly accepted connection. The
    /// connection stays `UNAUTHENTICATED` until its CONNECT arrives.
    pub fn connection_opened(&mut self, connection: ConnectionId, transport: Box<dyn Transport>) {
        if self.transports.insert(connection, transport).is_some() {
            warn!(%connection, "replacing transport for an already registered connection");
        }
    }

    /// Feeds raw bytes received on a connection, draining every complete
    /// packet. Returns true when a DISCONNECT was observed; the caller
    /// should then drop the transport.
    ///
    /// A malformed packet or protocol violation abruptly terminates the
    /// connection (will delivered, MQTT-4.8.0-1) and no further bytes
    /// from this buffer are processed.
    pub fn handle_request(&mut self, connection: ConnectionId, bytes: &[u8]) -> bool {
        self.stream.append(connection, bytes);
        loop {
            if !self.transports.contains_key(&connection) {
                // A handler closed the connection; drop whatever follows.
                return false;
            }
            match self.stream.next_packet(connection) {
                Ok(Some(packet)) => match self.handle_packet(connection, packet) {
                    Ok(false) => {}
                    Ok(true) => return true,
                    Err(err) => {
                        error!(%connection, error = %err, "protocol error, terminating connection");
                        self.terminate_connection(connection);
                        return false;
                    }
                },
                Ok(None) => return false,
                Err(err) => {
                    error!(%connection, error = %err, "malformed packet, terminating connection");
                    self.terminate_connection(connection);
                    return false;
                }
            }
        }
    }

    /// Routes one decoded packet to its handler. Returns true on
    /// DISCONNECT.
    fn handle_packet(&mut self, connection: ConnectionId, packet: Packet) -> Result<bool> {
        debug!(%connection, packet = %packet, "inbound");
        let packet_type = packet.packet_type();
        if packet_type != PacketType::Connect && !self.bindings.contains_key(&connection) {
            return Err(MqttError::ProtocolViolation(
                "CONNECT was not the first packet on this connection".to_string(),
            ));
        }
        let terminate = match packet {
            Packet::Connect(p) => {
                self.handle_connect(connection, *p);
                false
            }
            Packet::Publish(p) => {
                self.handle_publish(connection, &p)?;
                false
            }
            Packet::Puback(p) => {
                self.handle_puback(connection, p.packet_id);
                false
            }
            Packet::Pubrec(p) => {
                self.handle_pubrec(connection, p.packet_id);
                false
            }
            Packet::Pubrel(p) => {
                self.handle_pubrel(connection, p.packet_id)?;
                false
            }
            Packet::Pubcomp(p) => {
                self.handle_pubcomp(connection, p.packet_id);
                false
            }
            Packet::Subscribe(p) => {
                self.handle_subscribe(connection, &p);
                false
            }
            Packet::Unsubscribe(p) => {
                self.handle_unsubscribe(connection, &p);
                false
            }
            Packet::Pingreq => {
                // MQTT-3.12.4-1
                self.send_packet(connection, &Packet::Pingresp);
                false
            }
            Packet::Disconnect => {
                self.handle_client_disconnect(connection);
                true
            }
            Packet::Connack(_) | Packet::Suback(_) | Packet::Unsuback(_) | Packet::Pingresp => {
                return Err(MqttError::ProtocolViolation(format!(
                    "{packet_type} is not valid from a client"
                )));
            }
        };
        if let Some(client_id) = self.bindings.get(&connection) {
            if let Some(session) = self.sessions.get_mut(client_id) {
                session.touch();
            }
        }
        Ok(terminate)
    }

    /// Encodes and writes a packet to a connection's transport.
    fn send_packet(&mut self, connection: ConnectionId, packet: &Packet) {
        let Some(transport) = self.transports.get_mut(&connection) else {
            debug!(%connection, packet = %packet, "dropping packet for unregistered connection");
            return;
        };
        match packet.encode() {
            Ok(bytes) => {
                debug!(%connection, packet = %packet, "outbound");
                transport.send(&bytes);
            }
            Err(err) => error!(%connection, packet = %packet, error = %err, "failed to encode packet"),
        }
    }

    fn client_id_for(&self, connection: ConnectionId) -> Option<String> {
        self.bindings.get(&connection).cloned()
    }

    #[must_use]
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    #[must_use]
    pub fn is_connected(&self, client_id: &str) -> bool {
        self.sessions
            .get(client_id)
            .is_some_and(|session| session.connected)
    }
}
