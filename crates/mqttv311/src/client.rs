//! The client-side counterpart: drives the same codec, stream reassembly,
//! and QoS state machine as the broker, over one connection.
//!
//! Sans-io like the rest of the core: the embedder feeds received bytes
//! through [`Client::handle_request`] and wires outbound bytes through the
//! transport collaborator. Delivered application messages queue internally
//! and drain through [`Client::next_message`].

use crate::session::Session;
use crate::transport::Transport;
use mqttv311_protocol::error::{MqttError, Result};
use mqttv311_protocol::packet::ack::{PubAckPacket, PubCompPacket, PubRecPacket, PubRelPacket};
use mqttv311_protocol::packet::connack::{ConnAckPacket, ConnectReturnCode};
use mqttv311_protocol::packet::connect::ConnectPacket;
use mqttv311_protocol::packet::publish::PublishPacket;
use mqttv311_protocol::packet::subscribe::SubscribePacket;
use mqttv311_protocol::packet::unsubscribe::UnsubscribePacket;
use mqttv311_protocol::packet::Packet;
use mqttv311_protocol::reassembly::StreamBuffer;
use mqttv311_protocol::types::{ConnectionId, Message, QoS, Will};
use bytes::Bytes;
use std::collections::VecDeque;
use tracing::{debug, error, info, warn};

/// Connect-time parameters sent to the broker.
#[derive(Debug, Clone)]
pub struct ConnectOptions {
    pub client_id: String,
    pub clean_session: bool,
    pub keep_alive: u16,
    pub username: Option<String>,
    pub password: Option<Bytes>,
    pub will: Option<Will>,
}

impl ConnectOptions {
    #[must_use]
    pub fn new(client_id: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            clean_session: true,
            keep_alive: 60,
            username: None,
            password: None,
            will: None,
        }
    }

    #[must_use]
    pub fn with_clean_session(mut self, clean_session: bool) -> Self {
        self.clean_session = clean_session;
        self
    }

    #[must_use]
    pub fn with_keep_alive(mut self, seconds: u16) -> Self {
        self.keep_alive = seconds;
        self
    }

    #[must_use]
    pub fn with_credentials(mut self, username: impl Into<String>, password: Option<Bytes>) -> Self {
        self.username = Some(username.into());
        self.password = password;
        self
    }

    #[must_use]
    pub fn with_will(mut self, will: Will) -> Self {
        self.will = Some(will);
        self
    }
}

/// The client keeps one logical connection, so its stream buffer runs
/// under a fixed handle.
const CLIENT_CONNECTION: ConnectionId = ConnectionId(0);

pub struct Client {
    session: Session,
    transport: Box<dyn Transport>,
    stream: StreamBuffer,
    received: VecDeque<Message>,
}

impl Client {
    #[must_use]
    pub fn new(client_id: impl Into<String>, transport: Box<dyn Transport>) -> Self {
        Self {
            session: Session::new(client_id, true),
            transport,
            stream: StreamBuffer::new(),
            received: VecDeque::new(),
        }
    }

    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.session.client_id
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.session.connected
    }

    /// Sends CONNECT. The options' client identifier is expected to match
    /// this client's.
    pub fn connect(&mut self, options: &ConnectOptions) {
        let mut packet = ConnectPacket::new(options.client_id.clone())
            .with_clean_session(options.clean_session)
            .with_keep_alive(options.keep_alive);
        if let Some(will) = &options.will {
            packet = packet.with_will(will.clone());
        }
        if let Some(username) = &options.username {
            packet = packet.with_credentials(username.clone(), options.password.clone());
        }
        self.session.clean_session = options.clean_session;
        self.session.keep_alive = options.keep_alive;
        self.session.connected = true;
        self.send_packet(&Packet::Connect(Box::new(packet)));
    }

    /// Publishes a message; QoS 1/2 sends enter the outbound in-flight
    /// track until acknowledged.
    pub fn publish(&mut self, topic: &str, payload: impl Into<Bytes>, qos: QoS, retain: bool) {
        if let Some(packet) = self
            .session
            .outbound_publish(topic, payload.into(), qos, retain)
        {
            self.send_packet(&packet);
        }
    }

    /// Sends SUBSCRIBE for the given (filter, requested QoS) pairs.
    /// Returns the message identifier used.
    pub fn subscribe(&mut self, filters: &[(&str, QoS)]) -> u16 {
        let packet_id = self.session.next_packet_id();
        let mut packet = SubscribePacket::new(packet_id);
        for (filter, qos) in filters {
            packet = packet.add_filter(*filter, *qos);
        }
        self.send_packet(&Packet::Subscribe(packet));
        packet_id
    }

    /// Sends UNSUBSCRIBE. Returns the message identifier used.
    pub fn unsubscribe(&mut self, filters: &[&str]) -> u16 {
        let packet_id = self.session.next_packet_id();
        let mut packet = UnsubscribePacket::new(packet_id);
        for filter in filters {
            packet = packet.add_filter(*filter);
        }
        self.send_packet(&Packet::Unsubscribe(packet));
        packet_id
    }

    pub fn ping(&mut self) {
        self.send_packet(&Packet::Pingreq);
    }

    /// Sends DISCONNECT and closes the transport. The broker discards the
    /// will without publishing it (MQTT-3.14.4-2).
    pub fn disconnect(&mut self) {
        self.send_packet(&Packet::Disconnect);
        self.session.connected = false;
        self.transport.close();
    }

    /// Feeds raw bytes received from the broker, draining every complete
    /// packet. A malformed packet or protocol violation closes the
    /// transport and is returned as the error.
    pub fn handle_request(&mut self, bytes: &[u8]) -> Result<()> {
        self.stream.append(CLIENT_CONNECTION, bytes);
        loop {
            match self.stream.next_packet(CLIENT_CONNECTION) {
                Ok(Some(packet)) => {
                    if let Err(err) = self.handle_packet(packet) {
                        error!(error = %err, "protocol error, closing connection");
                        self.session.connected = false;
                        self.transport.close();
                        return Err(err);
                    }
                }
                Ok(None) => return Ok(()),
                Err(err) => {
                    error!(error = %err, "malformed packet, closing connection");
                    self.session.connected = false;
                    self.transport.close();
                    return Err(err);
                }
            }
        }
    }

    /// The next application message delivered by the broker, if any.
    pub fn next_message(&mut self) -> Option<Message> {
        self.received.pop_front()
    }

    fn handle_packet(&mut self, packet: Packet) -> Result<()> {
        debug!(packet = %packet, "inbound");
        match packet {
            Packet::Connack(p) => self.handle_connack(&p),
            Packet::Publish(p) => {
                self.handle_publish(p);
                Ok(())
            }
            Packet::Puback(PubAckPacket { packet_id }) => {
                self.session.handle_puback(packet_id);
                Ok(())
            }
            Packet::Pubrec(PubRecPacket { packet_id }) => {
                if self.session.handle_pubrec(packet_id) {
                    self.send_packet(&Packet::Pubrel(PubRelPacket::new(packet_id)));
                }
                Ok(())
            }
            Packet::Pubrel(PubRelPacket { packet_id }) => {
                match self.session.release_inbound(packet_id) {
                    Some(publish) => self.received.push_back(publish.message()),
                    None => warn!(packet_id, "PUBREL for unknown message identifier"),
                }
                self.send_packet(&Packet::Pubcomp(PubCompPacket::new(packet_id)));
                Ok(())
            }
            Packet::Pubcomp(PubCompPacket { packet_id }) => {
                self.session.handle_pubcomp(packet_id);
                Ok(())
            }
            Packet::Suback(p) => {
                debug!(packet_id = p.packet_id, "SUBACK received");
                Ok(())
            }
            Packet::Unsuback(p) => {
                debug!(packet_id = p.packet_id, "UNSUBACK received");
                Ok(())
            }
            Packet::Pingresp => {
                debug!("PINGRESP received");
                Ok(())
            }
            Packet::Connect(_)
            | Packet::Subscribe(_)
            | Packet::Unsubscribe(_)
            | Packet::Pingreq
            | Packet::Disconnect => Err(MqttError::ProtocolViolation(format!(
                "{} is not valid from a broker",
                packet.packet_type()
            ))),
        }
    }

    fn handle_connack(&mut self, packet: &ConnAckPacket) -> Result<()> {
        if packet.return_code != ConnectReturnCode::Accepted {
            self.session.connected = false;
            return Err(MqttError::ConnectionRefused(packet.return_code));
        }
        info!(
            client_id = %self.session.client_id,
            session_present = packet.session_present,
            "connected"
        );
        self.session.connected = true;
        // MQTT-4.4.0-1: replay outstanding in-flight messages.
        for packet in self.session.resend_packets() {
            self.send_packet(&packet);
        }
        Ok(())
    }

    fn handle_publish(&mut self, packet: PublishPacket) {
        match packet.qos {
            QoS::AtMostOnce => self.received.push_back(packet.message()),
            QoS::AtLeastOnce => {
                if let Some(packet_id) = packet.packet_id {
                    self.received.push_back(packet.message());
                    self.send_packet(&Packet::Puback(PubAckPacket::new(packet_id)));
                }
            }
            QoS::ExactlyOnce => {
                if let Some(packet_id) = packet.packet_id {
                    // Recorded once; delivery happens at PUBREL, exactly
                    // once.
                    self.session.record_inbound(packet);
                    self.send_packet(&Packet::Pubrec(PubRecPacket::new(packet_id)));
                }
            }
        }
    }

    fn send_packet(&mut self, packet: &Packet) {
        match packet.encode() {
            Ok(bytes) => {
                debug!(packet = %packet, "outbound");
                self.transport.send(&bytes);
            }
            Err(err) => error!(packet = %packet, error = %err, "failed to encode packet"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockTransport;
    use mqttv311_protocol::packet::suback::{SubAckPacket, SubscribeReturnCode};
    use mqttv311_protocol::packet::PacketType;

    fn client() -> (Client, MockTransport) {
        let transport = MockTransport::new();
        let client = Client::new("test-client", Box::new(transport.clone()));
        (client, transport)
    }

    fn connack(session_present: bool) -> Vec<u8> {
        Packet::Connack(ConnAckPacket::new(session_present, ConnectReturnCode::Accepted))
            .encode()
            .unwrap()
            .to_vec()
    }

    fn connected_client() -> (Client, MockTransport) {
        let (mut client, transport) = client();
        client.connect(&ConnectOptions::new("test-client"));
        client.handle_request(&connack(false)).unwrap();
        transport.take_packets();
        (client, transport)
    }

    #[test]
    fn test_connect_sends_connect_packet() {
        let (mut client, transport) = client();
        client.connect(
            &ConnectOptions::new("test-client")
                .with_keep_alive(30)
                .with_credentials("alice", Some(Bytes::from_static(b"pw"))),
        );

        let sent = transport.take_packets();
        assert_eq!(sent.len(), 1);
        match &sent[0] {
            Packet::Connect(p) => {
                assert_eq!(p.client_id, "test-client");
                assert_eq!(p.keep_alive, 30);
                assert_eq!(p.username.as_deref(), Some("alice"));
            }
            other => panic!("expected CONNECT, got {other}"),
        }
    }

    #[test]
    fn test_connack_refused_is_an_error() {
        let (mut client, _transport) = client();
        client.connect(&ConnectOptions::new("test-client"));

        let refused = Packet::Connack(ConnAckPacket::refused(
            ConnectReturnCode::RefusedBadCredentials,
        ))
        .encode()
        .unwrap();
        let err = client.handle_request(&refused).unwrap_err();
        assert_eq!(
            err,
            MqttError::ConnectionRefused(ConnectReturnCode::RefusedBadCredentials)
        );
        assert!(!client.is_connected());
    }

    #[test]
    fn test_qos1_publish_tracked_until_puback() {
        let (mut client, transport) = connected_client();
        client.publish("a/b", &b"hi"[..], QoS::AtLeastOnce, false);

        let sent = transport.take_packets();
        let packet_id = match &sent[0] {
            Packet::Publish(p) => p.packet_id.unwrap(),
            other => panic!("expected PUBLISH, got {other}"),
        };

        client
            .handle_request(&Packet::Puback(PubAckPacket::new(packet_id)).encode().unwrap())
            .unwrap();
        // Nothing left to replay.
        let replay = client.session.resend_packets();
        assert!(replay.is_empty());
    }

    #[test]
    fn test_qos2_outbound_handshake() {
        let (mut client, transport) = connected_client();
        client.publish("a/b", &b"hi"[..], QoS::ExactlyOnce, false);
        let packet_id = match &transport.take_packets()[0] {
            Packet::Publish(p) => p.packet_id.unwrap(),
            other => panic!("expected PUBLISH, got {other}"),
        };

        client
            .handle_request(&Packet::Pubrec(PubRecPacket::new(packet_id)).encode().unwrap())
            .unwrap();
        let sent = transport.take_packets();
        assert!(matches!(sent[0], Packet::Pubrel(PubRelPacket { packet_id: id }) if id == packet_id));

        client
            .handle_request(&Packet::Pubcomp(PubCompPacket::new(packet_id)).encode().unwrap())
            .unwrap();
        assert!(client.session.resend_packets().is_empty());
    }

    #[test]
    fn test_inbound_qos2_delivers_exactly_once_at_pubrel() {
        let (mut client, transport) = connected_client();
        let publish = Packet::Publish(
            PublishPacket::new("a/b", &b"payload"[..], QoS::ExactlyOnce).with_packet_id(5),
        )
        .encode()
        .unwrap();

        // Duplicate PUBLISH before release: still a single delivery.
        client.handle_request(&publish).unwrap();
        client.handle_request(&publish).unwrap();
        assert!(client.next_message().is_none());
        let sent = transport.take_packets();
        assert_eq!(sent.len(), 2);
        assert!(sent.iter().all(|p| p.packet_type() == PacketType::Pubrec));

        client
            .handle_request(&Packet::Pubrel(PubRelPacket::new(5)).encode().unwrap())
            .unwrap();
        let message = client.next_message().unwrap();
        assert_eq!(message.topic, "a/b");
        assert_eq!(&message.payload[..], b"payload");
        assert!(client.next_message().is_none());
        assert!(matches!(
            transport.take_packets()[0],
            Packet::Pubcomp(PubCompPacket { packet_id: 5 })
        ));
    }

    #[test]
    fn test_inbound_qos1_delivers_and_acks() {
        let (mut client, transport) = connected_client();
        let publish = Packet::Publish(
            PublishPacket::new("a/b", &b"x"[..], QoS::AtLeastOnce).with_packet_id(9),
        )
        .encode()
        .unwrap();
        client.handle_request(&publish).unwrap();

        assert!(client.next_message().is_some());
        assert!(matches!(
            transport.take_packets()[0],
            Packet::Puback(PubAckPacket { packet_id: 9 })
        ));
    }

    #[test]
    fn test_reconnect_replays_inflight_with_dup() {
        let (mut client, transport) = connected_client();
        client.publish("a/b", &b"hi"[..], QoS::AtLeastOnce, false);
        transport.take_packets();

        // Reconnect without ever seeing the PUBACK.
        client.handle_request(&connack(true)).unwrap();
        let sent = transport.take_packets();
        assert_eq!(sent.len(), 1);
        match &sent[0] {
            Packet::Publish(p) => {
                assert!(p.dup);
                assert_eq!(p.packet_id, Some(1));
            }
            other => panic!("expected PUBLISH, got {other}"),
        }
    }

    #[test]
    fn test_subscribe_and_suback() {
        let (mut client, transport) = connected_client();
        let packet_id = client.subscribe(&[("room/+/temp", QoS::AtLeastOnce)]);

        match &transport.take_packets()[0] {
            Packet::Subscribe(p) => {
                assert_eq!(p.packet_id, packet_id);
                assert_eq!(p.filters[0].filter, "room/+/temp");
            }
            other => panic!("expected SUBSCRIBE, got {other}"),
        }

        let suback = Packet::Suback(SubAckPacket::new(
            packet_id,
            vec![SubscribeReturnCode::GrantedQoS1],
        ))
        .encode()
        .unwrap();
        client.handle_request(&suback).unwrap();
    }

    #[test]
    fn test_broker_only_packets_rejected() {
        let (mut client, transport) = connected_client();
        let err = client
            .handle_request(&Packet::Pingreq.encode().unwrap())
            .unwrap_err();
        assert!(matches!(err, MqttError::ProtocolViolation(_)));
        assert!(transport.is_closed());
    }

    #[test]
    fn test_disconnect_closes_transport() {
        let (mut client, transport) = connected_client();
        client.disconnect();
        assert!(!client.is_connected());
        assert!(transport.is_closed());
        assert!(matches!(transport.take_packets()[0], Packet::Disconnect));
    }
}
