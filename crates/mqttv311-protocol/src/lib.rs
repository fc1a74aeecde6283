#![warn(clippy::pedantic)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::if_not_else)]

pub mod encoding;
pub mod error;
pub mod inflight;
pub mod packet;
pub mod reassembly;
pub mod topic;
pub mod types;

pub use error::{MqttError, Result};
pub use inflight::{InflightTracker, OutboundState};
pub use packet::connack::{ConnAckPacket, ConnectReturnCode};
pub use packet::connect::ConnectPacket;
pub use packet::publish::PublishPacket;
pub use packet::suback::{SubAckPacket, SubscribeReturnCode};
pub use packet::subscribe::{SubscribePacket, SubscriptionRequest};
pub use packet::unsubscribe::UnsubscribePacket;
pub use packet::{FixedHeader, Packet, PacketType};
pub use reassembly::StreamBuffer;
pub use topic::{is_valid_topic, topic_matches};
pub use types::{ConnectionId, Message, QoS, Will};
