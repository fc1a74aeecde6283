#![warn(clippy::pedantic)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::if_not_else)]

pub mod broker;
pub mod client;
pub mod security;
pub mod session;
pub mod subscription;
pub mod testing;
pub mod transport;

pub use broker::{Broker, BrokerConfig};
pub use client::{Client, ConnectOptions};
pub use mqttv311_protocol as protocol;
pub use mqttv311_protocol::{
    ConnectionId, Message, MqttError, Packet, QoS, Result, Will,
};
pub use security::{AccessControlEntry, AccessControlList, SecurityChecker};
pub use session::Session;
pub use subscription::{RetainedMessage, Subscription, SubscriptionStore};
pub use transport::Transport;
