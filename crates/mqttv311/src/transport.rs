//! The transport collaborator consumed by the broker and client.
//!
//! The core never parses transport framing; it is handed raw decoded bytes
//! through the driver surface and pushes raw bytes back out through this
//! trait.

/// One writable network connection (plain socket, WebSocket, in-process
/// pipe). Sending is infallible by contract: a transport that fails must
/// report it to the driver, which notifies the core via
/// `Broker::connection_closed`.
pub trait Transport {
    /// Queues raw bytes for transmission to the peer.
    fn send(&mut self, bytes: &[u8]);

    /// Closes the underlying connection.
    fn close(&mut self);
}
