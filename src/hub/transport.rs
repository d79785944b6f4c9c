//! Push-channel transport seam
//!
//! The hub never touches a socket directly: every client owns a
//! [`ClientTransport`] and the hub writes events through it. Delivery is
//! fire-and-forget; a failed write means the client is gone.

use std::sync::Arc;

use tokio::sync::mpsc;

use super::messages::ServerEvent;

/// Transport write failure. Converted into client removal by the
/// broadcaster; never surfaced to callers.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("client channel closed")]
    Closed,
}

/// Exclusive write handle for one client's push channel.
pub trait ClientTransport: Send + Sync {
    fn send(&self, event: ServerEvent) -> Result<(), TransportError>;
}

/// Transport backed by an unbounded in-process channel. The receiving half
/// is drained by a socket writer task; a dropped receiver is the write
/// failure signal.
pub struct ChannelTransport {
    tx: mpsc::UnboundedSender<ServerEvent>,
}

impl ChannelTransport {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<ServerEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(Self { tx }), rx)
    }
}

impl ClientTransport for ChannelTransport {
    fn send(&self, event: ServerEvent) -> Result<(), TransportError> {
        self.tx.send(event).map_err(|_| TransportError::Closed)
    }
}
