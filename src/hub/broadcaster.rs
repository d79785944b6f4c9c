//! Event fan-out
//!
//! Delivery is at-most-once and fire-and-forget: a failed write means the
//! session is gone and the client is removed through the registry path.
//! Broadcasts iterate a point-in-time snapshot of the subscriber set so
//! removals triggered by failed sends cannot corrupt iteration.

use tracing::debug;

use crate::metrics;

use super::channel::ChannelKey;
use super::messages::ServerEvent;
use super::registry::ClientId;
use super::Hub;

impl Hub {
    /// Write one event to one client. Never returns an error; a write
    /// failure removes the client.
    pub fn send_to_client(&self, id: ClientId, event: ServerEvent) {
        let transport = self
            .tables
            .lock()
            .clients
            .get(&id)
            .map(|c| c.transport.clone());
        let Some(transport) = transport else {
            return;
        };

        match transport.send(event) {
            Ok(()) => metrics::record_event_delivered(),
            Err(error) => {
                debug!(client_id = %id, %error, "client write failed, disconnecting");
                metrics::record_send_error();
                self.remove_client(id);
            }
        }
    }

    /// Deliver an event to every current subscriber of a channel, in call
    /// order.
    pub fn broadcast_to_channel(&self, key: &ChannelKey, event: ServerEvent) {
        let targets: Vec<ClientId> = self
            .tables
            .lock()
            .subscriptions
            .get(key)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default();

        metrics::record_event_broadcast();
        for id in targets {
            self.send_to_client(id, event.clone());
        }
    }
}
