//! Client registry
//!
//! Tracks connected downstream sessions: identity, bearer token, owning
//! user, held subscriptions and transport liveness. A session is owned
//! exclusively by the hub while registered; it leaves through disconnect,
//! write failure or idle pruning, all of which funnel into
//! [`Hub::remove_client`].

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info};
use uuid::Uuid;

use crate::metrics;

use super::channel::ChannelKey;
use super::messages::ServerEvent;
use super::transport::ClientTransport;
use super::Hub;

/// Identity of a connected session.
pub type ClientId = Uuid;

/// A connected downstream session.
pub struct Client {
    pub id: ClientId,
    /// Owning user identity
    pub user: String,
    /// Bearer token, refreshed on every subscribe
    pub(crate) token: String,
    /// Channel keys this client is subscribed to
    pub(crate) channels: HashSet<ChannelKey>,
    /// Last transport activity (not watch traffic)
    pub(crate) last_active: DateTime<Utc>,
    pub(crate) transport: Arc<dyn ClientTransport>,
}

impl Client {
    fn new(user: String, token: String, transport: Arc<dyn ClientTransport>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user,
            token,
            channels: HashSet::new(),
            last_active: Utc::now(),
            transport,
        }
    }

    pub(crate) fn touch(&mut self) {
        self.last_active = Utc::now();
    }

    pub fn idle_seconds(&self) -> i64 {
        (Utc::now() - self.last_active).num_seconds()
    }

    pub fn subscription_count(&self) -> usize {
        self.channels.len()
    }
}

impl Hub {
    /// Register a session. Returns `None` once the client cap is reached;
    /// a refused registration leaves no trace. An accepted client receives
    /// a `connected` event carrying its assigned identity.
    pub fn register(
        &self,
        user: impl Into<String>,
        token: impl Into<String>,
        transport: Arc<dyn ClientTransport>,
    ) -> Option<ClientId> {
        let client = Client::new(user.into(), token.into(), transport);
        let id = client.id;
        {
            let mut tables = self.tables.lock();
            if tables.clients.len() >= self.config.max_clients {
                debug!(
                    max = self.config.max_clients,
                    "registration refused, client cap reached"
                );
                metrics::record_registration_refused();
                return None;
            }
            tables.clients.insert(id, client);
        }
        metrics::record_client_registered();
        info!(client_id = %id, "client registered");
        self.send_to_client(id, ServerEvent::Connected { client_id: id });
        Some(id)
    }

    /// Drop a session: release every channel it held (arming grace timers
    /// where it was the last subscriber), then delete it.
    pub fn remove_client(&self, id: ClientId) {
        let removed = {
            let mut guard = self.tables.lock();
            let tables = &mut *guard;
            let Some(client) = tables.clients.remove(&id) else {
                return;
            };
            for key in &client.channels {
                self.release_channel(tables, id, key);
            }
            client
        };
        metrics::record_client_removed();
        info!(client_id = %id, user = %removed.user, "client removed");
    }

    /// Refresh a client's bearer token. No other side effects.
    pub fn update_token(&self, id: ClientId, token: impl Into<String>) {
        if let Some(client) = self.tables.lock().clients.get_mut(&id) {
            client.token = token.into();
        }
    }

    /// Ownership check for request authorization done by the transport
    /// layer.
    pub fn is_owned_by(&self, id: ClientId, user: &str) -> bool {
        self.tables
            .lock()
            .clients
            .get(&id)
            .map_or(false, |c| c.user == user)
    }

    /// Record transport-level activity for a client.
    pub fn touch_client(&self, id: ClientId) {
        if let Some(client) = self.tables.lock().clients.get_mut(&id) {
            client.touch();
        }
    }

    pub fn client_count(&self) -> usize {
        self.tables.lock().clients.len()
    }
}
