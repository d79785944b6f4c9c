//! Watch multiplexing hub
//!
//! Deduplicates upstream watch connections per unique resource selector
//! and fans received events out to every subscribed session. It supports:
//! - One upstream connection per channel key, however many subscribers
//! - Reconnect with exponential backoff and resume-token continuity
//! - Silent staleness recovery (410 / "Expired")
//! - Grace-period teardown to absorb rapid resubscribe churn
//! - Heartbeats and idle-client pruning
//!
//! # Architecture
//!
//! - **Channel**: key derivation and watch endpoint construction
//! - **Registry**: connected sessions, tokens, liveness
//! - **Subscriptions**: channel membership and grace timers
//! - **Upstream**: connection lifecycle and the stream read loop
//! - **Broadcaster**: fan-out with write-failure-as-disconnect
//! - **Heartbeat**: periodic probe and idle pruning
//! - **Parser**: NDJSON watch line decoding
//! - **Transport / Source**: the push-channel and upstream seams

pub mod broadcaster;
pub mod channel;
pub mod heartbeat;
pub mod messages;
pub mod parser;
pub mod registry;
pub mod source;
pub mod subscriptions;
pub mod transport;
pub mod upstream;

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::info;

use crate::metrics;

pub use channel::{ChannelKey, WatchTarget};
pub use heartbeat::heartbeat_task;
pub use messages::{ClientMessage, ServerEvent};
pub use registry::{Client, ClientId};
pub use source::{HttpWatchSource, WatchSource};
pub use transport::{ChannelTransport, ClientTransport, TransportError};

use upstream::Upstream;

/// Hub configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HubConfig {
    /// Hard cap on registered clients
    pub max_clients: usize,
    /// Hard cap on subscriptions held by one client
    pub max_subscriptions_per_client: usize,
    /// Delay between the last unsubscribe and upstream teardown
    pub grace_period_ms: u64,
    /// Heartbeat interval in seconds
    pub heartbeat_interval_secs: u64,
    /// Idle timeout for clients with zero subscriptions
    pub idle_timeout_secs: u64,
    /// Server-side bound on one watch connection (`timeoutSeconds`)
    pub upstream_timeout_secs: u64,
    /// Base reconnect delay; doubles per consecutive failure
    pub reconnect_base_delay_ms: u64,
    /// Delay before reconnecting after staleness recovery
    pub expired_retry_delay_ms: u64,
    /// Delay before reconnecting after a clean end of stream
    pub stream_end_delay_ms: u64,
    /// Consecutive connection failures tolerated before teardown
    pub max_reconnect_attempts: u32,
    /// Resume token used before the first event arrives
    pub initial_resource_version: String,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            max_clients: 1000,
            max_subscriptions_per_client: 100,
            grace_period_ms: 5000,
            heartbeat_interval_secs: 30,
            idle_timeout_secs: 120,
            upstream_timeout_secs: 300,
            reconnect_base_delay_ms: 1000,
            expired_retry_delay_ms: 100,
            stream_end_delay_ms: 1000,
            max_reconnect_attempts: 5,
            initial_resource_version: "0".to_string(),
        }
    }
}

/// All mutable hub state, behind one lock.
///
/// The subscribe/unsubscribe invariants span clients, subscriptions and
/// upstreams at once, so a single mutex guards every table; per-table
/// locks cannot keep check-then-act sequences atomic. The lock is never
/// held across an await.
#[derive(Default)]
pub(crate) struct HubTables {
    pub(crate) clients: HashMap<ClientId, Client>,
    pub(crate) subscriptions: HashMap<ChannelKey, HashSet<ClientId>>,
    pub(crate) upstreams: HashMap<ChannelKey, Upstream>,
    pub(crate) grace_timers: HashMap<ChannelKey, JoinHandle<()>>,
}

/// The watch multiplexing hub. Constructed once at startup and shared as
/// `Arc<Hub>`; shut down on process termination.
pub struct Hub {
    pub(crate) config: HubConfig,
    pub(crate) source: Arc<dyn WatchSource>,
    pub(crate) tables: Mutex<HubTables>,
    /// Self-handle for the background tasks the hub spawns
    self_ref: Weak<Hub>,
}

impl Hub {
    pub fn new(config: HubConfig, source: Arc<dyn WatchSource>) -> Arc<Self> {
        Arc::new_cyclic(|weak| Self {
            config,
            source,
            tables: Mutex::new(HubTables::default()),
            self_ref: weak.clone(),
        })
    }

    /// Upgrade the self-handle; `None` only while the hub is being
    /// dropped, at which point new background work is moot.
    pub(crate) fn shared(&self) -> Option<Arc<Hub>> {
        self.self_ref.upgrade()
    }

    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    /// Diagnostic snapshot of the hub's tables.
    pub fn stats(&self) -> HubStats {
        let tables = self.tables.lock();
        HubStats {
            clients: tables.clients.len(),
            upstreams: tables.upstreams.len(),
            subscriptions: tables
                .subscriptions
                .iter()
                .map(|(key, set)| (key.to_string(), set.len()))
                .collect(),
        }
    }

    /// Last-known resume token for a channel, if an upstream exists.
    pub fn resource_version(&self, channel: &ChannelKey) -> Option<String> {
        self.tables
            .lock()
            .upstreams
            .get(channel)
            .map(|u| u.resource_version.clone())
    }

    /// Cancel every upstream connection and pending timer and drop all
    /// registrations. Called once on process shutdown.
    pub fn shutdown(&self) {
        let mut tables = self.tables.lock();
        for (_, timer) in tables.grace_timers.drain() {
            timer.abort();
        }
        for (_, mut up) in tables.upstreams.drain() {
            up.abort();
        }
        tables.subscriptions.clear();
        let dropped = tables.clients.len();
        tables.clients.clear();
        metrics::record_shutdown();
        info!(clients = dropped, "hub shut down");
    }
}

/// Diagnostic stats: client count, upstream count, and per-channel
/// subscriber counts.
#[derive(Debug, Clone, Serialize)]
pub struct HubStats {
    pub clients: usize,
    pub upstreams: usize,
    pub subscriptions: HashMap<String, usize>,
}

#[cfg(test)]
pub(crate) mod testutil;
