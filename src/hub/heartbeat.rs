//! Heartbeat scheduler
//!
//! Periodic liveness probe to every registered client, plus pruning of
//! idle clients that hold no subscriptions. Idleness is measured against
//! transport activity only — watch traffic may legitimately be quiet for
//! long periods, so a subscribed client is never pruned.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::time::interval;
use tracing::{debug, info};

use crate::metrics;

use super::messages::ServerEvent;
use super::Hub;

/// Periodic heartbeat/prune loop. Spawned once at startup.
pub async fn heartbeat_task(hub: Arc<Hub>) {
    let mut ticker = interval(Duration::from_secs(hub.config().heartbeat_interval_secs));
    loop {
        ticker.tick().await;
        debug!("running heartbeat pass");
        hub.run_heartbeat_pass();
    }
}

impl Hub {
    /// One heartbeat pass: prune idle subscription-less clients, probe
    /// everyone else.
    pub fn run_heartbeat_pass(&self) {
        let idle_timeout = self.config.idle_timeout_secs as i64;
        let mut prune = Vec::new();
        let mut probe = Vec::new();
        {
            let tables = self.tables.lock();
            for (id, client) in &tables.clients {
                if client.channels.is_empty() && client.idle_seconds() > idle_timeout {
                    prune.push(*id);
                } else {
                    probe.push(*id);
                }
            }
        }

        for id in prune {
            info!(client_id = %id, "pruning idle client");
            metrics::record_client_pruned();
            self.remove_client(id);
        }

        let ts = Utc::now();
        for id in probe {
            self.send_to_client(id, ServerEvent::Heartbeat { ts });
        }
    }
}
