//! Subscription index
//!
//! Many-to-many mapping between channel keys and client identities — the
//! fan-out list — plus the grace timers that delay upstream teardown when
//! the last subscriber leaves. The grace delay absorbs the rapid
//! unsubscribe/resubscribe churn of a client navigating away from a view
//! and straight back.

use std::time::Duration;

use tracing::{debug, info};

use crate::error::HubError;
use crate::metrics;

use super::channel::{ChannelKey, WatchTarget};
use super::messages::ServerEvent;
use super::registry::ClientId;
use super::{Hub, HubTables};

impl Hub {
    /// Subscribe a registered client to a resource selector. Creates the
    /// channel's upstream connection if this is its first subscriber and
    /// cancels any pending grace-period close.
    pub fn subscribe(
        &self,
        client_id: ClientId,
        target: &WatchTarget,
    ) -> Result<ChannelKey, HubError> {
        let key = target.channel_key();
        {
            let mut guard = self.tables.lock();
            let tables = &mut *guard;

            let client = tables
                .clients
                .get_mut(&client_id)
                .ok_or(HubError::UnknownClient(client_id))?;
            if !client.channels.contains(&key)
                && client.channels.len() >= self.config.max_subscriptions_per_client
            {
                return Err(HubError::SubscriptionLimitExceeded(client_id));
            }
            client.touch();
            client.channels.insert(key.clone());
            let creator = client.user.clone();
            let token = client.token.clone();

            if let Some(timer) = tables.grace_timers.remove(&key) {
                timer.abort();
                debug!(channel = %key, "pending close cancelled by new subscriber");
            }

            tables
                .subscriptions
                .entry(key.clone())
                .or_default()
                .insert(client_id);

            if !tables.upstreams.contains_key(&key) {
                self.spawn_upstream(tables, key.clone(), target, creator, token);
            }
        }

        metrics::record_subscription();
        info!(client_id = %client_id, channel = %key, "subscribed");
        self.send_to_client(client_id, ServerEvent::Subscribed { channel: key.clone() });
        Ok(key)
    }

    /// Drop a client's subscription. If the subscriber set becomes empty
    /// the upstream is not closed synchronously: a grace timer is armed
    /// and the upstream closes only if it fires with the set still empty.
    /// Emits `unsubscribed` regardless.
    pub fn unsubscribe(&self, client_id: ClientId, key: &ChannelKey) {
        {
            let mut guard = self.tables.lock();
            let tables = &mut *guard;
            if let Some(client) = tables.clients.get_mut(&client_id) {
                client.channels.remove(key);
                client.touch();
            }
            self.release_channel(tables, client_id, key);
        }
        metrics::record_unsubscription();
        info!(client_id = %client_id, channel = %key, "unsubscribed");
        self.send_to_client(client_id, ServerEvent::Unsubscribed { channel: key.clone() });
    }

    /// Remove a client from a channel's subscriber set; arm the grace
    /// timer when the set empties under a live upstream. Shared by the
    /// unsubscribe and client-removal paths.
    pub(crate) fn release_channel(
        &self,
        tables: &mut HubTables,
        client_id: ClientId,
        key: &ChannelKey,
    ) {
        let emptied = match tables.subscriptions.get_mut(key) {
            Some(set) => {
                set.remove(&client_id);
                set.is_empty()
            }
            None => false,
        };
        if emptied {
            tables.subscriptions.remove(key);
            if tables.upstreams.contains_key(key) {
                self.arm_grace_timer(tables, key.clone());
            }
        }
    }

    /// Arm the delayed-close task for a channel. At most one per key; a
    /// new subscriber arriving before it fires aborts it.
    fn arm_grace_timer(&self, tables: &mut HubTables, key: ChannelKey) {
        if let Some(previous) = tables.grace_timers.remove(&key) {
            previous.abort();
        }
        let Some(hub) = self.shared() else {
            return;
        };
        let delay = Duration::from_millis(self.config.grace_period_ms);
        debug!(channel = %key, delay_ms = self.config.grace_period_ms, "grace timer armed");

        let timer_key = key.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            hub.close_idle_channel(&timer_key);
        });
        tables.grace_timers.insert(key, handle);
    }

    /// Fired by a grace timer: tear the upstream down if the channel is
    /// still subscriber-less.
    fn close_idle_channel(&self, key: &ChannelKey) {
        let mut guard = self.tables.lock();
        let tables = &mut *guard;
        tables.grace_timers.remove(key);

        let still_empty = tables
            .subscriptions
            .get(key)
            .map_or(true, |set| set.is_empty());
        if !still_empty {
            return;
        }
        if let Some(mut up) = tables.upstreams.remove(key) {
            debug!(channel = %key, was_connecting = up.connecting, "aborting upstream reader");
            up.abort();
            metrics::record_upstream_closed();
            info!(channel = %key, "upstream closed after grace period");
        }
    }
}
