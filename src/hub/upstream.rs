//! Upstream connection manager
//!
//! Owns at most one live watch connection per channel key. Each upstream
//! runs a reader task: connect with the current resume token, split the
//! byte stream into NDJSON lines, fan decoded events out, and reconnect on
//! end-of-stream, staleness or failure. Teardown happens through the
//! grace-period path, through `Hub::shutdown`, or once the reconnect
//! attempts are exhausted.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::StreamExt;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::UpstreamError;
use crate::metrics;

use super::channel::{ChannelKey, WatchTarget};
use super::messages::ServerEvent;
use super::parser;
use super::source::ByteStream;
use super::{Hub, HubTables};

/// One live (or connecting) upstream watch connection.
pub(crate) struct Upstream {
    /// Endpoint path for the target's scope
    pub(crate) path: String,
    /// Query parameters minus the per-attempt `resourceVersion`
    pub(crate) base_query: Vec<(String, String)>,
    /// Last observed resume token; reset to the initial value on 410
    pub(crate) resource_version: String,
    /// Token used for the most recent connect attempt
    pub(crate) last_token: String,
    /// User whose subscribe created this upstream, for token affinity
    pub(crate) creator: String,
    /// Consecutive connection failures since the last successful connect
    pub(crate) attempts: u32,
    pub(crate) connecting: bool,
    pub(crate) last_active: DateTime<Utc>,
    /// Reader task; aborting it cancels the in-flight connection
    pub(crate) task: Option<JoinHandle<()>>,
}

impl Upstream {
    pub(crate) fn abort(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// What one connection's read loop ended with.
enum StreamOutcome {
    /// Clean end of stream; the server-side timeout is the expected cause
    End,
    /// Stale resume token; restart from the initial version
    Expired,
    Failed(UpstreamError),
}

enum LineAction {
    Continue,
    Expired,
}

impl Hub {
    /// Create the upstream entry for a channel and start its reader task.
    /// Caller holds the table lock and has verified no upstream exists.
    pub(crate) fn spawn_upstream(
        &self,
        tables: &mut HubTables,
        key: ChannelKey,
        target: &WatchTarget,
        creator: String,
        token: String,
    ) {
        let Some(hub) = self.shared() else {
            return;
        };
        let upstream = Upstream {
            path: target.watch_path(),
            base_query: target.base_query(self.config.upstream_timeout_secs),
            resource_version: self.config.initial_resource_version.clone(),
            last_token: token,
            creator,
            attempts: 0,
            connecting: true,
            last_active: Utc::now(),
            task: None,
        };
        tables.upstreams.insert(key.clone(), upstream);

        let task_key = key.clone();
        let handle = tokio::spawn(async move {
            hub.run_upstream(task_key).await;
        });
        if let Some(up) = tables.upstreams.get_mut(&key) {
            up.task = Some(handle);
        }
        metrics::record_upstream_opened();
        info!(channel = %key, "upstream started");
    }

    /// Reader task body: connect, stream, reconnect until torn down.
    async fn run_upstream(self: Arc<Self>, key: ChannelKey) {
        loop {
            let Some((path, query, token)) = self.connect_params(&key) else {
                return;
            };

            match self.source.open(&path, &query, &token).await {
                Ok(stream) => {
                    self.mark_streaming(&key);
                    match self.read_stream(&key, stream).await {
                        StreamOutcome::End => {
                            debug!(channel = %key, "watch stream ended, reconnecting");
                            metrics::record_upstream_reconnect();
                            tokio::time::sleep(Duration::from_millis(
                                self.config.stream_end_delay_ms,
                            ))
                            .await;
                        }
                        StreamOutcome::Expired => {
                            // internal recovery, nothing reaches clients
                            info!(channel = %key, "resume token expired, restarting watch from the initial version");
                            self.reset_resource_version(&key);
                            metrics::record_upstream_reconnect();
                            tokio::time::sleep(Duration::from_millis(
                                self.config.expired_retry_delay_ms,
                            ))
                            .await;
                        }
                        StreamOutcome::Failed(error) => {
                            if self.backoff_or_give_up(&key, &error).await {
                                return;
                            }
                        }
                    }
                }
                Err(error) => {
                    if self.backoff_or_give_up(&key, &error).await {
                        return;
                    }
                }
            }
        }
    }

    /// Connection parameters for the next attempt. Token selection prefers
    /// a current subscriber owned by the channel's creator, then any
    /// current subscriber, then the previously used token — a reconnect
    /// must not adopt a foreign user's credentials purely by fallback
    /// order. Returns `None` when the upstream has been torn down.
    fn connect_params(&self, key: &ChannelKey) -> Option<(String, Vec<(String, String)>, String)> {
        let mut guard = self.tables.lock();
        let tables = &mut *guard;

        let creator = tables.upstreams.get(key)?.creator.clone();
        let subscriber_ids: Vec<_> = tables
            .subscriptions
            .get(key)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default();

        let mut creator_token = None;
        let mut any_token = None;
        for id in subscriber_ids {
            if let Some(client) = tables.clients.get(&id) {
                if client.user == creator && creator_token.is_none() {
                    creator_token = Some(client.token.clone());
                }
                if any_token.is_none() {
                    any_token = Some(client.token.clone());
                }
            }
        }

        let up = tables.upstreams.get_mut(key)?;
        up.connecting = true;
        let token = creator_token
            .or(any_token)
            .unwrap_or_else(|| up.last_token.clone());
        up.last_token = token.clone();

        let mut query = up.base_query.clone();
        query.push(("resourceVersion".to_string(), up.resource_version.clone()));
        Some((up.path.clone(), query, token))
    }

    fn mark_streaming(&self, key: &ChannelKey) {
        if let Some(up) = self.tables.lock().upstreams.get_mut(key) {
            up.connecting = false;
            up.attempts = 0;
            up.last_active = Utc::now();
        }
    }

    fn reset_resource_version(&self, key: &ChannelKey) {
        if let Some(up) = self.tables.lock().upstreams.get_mut(key) {
            up.resource_version = self.config.initial_resource_version.clone();
        }
    }

    /// Drain one connection: decode chunks, split into lines buffering the
    /// trailing partial line, dispatch each line.
    async fn read_stream(&self, key: &ChannelKey, mut stream: ByteStream) -> StreamOutcome {
        let mut pending = String::new();
        while let Some(chunk) = stream.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(error) => return StreamOutcome::Failed(error),
            };
            pending.push_str(&String::from_utf8_lossy(&chunk));
            while let Some(newline) = pending.find('\n') {
                let line: String = pending.drain(..=newline).collect();
                match self.handle_line(key, line.trim_end_matches(['\n', '\r'])) {
                    LineAction::Continue => {}
                    LineAction::Expired => return StreamOutcome::Expired,
                }
            }
        }
        if !pending.is_empty() {
            // tolerate a final event without a trailing newline
            if let LineAction::Expired = self.handle_line(key, pending.trim_end_matches('\r')) {
                return StreamOutcome::Expired;
            }
        }
        StreamOutcome::End
    }

    /// Dispatch one decoded line, in upstream arrival order.
    fn handle_line(&self, key: &ChannelKey, line: &str) -> LineAction {
        let Some(event) = parser::parse(line) else {
            return LineAction::Continue;
        };

        if event.is_error() {
            if event.is_expired() {
                return LineAction::Expired;
            }
            let status = event.status();
            warn!(
                channel = %key,
                code = ?status.code,
                reason = ?status.reason,
                "upstream watch error"
            );
            self.broadcast_to_channel(key, ServerEvent::watch_error(key.clone(), status));
            return LineAction::Continue;
        }

        let resource_version = parser::extract_resource_version(&event.object);
        {
            let mut guard = self.tables.lock();
            if let Some(up) = guard.upstreams.get_mut(key) {
                up.last_active = Utc::now();
                if let Some(version) = &resource_version {
                    up.resource_version = version.clone();
                }
            }
        }
        self.broadcast_to_channel(
            key,
            ServerEvent::Watch {
                channel: key.clone(),
                kind: event.kind,
                object: event.object,
                resource_version,
            },
        );
        LineAction::Continue
    }

    /// Count a connection failure. Sleeps out the backoff delay and
    /// returns false to retry, or broadcasts the final `watch-error` and
    /// tears the channel down, returning true.
    async fn backoff_or_give_up(&self, key: &ChannelKey, error: &UpstreamError) -> bool {
        let (attempts, idle_secs) = {
            let mut guard = self.tables.lock();
            let Some(up) = guard.upstreams.get_mut(key) else {
                return true;
            };
            up.connecting = false;
            up.attempts += 1;
            (up.attempts, (Utc::now() - up.last_active).num_seconds())
        };

        if attempts > self.config.max_reconnect_attempts {
            warn!(channel = %key, %error, "max reconnection attempts exceeded, tearing channel down");
            self.broadcast_to_channel(
                key,
                ServerEvent::WatchError {
                    channel: key.clone(),
                    code: None,
                    reason: None,
                    message: Some("max reconnection attempts exceeded".to_string()),
                },
            );
            self.teardown_channel(key);
            return true;
        }

        let delay = self
            .config
            .reconnect_base_delay_ms
            .saturating_mul(2u64.saturating_pow(attempts - 1));
        warn!(
            channel = %key,
            attempt = attempts,
            delay_ms = delay,
            idle_secs,
            %error,
            "upstream connection failed, retrying"
        );
        metrics::record_upstream_reconnect();
        tokio::time::sleep(Duration::from_millis(delay)).await;
        false
    }

    /// Remove the upstream and every membership record for its channel.
    /// Called from the channel's own reader task, which returns right
    /// after, so the task handle is dropped rather than aborted.
    fn teardown_channel(&self, key: &ChannelKey) {
        let mut guard = self.tables.lock();
        let tables = &mut *guard;
        if let Some(mut up) = tables.upstreams.remove(key) {
            up.task.take();
            metrics::record_upstream_closed();
        }
        if let Some(timer) = tables.grace_timers.remove(key) {
            timer.abort();
        }
        if let Some(subscribers) = tables.subscriptions.remove(key) {
            for id in subscribers {
                if let Some(client) = tables.clients.get_mut(&id) {
                    client.channels.remove(key);
                }
            }
        }
    }
}
