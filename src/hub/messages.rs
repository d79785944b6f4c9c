//! Hub wire protocol
//!
//! Messages are JSON-encoded. `ClientMessage` frames arrive from browser
//! sessions over the push channel; `ServerEvent` is the closed set of
//! events the hub pushes back.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::channel::{ChannelKey, WatchTarget};
use super::parser::WatchStatus;
use super::registry::ClientId;

/// Frame sent from a session to the hub.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Subscribe to a resource selector. Carries a fresh bearer token;
    /// the hub refreshes the client's stored token on every subscribe.
    Subscribe {
        token: String,
        #[serde(flatten)]
        target: WatchTarget,
    },
    /// Drop a subscription by channel key.
    Unsubscribe { channel: ChannelKey },
    /// Keep-alive; counts as transport activity for idle pruning.
    Ping {
        #[serde(default)]
        timestamp: Option<DateTime<Utc>>,
    },
}

/// Event pushed from the hub to a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum ServerEvent {
    /// Session accepted; carries the identity assigned by the hub.
    Connected {
        #[serde(rename = "clientId")]
        client_id: ClientId,
    },
    /// Subscription acknowledged.
    Subscribed { channel: ChannelKey },
    /// Unsubscription acknowledged.
    Unsubscribed { channel: ChannelKey },
    /// One upstream watch event, fanned out verbatim and in arrival order.
    Watch {
        channel: ChannelKey,
        #[serde(rename = "type")]
        kind: String,
        object: Value,
        #[serde(rename = "resourceVersion", skip_serializing_if = "Option::is_none")]
        resource_version: Option<String>,
    },
    /// A non-recoverable or upstream-reported watch failure.
    WatchError {
        channel: ChannelKey,
        #[serde(skip_serializing_if = "Option::is_none")]
        code: Option<u16>,
        #[serde(skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    /// Periodic liveness probe.
    Heartbeat { ts: DateTime<Utc> },
}

impl ServerEvent {
    /// Build a `watch-error` from an upstream status object.
    pub fn watch_error(channel: ChannelKey, status: WatchStatus) -> Self {
        ServerEvent::WatchError {
            channel,
            code: status.code,
            reason: status.reason,
            message: status.message,
        }
    }
}
