//! Channel key derivation and watch endpoint construction
//!
//! A channel key is the dedup identity of a watched-resource selector. The
//! derivation must match the browser client's own key building byte for
//! byte, so that independently issued subscribe/unsubscribe calls for the
//! same resource always collide on one upstream.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Deterministic identifier for a unique watched-resource selector.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelKey(String);

impl ChannelKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChannelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for ChannelKey {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for ChannelKey {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Selector for a watched resource, as sent by a subscribing session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WatchTarget {
    pub resource_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub org_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label_selector: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field_selector: Option<String>,
}

impl WatchTarget {
    /// Derive the channel key: the seven selector fields joined with `/`
    /// in fixed order, absent fields rendered empty. Shared contract with
    /// the browser client; do not change the order or the separator.
    pub fn channel_key(&self) -> ChannelKey {
        let field = |v: &Option<String>| v.clone().unwrap_or_default();
        ChannelKey(format!(
            "{}/{}/{}/{}/{}/{}/{}",
            self.resource_type,
            field(&self.org_id),
            field(&self.project_id),
            field(&self.namespace),
            field(&self.name),
            field(&self.label_selector),
            field(&self.field_selector),
        ))
    }

    /// Resolve the upstream watch path for this selector's scope.
    ///
    /// Scope precedence when several scope fields are present:
    /// project > organization > namespace > cluster.
    pub fn watch_path(&self) -> String {
        if let Some(project) = &self.project_id {
            format!("/apis/project/v1/projects/{}/{}", project, self.resource_type)
        } else if let Some(org) = &self.org_id {
            format!("/apis/org/v1/orgs/{}/{}", org, self.resource_type)
        } else if let Some(namespace) = &self.namespace {
            format!("/api/v1/namespaces/{}/{}", namespace, self.resource_type)
        } else {
            format!("/api/v1/{}", self.resource_type)
        }
    }

    /// A single-name watch is expressed as a `metadata.name` equality
    /// clause merged into the field selector, not as a distinct endpoint.
    pub fn effective_field_selector(&self) -> Option<String> {
        match (&self.name, &self.field_selector) {
            (Some(name), Some(fields)) => Some(format!("metadata.name={},{}", name, fields)),
            (Some(name), None) => Some(format!("metadata.name={}", name)),
            (None, Some(fields)) => Some(fields.clone()),
            (None, None) => None,
        }
    }

    /// Query parameters common to every connect attempt for this target.
    /// `resourceVersion` is appended per attempt by the upstream manager.
    pub fn base_query(&self, timeout_secs: u64) -> Vec<(String, String)> {
        let mut query = vec![
            ("watch".to_string(), "true".to_string()),
            ("timeoutSeconds".to_string(), timeout_secs.to_string()),
        ];
        if let Some(labels) = &self.label_selector {
            query.push(("labelSelector".to_string(), labels.clone()));
        }
        if let Some(fields) = self.effective_field_selector() {
            query.push(("fieldSelector".to_string(), fields));
        }
        query
    }
}
