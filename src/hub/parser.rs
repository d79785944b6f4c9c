//! Watch line parsing
//!
//! The upstream watch endpoint emits newline-delimited JSON events of the
//! shape `{"type": "...", "object": {...}}`. `ERROR` events carry a status
//! object instead of a resource; a 410 / "Expired" status means the resume
//! token fell out of the server's retention window.

use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

/// One decoded line from an upstream watch stream.
#[derive(Debug, Clone, Deserialize)]
pub struct RawWatchEvent {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub object: Value,
}

/// Status fields of an `ERROR` event's object.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WatchStatus {
    pub code: Option<u16>,
    pub reason: Option<String>,
    pub message: Option<String>,
}

impl RawWatchEvent {
    pub fn is_error(&self) -> bool {
        self.kind == "ERROR"
    }

    pub fn status(&self) -> WatchStatus {
        serde_json::from_value(self.object.clone()).unwrap_or_default()
    }

    /// True when the event signals a stale resource version (code 410 or
    /// reason "Expired"); recovery is to restart the watch from the
    /// initial version.
    pub fn is_expired(&self) -> bool {
        let status = self.status();
        status.code == Some(410) || status.reason.as_deref() == Some("Expired")
    }
}

/// Decode one stream line. Blank and undecodable lines yield `None`.
pub fn parse(line: &str) -> Option<RawWatchEvent> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    match serde_json::from_str(line) {
        Ok(event) => Some(event),
        Err(error) => {
            debug!(%error, "discarding undecodable watch line");
            None
        }
    }
}

/// Pull the resource version token out of a watched object, if present.
pub fn extract_resource_version(object: &Value) -> Option<String> {
    object
        .get("metadata")?
        .get("resourceVersion")?
        .as_str()
        .map(str::to_owned)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_data_event() {
        let line = r#"{"type":"ADDED","object":{"metadata":{"name":"a","resourceVersion":"12"}}}"#;
        let event = parse(line).unwrap();
        assert_eq!(event.kind, "ADDED");
        assert!(!event.is_error());
        assert_eq!(
            extract_resource_version(&event.object).as_deref(),
            Some("12")
        );
    }

    #[test]
    fn test_parse_rejects_blank_and_garbage() {
        assert!(parse("").is_none());
        assert!(parse("   ").is_none());
        assert!(parse("not json at all").is_none());
        assert!(parse("{\"type\": ").is_none());
    }

    #[test]
    fn test_expired_by_code() {
        let line = r#"{"type":"ERROR","object":{"code":410,"reason":"Gone","message":"too old"}}"#;
        let event = parse(line).unwrap();
        assert!(event.is_error());
        assert!(event.is_expired());
    }

    #[test]
    fn test_expired_by_reason() {
        let line = r#"{"type":"ERROR","object":{"reason":"Expired","message":"too old resource version"}}"#;
        let event = parse(line).unwrap();
        assert!(event.is_expired());
    }

    #[test]
    fn test_non_expired_error() {
        let line = r#"{"type":"ERROR","object":{"code":500,"reason":"InternalError","message":"boom"}}"#;
        let event = parse(line).unwrap();
        assert!(event.is_error());
        assert!(!event.is_expired());

        let status = event.status();
        assert_eq!(status.code, Some(500));
        assert_eq!(status.reason.as_deref(), Some("InternalError"));
        assert_eq!(status.message.as_deref(), Some("boom"));
    }

    #[test]
    fn test_missing_resource_version() {
        let object = json!({"metadata": {"name": "a"}});
        assert!(extract_resource_version(&object).is_none());
        assert!(extract_resource_version(&json!({})).is_none());
    }
}
