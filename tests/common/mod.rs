//! Shared helpers for hub integration tests: a scripted watch source and
//! a recording transport, driving the hub through its two seams without a
//! network.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream;
use futures::StreamExt;
use parking_lot::Mutex;

use watch_hub::error::UpstreamError;
use watch_hub::hub::source::{ByteStream, WatchSource};
use watch_hub::hub::transport::{ClientTransport, TransportError};
use watch_hub::hub::{Hub, HubConfig, ServerEvent, WatchTarget};

/// One scripted upstream connection.
pub enum Script {
    /// The open call itself fails
    FailOpen,
    /// Emit these lines, then end the stream cleanly
    Lines(Vec<String>),
    /// Emit these lines, then keep the connection open forever
    LinesThenHang(Vec<String>),
    /// Emit these lines, then fail the stream read
    LinesThenError(Vec<String>),
}

/// Everything the source saw for one open call.
#[derive(Debug, Clone)]
pub struct OpenRecord {
    pub path: String,
    pub query: Vec<(String, String)>,
    pub token: String,
}

impl OpenRecord {
    pub fn query_value(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// Watch source that plays back scripts in order; once they run out,
/// connections open successfully and hang.
pub struct ScriptedSource {
    scripts: Mutex<VecDeque<Script>>,
    opens: Mutex<Vec<OpenRecord>>,
}

impl ScriptedSource {
    pub fn new(scripts: Vec<Script>) -> Arc<Self> {
        Arc::new(Self {
            scripts: Mutex::new(scripts.into()),
            opens: Mutex::new(Vec::new()),
        })
    }

    pub fn open_count(&self) -> usize {
        self.opens.lock().len()
    }

    pub fn opens(&self) -> Vec<OpenRecord> {
        self.opens.lock().clone()
    }
}

fn line_chunks(lines: Vec<String>) -> Vec<Result<Bytes, UpstreamError>> {
    lines
        .into_iter()
        .map(|line| Ok(Bytes::from(format!("{}\n", line))))
        .collect()
}

#[async_trait]
impl WatchSource for ScriptedSource {
    async fn open(
        &self,
        path: &str,
        query: &[(String, String)],
        token: &str,
    ) -> Result<ByteStream, UpstreamError> {
        self.opens.lock().push(OpenRecord {
            path: path.to_string(),
            query: query.to_vec(),
            token: token.to_string(),
        });

        let script = self.scripts.lock().pop_front();
        match script {
            None => Ok(Box::pin(stream::pending())),
            Some(Script::FailOpen) => Err(UpstreamError::Status(503)),
            Some(Script::Lines(lines)) => Ok(Box::pin(stream::iter(line_chunks(lines)))),
            Some(Script::LinesThenHang(lines)) => Ok(Box::pin(
                stream::iter(line_chunks(lines)).chain(stream::pending()),
            )),
            Some(Script::LinesThenError(lines)) => Ok(Box::pin(
                stream::iter(line_chunks(lines)).chain(stream::once(async {
                    Err(UpstreamError::Read("connection reset".to_string()))
                })),
            )),
        }
    }
}

/// Transport that records every event the hub delivers and can be flipped
/// into a failing state.
pub struct RecordingTransport {
    events: Mutex<Vec<ServerEvent>>,
    failing: AtomicBool,
}

impl RecordingTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            events: Mutex::new(Vec::new()),
            failing: AtomicBool::new(false),
        })
    }

    pub fn events(&self) -> Vec<ServerEvent> {
        self.events.lock().clone()
    }

    pub fn watch_events(&self) -> Vec<ServerEvent> {
        self.events()
            .into_iter()
            .filter(|e| matches!(e, ServerEvent::Watch { .. }))
            .collect()
    }

    pub fn watch_errors(&self) -> Vec<ServerEvent> {
        self.events()
            .into_iter()
            .filter(|e| matches!(e, ServerEvent::WatchError { .. }))
            .collect()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

impl ClientTransport for RecordingTransport {
    fn send(&self, event: ServerEvent) -> Result<(), TransportError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        self.events.lock().push(event);
        Ok(())
    }
}

/// Hub config with short timings so tests finish quickly.
pub fn fast_config() -> HubConfig {
    HubConfig {
        grace_period_ms: 150,
        reconnect_base_delay_ms: 20,
        expired_retry_delay_ms: 10,
        stream_end_delay_ms: 20,
        max_reconnect_attempts: 2,
        ..Default::default()
    }
}

pub fn make_hub(config: HubConfig, source: Arc<ScriptedSource>) -> Arc<Hub> {
    Hub::new(config, source)
}

pub fn project_target(resource: &str, project: &str) -> WatchTarget {
    WatchTarget {
        resource_type: resource.to_string(),
        project_id: Some(project.to_string()),
        ..Default::default()
    }
}

/// A data event line as the upstream emits it.
pub fn watch_line(kind: &str, name: &str, resource_version: &str) -> String {
    format!(
        r#"{{"type":"{}","object":{{"metadata":{{"name":"{}","resourceVersion":"{}"}}}}}}"#,
        kind, name, resource_version
    )
}

/// An ERROR event line carrying a status object.
pub fn error_line(code: u16, reason: &str, message: &str) -> String {
    format!(
        r#"{{"type":"ERROR","object":{{"code":{},"reason":"{}","message":"{}"}}}}"#,
        code, reason, message
    )
}
