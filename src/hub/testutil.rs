//! Shared test doubles for hub unit tests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::UpstreamError;

use super::channel::WatchTarget;
use super::messages::ServerEvent;
use super::source::{ByteStream, WatchSource};
use super::transport::{ClientTransport, TransportError};

/// Transport that records everything the hub sends and can be flipped
/// into a failing state to simulate a dead socket.
pub(crate) struct RecordingTransport {
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

/// Source whose connections open successfully and then never yield,
/// keeping the upstream pinned in its streaming state.
pub(crate) struct PendingSource {
    opens: AtomicUsize,
}

impl PendingSource {
    pub fn new() -> Self {
        Self {
            opens: AtomicUsize::new(0),
        }
    }

    pub fn open_count(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WatchSource for PendingSource {
    async fn open(
        &self,
        _path: &str,
        _query: &[(String, String)],
        _token: &str,
    ) -> Result<ByteStream, UpstreamError> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        Ok(Box::pin(futures::stream::pending()))
    }
}

/// Project-scoped target shorthand.
pub(crate) fn target(resource: &str, project: &str) -> WatchTarget {
    WatchTarget {
        resource_type: resource.to_string(),
        project_id: Some(project.to_string()),
        ..Default::default()
    }
}
