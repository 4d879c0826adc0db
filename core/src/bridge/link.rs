// Client → host channel abstraction

use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LinkError {
    #[error("Host is not reachable")]
    Closed,
}

/// One-way command channel from a bridge client to the host.
///
/// Payloads are wire JSON, the same shape a service worker receives through
/// `postMessage`. Posting never waits for the host to act.
pub trait HostLink: Send + Sync {
    fn post(&self, command: Value) -> Result<(), LinkError>;
}

impl<T: HostLink + ?Sized> HostLink for Arc<T> {
    fn post(&self, command: Value) -> Result<(), LinkError> {
        (**self).post(command)
    }
}

/// Link that records every command, for tests and for hosts that pull commands
#[derive(Debug, Clone, Default)]
pub struct RecordingLink {
    sent: Arc<parking_lot::Mutex<Vec<Value>>>,
    closed: Arc<parking_lot::RwLock<bool>>,
}

impl RecordingLink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Commands posted so far
    pub fn sent(&self) -> Vec<Value> {
        self.sent.lock().clone()
    }

    /// Remove and return everything posted so far
    pub fn drain(&self) -> Vec<Value> {
        std::mem::take(&mut *self.sent.lock())
    }

    /// Number of posted commands with the given action
    pub fn count_action(&self, action: &str) -> usize {
        self.sent
            .lock()
            .iter()
            .filter(|cmd| cmd.get("action").and_then(Value::as_str) == Some(action))
            .count()
    }

    /// Simulate the host becoming unreachable
    pub fn close(&self) {
        *self.closed.write() = true;
    }
}

impl HostLink for RecordingLink {
    fn post(&self, command: Value) -> Result<(), LinkError> {
        if *self.closed.read() {
            return Err(LinkError::Closed);
        }
        self.sent.lock().push(command);
        Ok(())
    }
}
