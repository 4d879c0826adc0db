// Per-topic callback registries with identity-based removal

use crate::protocol::{ChatMessage, ConnectionStatus};
use std::collections::HashMap;
use std::sync::Arc;

/// Callback invoked for each chat message delivered on a topic
pub type MessageHandler = Arc<dyn Fn(&ChatMessage) + Send + Sync>;

/// Callback invoked on every connection status transition
pub type StatusHandler = Arc<dyn Fn(ConnectionStatus) + Send + Sync>;

/// Two handles refer to the same callback when they share an allocation.
/// Compares data pointers only, ignoring vtables.
fn same_callback<T: ?Sized>(a: &Arc<T>, b: &Arc<T>) -> bool {
    std::ptr::eq(Arc::as_ptr(a) as *const (), Arc::as_ptr(b) as *const ())
}

/// Unordered set of callbacks keyed by reference identity
pub struct CallbackSet<T: ?Sized> {
    entries: Vec<Arc<T>>,
}

impl<T: ?Sized> CallbackSet<T> {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Insert unless the same callback is already present. Returns whether it was added.
    pub fn insert(&mut self, callback: Arc<T>) -> bool {
        if self.contains(&callback) {
            return false;
        }
        self.entries.push(callback);
        true
    }

    /// Remove a callback if present. Returns whether anything was removed.
    pub fn remove(&mut self, callback: &Arc<T>) -> bool {
        let before = self.entries.len();
        self.entries.retain(|existing| !same_callback(existing, callback));
        self.entries.len() != before
    }

    pub fn contains(&self, callback: &Arc<T>) -> bool {
        self.entries.iter().any(|existing| same_callback(existing, callback))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Cloned handles, so callers can invoke them without holding a lock
    pub fn snapshot(&self) -> Vec<Arc<T>> {
        self.entries.clone()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

impl<T: ?Sized> Default for CallbackSet<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Topic → message callbacks
#[derive(Default)]
pub struct HandlerRegistry {
    topics: HashMap<String, CallbackSet<dyn Fn(&ChatMessage) + Send + Sync>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, topic: &str, handler: MessageHandler) -> bool {
        self.topics.entry(topic.to_string()).or_default().insert(handler)
    }

    /// No-op for unknown topics or callbacks never registered
    pub fn remove(&mut self, topic: &str, handler: &MessageHandler) -> bool {
        let Some(set) = self.topics.get_mut(topic) else {
            return false;
        };
        let removed = set.remove(handler);
        if set.is_empty() {
            self.topics.remove(topic);
        }
        removed
    }

    pub fn handlers_for(&self, topic: &str) -> Vec<MessageHandler> {
        self.topics
            .get(topic)
            .map(CallbackSet::snapshot)
            .unwrap_or_default()
    }

    pub fn count(&self, topic: &str) -> usize {
        self.topics.get(topic).map(CallbackSet::len).unwrap_or(0)
    }

    pub fn clear(&mut self) {
        self.topics.clear();
    }
}
