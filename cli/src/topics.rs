// Per-topic message handlers for the interactive session
//
// One handler per topic, registered on join and removed on leave, so a topic
// joined again never ends up with two handlers printing the same message.

use peerchat_core::bridge::{BridgeClient, MessageHandler};
use std::collections::HashMap;

#[derive(Default)]
pub struct TopicHandlers {
    handlers: HashMap<String, MessageHandler>,
}

impl TopicHandlers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to `topic` and register its handler, built by `make` the first time.
    /// Returns false if the bridge refused the subscribe.
    pub fn join(
        &mut self,
        bridge: &BridgeClient,
        topic: &str,
        make: impl FnOnce() -> MessageHandler,
    ) -> bool {
        if !bridge.subscribe(topic) {
            return false;
        }
        let handler = self
            .handlers
            .entry(topic.to_string())
            .or_insert_with(make)
            .clone();
        bridge.add_message_handler(topic, handler);
        true
    }

    /// Unsubscribe from `topic` and stop delivering its messages
    pub fn leave(&mut self, bridge: &BridgeClient, topic: &str) -> bool {
        if !bridge.unsubscribe(topic) {
            return false;
        }
        if let Some(handler) = self.handlers.get(topic) {
            bridge.remove_message_handler(topic, handler);
        }
        true
    }

    pub fn is_joined(&self, bridge: &BridgeClient, topic: &str) -> bool {
        bridge.intended_topics().iter().any(|t| t == topic)
    }
}
