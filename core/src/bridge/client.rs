// Bridge client — the foreground view of host state
//
// Translates UI calls into host commands and rebuilds local state from host
// events. The host's topic set does not survive a restart, so the client's
// recorded intent is replayed on every `ipfs_ready`.

use super::handlers::{CallbackSet, HandlerRegistry, MessageHandler, StatusHandler};
use super::link::HostLink;
use crate::protocol::{
    ChatMessage, ConnectionStatus, HostCommand, HostEvent, InboundMessage, PeerLinkStatus,
};
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use std::collections::{BTreeSet, HashSet};
use std::sync::{Arc, OnceLock};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BridgeError {
    #[error("Host not ready")]
    NotReady,
    #[error("Host unavailable")]
    HostUnavailable,
    #[error("Bridge disposed")]
    Disposed,
}

/// Outcome of a tracked publish, as reported by the host
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishOutcome {
    pub topic: String,
    pub message_id: String,
    pub success: bool,
    pub error: Option<String>,
}

struct PendingPublish {
    request_id: String,
    topic: String,
    reply: oneshot::Sender<PublishOutcome>,
}

struct BridgeState {
    ready: bool,
    peer_id: Option<String>,
    status: ConnectionStatus,
    /// Mirror of host subscriptions, optimistically updated
    subscribed: HashSet<String>,
    /// Topics the UI asked for; replayed on every ready
    intent: HashSet<String>,
    known_peers: BTreeSet<String>,
    disposed: bool,
}

pub struct BridgeClient {
    state: RwLock<BridgeState>,
    link: RwLock<Option<Arc<dyn HostLink>>>,
    message_handlers: RwLock<HandlerRegistry>,
    status_handlers: RwLock<CallbackSet<dyn Fn(ConnectionStatus) + Send + Sync>>,
    pending_publishes: Mutex<Vec<PendingPublish>>,
}

static GLOBAL_BRIDGE: OnceLock<Arc<BridgeClient>> = OnceLock::new();

impl BridgeClient {
    /// Create a client in the `connecting` state, not yet attached to a host
    pub fn new() -> Self {
        Self {
            state: RwLock::new(BridgeState {
                ready: false,
                peer_id: None,
                status: ConnectionStatus::Connecting,
                subscribed: HashSet::new(),
                intent: HashSet::new(),
                known_peers: BTreeSet::new(),
                disposed: false,
            }),
            link: RwLock::new(None),
            message_handlers: RwLock::new(HandlerRegistry::new()),
            status_handlers: RwLock::new(CallbackSet::new()),
            pending_publishes: Mutex::new(Vec::new()),
        }
    }

    /// The process-wide bridge instance
    pub fn global() -> Arc<BridgeClient> {
        GLOBAL_BRIDGE
            .get_or_init(|| Arc::new(BridgeClient::new()))
            .clone()
    }

    // ------------------------------------------------------------------
    // Host registration
    // ------------------------------------------------------------------

    /// Register the host channel and ask it to announce readiness.
    ///
    /// Called again whenever a new host instance becomes active.
    pub fn attach(&self, link: Arc<dyn HostLink>) {
        if self.state.read().disposed {
            tracing::warn!("attach ignored: bridge disposed");
            return;
        }
        *self.link.write() = Some(link);
        tracing::info!("Host attached, sending init");
        self.send_command(HostCommand::Init);
    }

    /// Drop the host channel. The client stays disconnected until the next ready.
    pub fn detach(&self) {
        self.link.write().take();
        self.mark_disconnected("host detached");
    }

    fn send_command(&self, command: HostCommand) -> bool {
        let link = self.link.read().clone();
        let Some(link) = link else {
            tracing::warn!("Host not registered yet, dropping {}", command.action());
            return false;
        };

        let action = command.action();
        match link.post(command.to_value()) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("Failed to post {} to host: {}", action, e);
                self.mark_disconnected("host unreachable");
                false
            }
        }
    }

    fn mark_disconnected(&self, reason: &str) {
        {
            let mut state = self.state.write();
            if state.disposed {
                return;
            }
            state.ready = false;
        }
        tracing::info!("Bridge disconnected: {}", reason);
        self.fail_pending_publishes(reason);
        self.set_status(ConnectionStatus::Disconnected);
    }

    /// Settle every outstanding tracked publish; no result can arrive for them now
    fn fail_pending_publishes(&self, reason: &str) {
        let pending: Vec<PendingPublish> = self.pending_publishes.lock().drain(..).collect();
        for entry in pending {
            let _ = entry.reply.send(PublishOutcome {
                topic: entry.topic,
                message_id: String::new(),
                success: false,
                error: Some(format!("host unavailable: {}", reason)),
            });
        }
    }

    fn set_status(&self, status: ConnectionStatus) {
        self.state.write().status = status;
        let handlers = self.status_handlers.read().snapshot();
        for handler in handlers {
            handler(status);
        }
    }

    // ------------------------------------------------------------------
    // UI operations
    // ------------------------------------------------------------------

    pub fn subscribe(&self, topic: &str) -> bool {
        if !self.is_ready() {
            tracing::warn!("Cannot subscribe to {}: host not ready", topic);
            return false;
        }

        let sent = self.send_command(HostCommand::Subscribe {
            topic: topic.to_string(),
        });
        if sent {
            let mut state = self.state.write();
            state.intent.insert(topic.to_string());
            state.subscribed.insert(topic.to_string());
        }
        sent
    }

    pub fn unsubscribe(&self, topic: &str) -> bool {
        if !self.is_ready() {
            tracing::warn!("Cannot unsubscribe from {}: host not ready", topic);
            return false;
        }

        let sent = self.send_command(HostCommand::Unsubscribe {
            topic: topic.to_string(),
        });
        if sent {
            let mut state = self.state.write();
            state.intent.remove(topic);
            state.subscribed.remove(topic);
        }
        sent
    }

    /// Fire-and-forget publish. Delivery is reported later as `publish_result`.
    pub fn publish(&self, topic: &str, message: Value) -> bool {
        if !self.is_ready() {
            tracing::warn!("Cannot publish to {}: host not ready", topic);
            return false;
        }

        self.send_command(HostCommand::Publish {
            topic: topic.to_string(),
            message,
            request_id: Some(uuid::Uuid::new_v4().to_string()),
        })
    }

    pub fn publish_chat(&self, topic: &str, message: &ChatMessage) -> bool {
        self.publish(topic, message.to_value())
    }

    /// Publish and get a receiver for the matching `publish_result`.
    pub fn publish_tracked(
        &self,
        topic: &str,
        message: Value,
    ) -> Result<oneshot::Receiver<PublishOutcome>, BridgeError> {
        if self.state.read().disposed {
            return Err(BridgeError::Disposed);
        }
        if !self.is_ready() {
            return Err(BridgeError::NotReady);
        }

        let request_id = uuid::Uuid::new_v4().to_string();
        let (reply, rx) = oneshot::channel();
        self.pending_publishes.lock().push(PendingPublish {
            request_id: request_id.clone(),
            topic: topic.to_string(),
            reply,
        });

        let sent = self.send_command(HostCommand::Publish {
            topic: topic.to_string(),
            message,
            request_id: Some(request_id.clone()),
        });
        if !sent {
            self.pending_publishes
                .lock()
                .retain(|p| p.request_id != request_id);
            return Err(BridgeError::HostUnavailable);
        }
        Ok(rx)
    }

    /// Ask the host for its connected peers; answered by `peer_list`
    pub fn request_peer_list(&self) -> bool {
        self.send_command(HostCommand::GetPeers)
    }

    pub fn add_message_handler(&self, topic: &str, handler: MessageHandler) {
        if self.state.read().disposed {
            return;
        }
        self.message_handlers.write().add(topic, handler);
    }

    pub fn remove_message_handler(&self, topic: &str, handler: &MessageHandler) {
        self.message_handlers.write().remove(topic, handler);
    }

    pub fn add_status_handler(&self, handler: StatusHandler) {
        if self.state.read().disposed {
            return;
        }
        self.status_handlers.write().insert(handler);
    }

    pub fn remove_status_handler(&self, handler: &StatusHandler) {
        self.status_handlers.write().remove(handler);
    }

    /// Unregister every listener and detach from the host.
    /// Late events are ignored afterwards.
    pub fn dispose(&self) {
        self.state.write().disposed = true;
        self.message_handlers.write().clear();
        self.status_handlers.write().clear();
        self.pending_publishes.lock().clear();
        self.link.write().take();
        tracing::info!("Bridge disposed");
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    pub fn is_ready(&self) -> bool {
        let state = self.state.read();
        state.ready && !state.disposed
    }

    pub fn peer_id(&self) -> Option<String> {
        self.state.read().peer_id.clone()
    }

    pub fn connection_status(&self) -> ConnectionStatus {
        self.state.read().status
    }

    /// Host-side subscriptions as last observed, sorted
    pub fn subscribed_topics(&self) -> Vec<String> {
        let mut topics: Vec<String> = self.state.read().subscribed.iter().cloned().collect();
        topics.sort();
        topics
    }

    /// Topics the UI asked for, sorted
    pub fn intended_topics(&self) -> Vec<String> {
        let mut topics: Vec<String> = self.state.read().intent.iter().cloned().collect();
        topics.sort();
        topics
    }

    pub fn known_peers(&self) -> Vec<String> {
        self.state.read().known_peers.iter().cloned().collect()
    }

    pub fn is_disposed(&self) -> bool {
        self.state.read().disposed
    }

    // ------------------------------------------------------------------
    // Host events
    // ------------------------------------------------------------------

    /// Handle a raw wire event; unknown shapes are ignored
    pub fn handle_raw_event(&self, raw: &Value) {
        match HostEvent::from_value(raw) {
            Some(event) => self.handle_event(event),
            None => tracing::debug!("Ignoring unrecognised host event: {}", raw),
        }
    }

    pub fn handle_event(&self, event: HostEvent) {
        if self.state.read().disposed {
            return;
        }
        tracing::debug!("Host event received: {}", event.kind());

        match event {
            HostEvent::Ready { peer_id } => self.on_ready(peer_id),
            HostEvent::Message { topic, message } => self.on_message(&topic, &message),
            HostEvent::Subscription { topic, subscribed } => {
                let mut state = self.state.write();
                if subscribed {
                    state.subscribed.insert(topic);
                } else {
                    state.subscribed.remove(&topic);
                }
            }
            HostEvent::Subscriptions { topics } => {
                self.state.write().subscribed = topics.into_iter().collect();
            }
            HostEvent::PublishResult {
                topic,
                message_id,
                success,
                error,
                request_id,
            } => {
                if success {
                    tracing::debug!("Publish on {} accepted ({})", topic, message_id);
                } else {
                    tracing::warn!(
                        "Publish on {} failed ({}): {}",
                        topic,
                        message_id,
                        error.as_deref().unwrap_or("unknown error")
                    );
                }
                self.resolve_publish(
                    request_id.as_deref(),
                    PublishOutcome {
                        topic,
                        message_id,
                        success,
                        error,
                    },
                );
            }
            HostEvent::PeerConnection { peer_id, status } => {
                tracing::info!("Peer {} {:?}", peer_id, status);
                let mut state = self.state.write();
                match status {
                    PeerLinkStatus::Connected => state.known_peers.insert(peer_id),
                    PeerLinkStatus::Disconnected => state.known_peers.remove(&peer_id),
                };
            }
            HostEvent::PeerList { peers } => {
                self.state.write().known_peers = peers.into_iter().collect();
            }
            HostEvent::ConnectionStatus { status } => match status {
                ConnectionStatus::Disconnected => self.mark_disconnected("host lost its network"),
                other => tracing::debug!("Host transport reports {}", other),
            },
        }
    }

    fn on_ready(&self, peer_id: String) {
        let replay: Vec<String> = {
            let mut state = self.state.write();
            state.ready = true;
            state.peer_id = Some(peer_id.clone());
            let mut topics: Vec<String> = state.intent.iter().cloned().collect();
            topics.sort();
            topics
        };
        tracing::info!("Host ready as {}, replaying {} topic(s)", peer_id, replay.len());
        self.set_status(ConnectionStatus::Connected);

        for topic in replay {
            if self.send_command(HostCommand::Subscribe {
                topic: topic.clone(),
            }) {
                self.state.write().subscribed.insert(topic);
            }
        }
        self.send_command(HostCommand::GetSubscriptions);
    }

    fn on_message(&self, topic: &str, payload: &Value) {
        match InboundMessage::classify(payload) {
            InboundMessage::Chat(message) => {
                let handlers = self.message_handlers.read().handlers_for(topic);
                for handler in handlers {
                    handler(&message);
                }
            }
            InboundMessage::Internal(kind) => {
                tracing::trace!("Consumed internal {:?} on {}", kind, topic);
            }
            InboundMessage::Malformed(reason) => {
                tracing::debug!("Dropping malformed message on {}: {}", topic, reason);
            }
        }
    }

    /// Only a matching request id settles a tracked publish. Results without one
    /// come from other clients sharing the host.
    fn resolve_publish(&self, request_id: Option<&str>, outcome: PublishOutcome) {
        let Some(id) = request_id else {
            return;
        };
        let mut pending = self.pending_publishes.lock();
        if let Some(index) = pending.iter().position(|p| p.request_id == id) {
            let entry = pending.remove(index);
            let _ = entry.reply.send(outcome);
        }
    }

    /// Apply host events until the channel closes, then mark the host lost
    pub async fn run_event_loop(self: Arc<Self>, mut events: mpsc::UnboundedReceiver<HostEvent>) {
        while let Some(event) = events.recv().await {
            self.handle_event(event);
        }
        self.mark_disconnected("host channel closed");
    }
}

impl Default for BridgeClient {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::link::RecordingLink;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn attached() -> (BridgeClient, RecordingLink) {
        let client = BridgeClient::new();
        let link = RecordingLink::new();
        client.attach(Arc::new(link.clone()));
        (client, link)
    }

    fn ready(client: &BridgeClient, peer: &str) {
        client.handle_event(HostEvent::Ready {
            peer_id: peer.to_string(),
        });
    }

    fn chat(topic: &str, kind: Option<&str>) -> HostEvent {
        let mut message = json!({
            "id": "m1", "from": "a", "to": "b", "content": "hello", "timestamp": 1
        });
        if let Some(kind) = kind {
            message["type"] = json!(kind);
        }
        HostEvent::Message {
            topic: topic.to_string(),
            message,
        }
    }

    #[test]
    fn test_starts_connecting() {
        let client = BridgeClient::new();
        assert_eq!(client.connection_status(), ConnectionStatus::Connecting);
        assert!(!client.is_ready());
        assert!(client.peer_id().is_none());
    }

    #[test]
    fn test_attach_sends_init() {
        let (_client, link) = attached();
        assert_eq!(link.sent(), vec![json!({"action": "init"})]);
    }

    #[test]
    fn test_ready_connects_and_stores_peer_id() {
        let (client, _link) = attached();
        ready(&client, "peerA");
        assert_eq!(client.connection_status(), ConnectionStatus::Connected);
        assert_eq!(client.peer_id().as_deref(), Some("peerA"));
        assert!(client.is_ready());
    }

    #[test]
    fn test_operations_refused_before_ready() {
        let (client, link) = attached();
        link.drain();

        assert!(!client.subscribe("room"));
        assert!(!client.unsubscribe("room"));
        assert!(!client.publish("room", json!({"id": "1"})));
        assert_eq!(
            client.publish_tracked("room", json!({})).unwrap_err(),
            BridgeError::NotReady
        );
        assert!(link.sent().is_empty());
        assert!(client.intended_topics().is_empty());
    }

    #[test]
    fn test_subscribe_is_optimistic_and_idempotent() {
        let (client, link) = attached();
        ready(&client, "peerA");

        assert!(client.subscribe("room"));
        assert!(client.subscribe("room"));
        assert_eq!(client.subscribed_topics(), vec!["room".to_string()]);
        assert_eq!(client.intended_topics(), vec!["room".to_string()]);
        assert_eq!(link.count_action("subscribe"), 2);
    }

    #[test]
    fn test_ready_replays_intent_once() {
        let (client, link) = attached();
        ready(&client, "peerA");
        client.subscribe("a");
        client.subscribe("b");
        link.drain();

        // host restarted
        ready(&client, "peerB");
        let sent = link.drain();
        let subscribes: Vec<&Value> = sent
            .iter()
            .filter(|c| c["action"] == "subscribe")
            .collect();
        assert_eq!(subscribes.len(), 2);
        assert_eq!(subscribes[0]["topic"], "a");
        assert_eq!(subscribes[1]["topic"], "b");
        assert_eq!(sent.last().unwrap(), &json!({"action": "getSubscriptions"}));
        assert_eq!(client.peer_id().as_deref(), Some("peerB"));
    }

    #[test]
    fn test_host_drop_updates_mirror_but_keeps_intent() {
        let (client, link) = attached();
        ready(&client, "peerA");
        client.subscribe("chat-1");

        client.handle_event(HostEvent::Subscription {
            topic: "chat-1".to_string(),
            subscribed: false,
        });
        assert!(client.subscribed_topics().is_empty());
        assert_eq!(client.intended_topics(), vec!["chat-1".to_string()]);

        link.drain();
        ready(&client, "peerA");
        assert_eq!(link.count_action("subscribe"), 1);
        assert_eq!(client.subscribed_topics(), vec!["chat-1".to_string()]);
    }

    #[test]
    fn test_unsubscribed_topic_not_replayed() {
        let (client, link) = attached();
        ready(&client, "peerA");
        client.subscribe("chat-1");
        client.unsubscribe("chat-1");
        link.drain();

        ready(&client, "peerA");
        assert_eq!(link.count_action("subscribe"), 0);
    }

    #[test]
    fn test_subscriptions_snapshot_replaces_mirror() {
        let (client, _link) = attached();
        ready(&client, "peerA");
        client.subscribe("old");
        client.handle_event(HostEvent::Subscriptions {
            topics: vec!["x".to_string(), "y".to_string()],
        });
        assert_eq!(client.subscribed_topics(), vec!["x".to_string(), "y".to_string()]);
        assert_eq!(client.intended_topics(), vec!["old".to_string()]);
    }

    #[test]
    fn test_chat_delivered_to_every_handler_once() {
        let (client, _link) = attached();
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));
        let f = first.clone();
        let s = second.clone();
        client.add_message_handler("room", Arc::new(move |_| {
            f.fetch_add(1, Ordering::SeqCst);
        }));
        client.add_message_handler("room", Arc::new(move |_| {
            s.fetch_add(1, Ordering::SeqCst);
        }));

        client.handle_event(chat("room", None));
        client.handle_event(chat("room", Some("chat")));
        client.handle_event(chat("elsewhere", None));

        assert_eq!(first.load(Ordering::SeqCst), 2);
        assert_eq!(second.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_internal_traffic_never_reaches_handlers() {
        let (client, _link) = attached();
        let hits = Arc::new(AtomicUsize::new(0));
        let h = hits.clone();
        client.add_message_handler("room", Arc::new(move |_| {
            h.fetch_add(1, Ordering::SeqCst);
        }));

        for kind in ["heartbeat", "announcement", "topic_announcement"] {
            client.handle_event(chat("room", Some(kind)));
        }
        client.handle_event(HostEvent::Message {
            topic: "room".to_string(),
            message: json!({"id": "1", "content": "missing from"}),
        });
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_removed_handler_not_invoked() {
        let (client, _link) = attached();
        let hits = Arc::new(AtomicUsize::new(0));
        let h = hits.clone();
        let handler: MessageHandler = Arc::new(move |_| {
            h.fetch_add(1, Ordering::SeqCst);
        });
        client.add_message_handler("room", handler.clone());
        client.add_message_handler("room", handler.clone());
        client.handle_event(chat("room", None));
        client.remove_message_handler("room", &handler);
        client.remove_message_handler("room", &handler);
        client.handle_event(chat("room", None));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_status_handlers_see_transitions() {
        let (client, link) = attached();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = seen.clone();
        client.add_status_handler(Arc::new(move |status| s.lock().push(status)));

        ready(&client, "peerA");
        link.close();
        assert!(!client.subscribe("room"));

        assert_eq!(
            *seen.lock(),
            vec![ConnectionStatus::Connected, ConnectionStatus::Disconnected]
        );
        assert!(!client.is_ready());
    }

    #[test]
    fn test_disconnected_until_fresh_ready() {
        let (client, _link) = attached();
        ready(&client, "peerA");
        client.handle_event(HostEvent::ConnectionStatus {
            status: ConnectionStatus::Disconnected,
        });
        assert_eq!(client.connection_status(), ConnectionStatus::Disconnected);

        client.handle_event(HostEvent::ConnectionStatus {
            status: ConnectionStatus::Connected,
        });
        assert_eq!(client.connection_status(), ConnectionStatus::Disconnected);

        ready(&client, "peerA");
        assert_eq!(client.connection_status(), ConnectionStatus::Connected);
    }

    #[test]
    fn test_publish_tracked_resolves_by_request_id() {
        let (client, link) = attached();
        ready(&client, "peerA");
        link.drain();

        let mut first = client.publish_tracked("room", json!({"id": "m1"})).unwrap();
        let mut second = client.publish_tracked("room", json!({"id": "m2"})).unwrap();
        let sent = link.drain();
        let second_id = sent[1]["requestId"].as_str().unwrap().to_string();

        client.handle_event(HostEvent::PublishResult {
            topic: "room".to_string(),
            message_id: "m2".to_string(),
            success: true,
            error: None,
            request_id: Some(second_id),
        });

        assert!(first.try_recv().is_err());
        let outcome = second.try_recv().unwrap();
        assert_eq!(outcome.message_id, "m2");
        assert!(outcome.success);
    }

    #[test]
    fn test_publish_result_without_request_id_left_pending() {
        let (client, _link) = attached();
        ready(&client, "peerA");
        let mut rx = client.publish_tracked("room", json!({"id": "mine"})).unwrap();

        // another tab's result on the same topic
        client.handle_event(HostEvent::PublishResult {
            topic: "room".to_string(),
            message_id: "theirs".to_string(),
            success: false,
            error: Some("boom".to_string()),
            request_id: None,
        });
        assert!(matches!(rx.try_recv(), Err(oneshot::error::TryRecvError::Empty)));
        assert_eq!(client.pending_publishes.lock().len(), 1);
    }

    #[test]
    fn test_detach_settles_pending_publishes() {
        let (client, _link) = attached();
        ready(&client, "peerA");
        let mut rx = client.publish_tracked("room", json!({"id": "m1"})).unwrap();

        client.detach();
        let outcome = rx.try_recv().unwrap();
        assert!(!outcome.success);
        assert_eq!(outcome.topic, "room");
        assert!(outcome.error.unwrap().starts_with("host unavailable"));
        assert!(client.pending_publishes.lock().is_empty());
    }

    #[test]
    fn test_host_disconnect_event_settles_pending_publishes() {
        let (client, _link) = attached();
        ready(&client, "peerA");
        let mut first = client.publish_tracked("a", json!({"id": "m1"})).unwrap();
        let mut second = client.publish_tracked("b", json!({"id": "m2"})).unwrap();

        client.handle_event(HostEvent::ConnectionStatus {
            status: ConnectionStatus::Disconnected,
        });
        assert!(!first.try_recv().unwrap().success);
        assert!(!second.try_recv().unwrap().success);
    }

    #[test]
    fn test_failed_post_leaves_topic_sets_untouched() {
        let (client, link) = attached();
        ready(&client, "peerA");
        assert!(client.subscribe("kept"));

        link.close();
        assert!(!client.subscribe("room"));
        assert_eq!(client.subscribed_topics(), vec!["kept".to_string()]);
        assert_eq!(client.intended_topics(), vec!["kept".to_string()]);

        let (client, link) = attached();
        ready(&client, "peerA");
        assert!(client.subscribe("kept"));
        link.close();
        assert!(!client.unsubscribe("kept"));
        assert_eq!(client.subscribed_topics(), vec!["kept".to_string()]);
        assert_eq!(client.intended_topics(), vec!["kept".to_string()]);
    }

    #[test]
    fn test_peer_tracking() {
        let (client, link) = attached();
        assert!(client.request_peer_list());
        assert_eq!(link.count_action("getPeers"), 1);

        client.handle_event(HostEvent::PeerList {
            peers: vec!["p1".to_string(), "p2".to_string()],
        });
        client.handle_event(HostEvent::PeerConnection {
            peer_id: "p3".to_string(),
            status: PeerLinkStatus::Connected,
        });
        client.handle_event(HostEvent::PeerConnection {
            peer_id: "p1".to_string(),
            status: PeerLinkStatus::Disconnected,
        });
        assert_eq!(client.known_peers(), vec!["p2".to_string(), "p3".to_string()]);
    }

    #[test]
    fn test_dispose_silences_late_events() {
        let (client, link) = attached();
        let hits = Arc::new(AtomicUsize::new(0));
        let h = hits.clone();
        client.add_message_handler("room", Arc::new(move |_| {
            h.fetch_add(1, Ordering::SeqCst);
        }));
        ready(&client, "peerA");
        client.dispose();
        link.drain();

        client.handle_event(chat("room", None));
        ready(&client, "peerB");
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        assert!(!client.subscribe("room"));
        assert!(link.sent().is_empty());
        assert_eq!(
            client.publish_tracked("room", json!({})).unwrap_err(),
            BridgeError::Disposed
        );
    }

    #[test]
    fn test_raw_events_parsed() {
        let (client, _link) = attached();
        client.handle_raw_event(&json!({"type": "ipfs_ready", "peerId": "peerA"}));
        client.handle_raw_event(&json!({"type": "nonsense"}));
        assert_eq!(client.peer_id().as_deref(), Some("peerA"));
    }

    #[test]
    fn test_global_is_shared() {
        let a = BridgeClient::global();
        let b = BridgeClient::global();
        assert!(Arc::ptr_eq(&a, &b));
    }
}
