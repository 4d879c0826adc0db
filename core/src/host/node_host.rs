// Background node host — long-lived network identity and topic state
//
// A tokio actor that answers bridge client commands and broadcasts every
// resulting event to all connected clients. Publishing and overlay maintenance
// run in their own tasks so a slow mesh never stalls command handling.

use super::clients::{ClientLink, ClientPort, ClientRegistry, HostInput};
use crate::bridge::BridgeClient;
use crate::overlay::{OverlayConfig, PubsubNode};
use crate::protocol::{
    ConnectionStatus, HostCommand, HostEvent, InboundMessage, PeerLinkStatus,
};
use crate::transport::{PubsubTransport, TransportEvent};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

/// Host configuration
#[derive(Debug, Clone)]
pub struct HostConfig {
    pub overlay: OverlayConfig,
    /// Run the heartbeat and health-check timers
    pub maintenance: bool,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            overlay: OverlayConfig::default(),
            maintenance: true,
        }
    }
}

/// Handle to a running host
#[derive(Clone)]
pub struct HostHandle {
    input_tx: mpsc::UnboundedSender<HostInput>,
    clients: Arc<ClientRegistry>,
    node: Arc<PubsubNode>,
    peer_id: String,
}

impl HostHandle {
    pub fn peer_id(&self) -> &str {
        &self.peer_id
    }

    /// Attach a new foreground context
    pub fn connect_client(&self) -> ClientPort {
        let (id, events) = self.clients.register();
        ClientPort {
            id,
            link: ClientLink {
                tx: self.input_tx.clone(),
            },
            events,
        }
    }

    /// Connect `bridge` to this host and pump host events into it
    pub fn attach_bridge(&self, bridge: &Arc<BridgeClient>) -> JoinHandle<()> {
        let port = self.connect_client();
        bridge.attach(Arc::new(port.link));
        tokio::spawn(bridge.clone().run_event_loop(port.events))
    }

    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    /// Authoritative topic set
    pub fn subscriptions(&self) -> Vec<String> {
        self.node.topics()
    }

    pub fn node(&self) -> &Arc<PubsubNode> {
        &self.node
    }

    /// Stop the actor and its maintenance tasks
    pub async fn shutdown(&self) {
        let (tx, rx) = oneshot::channel();
        if self.input_tx.send(HostInput::Shutdown(tx)).is_ok() {
            let _ = rx.await;
        }
    }
}

pub struct NodeHost;

impl NodeHost {
    /// Start a host over `transport`. The peer identity is the transport's.
    pub fn spawn(transport: Arc<dyn PubsubTransport>, config: HostConfig) -> HostHandle {
        let (status_tx, status_rx) = mpsc::unbounded_channel();
        let transport_rx = transport.take_events();
        let node = Arc::new(
            PubsubNode::new(transport, config.overlay.clone()).with_status_sink(status_tx),
        );
        let peer_id = node.local_peer_id();
        let clients = Arc::new(ClientRegistry::new());
        let (input_tx, input_rx) = mpsc::unbounded_channel();

        let maintenance = if config.maintenance {
            Some(tokio::spawn(run_maintenance(node.clone())))
        } else {
            None
        };

        let actor = HostActor {
            node: node.clone(),
            clients: clients.clone(),
            peer_id: peer_id.clone(),
            init_count: 0,
        };
        tokio::spawn(actor.run(input_rx, transport_rx, status_rx, maintenance));
        tracing::info!("Node host started as {}", peer_id);

        HostHandle {
            input_tx,
            clients,
            node,
            peer_id,
        }
    }
}

struct HostActor {
    node: Arc<PubsubNode>,
    clients: Arc<ClientRegistry>,
    peer_id: String,
    init_count: u32,
}

impl HostActor {
    async fn run(
        mut self,
        mut input_rx: mpsc::UnboundedReceiver<HostInput>,
        transport_rx: Option<mpsc::UnboundedReceiver<TransportEvent>>,
        mut status_rx: mpsc::UnboundedReceiver<ConnectionStatus>,
        maintenance: Option<JoinHandle<()>>,
    ) {
        // Keeps the fallback channel open so its branch just never fires
        let (_idle_tx, idle_rx) = mpsc::unbounded_channel();
        let mut transport_rx = transport_rx.unwrap_or_else(|| {
            tracing::warn!("Transport events already taken; peer traffic will not reach clients");
            idle_rx
        });
        let mut shutdown_reply = None;

        loop {
            tokio::select! {
                Some(input) = input_rx.recv() => match input {
                    HostInput::Command(raw) => self.handle_command(raw).await,
                    HostInput::Shutdown(reply) => {
                        shutdown_reply = Some(reply);
                        break;
                    }
                },

                Some(event) = transport_rx.recv() => self.handle_transport_event(event),

                Some(status) = status_rx.recv() => {
                    self.clients.broadcast(&HostEvent::ConnectionStatus { status });
                    // Back from a restart: clients must replay their topics
                    if status == ConnectionStatus::Connected {
                        self.broadcast_ready();
                    }
                }

                else => break,
            }
        }

        if let Some(task) = maintenance {
            task.abort();
        }
        tracing::info!("Node host stopped");
        if let Some(reply) = shutdown_reply {
            let _ = reply.send(());
        }
    }

    fn broadcast_ready(&self) {
        self.clients.broadcast(&HostEvent::Ready {
            peer_id: self.peer_id.clone(),
        });
    }

    async fn handle_command(&mut self, raw: Value) {
        let Some(command) = HostCommand::from_value(&raw) else {
            tracing::debug!("Ignoring malformed command: {}", raw);
            return;
        };
        tracing::debug!("Host command: {}", command.action());

        match command {
            HostCommand::Init => {
                self.init_count += 1;
                if self.init_count > 1 {
                    tracing::debug!("Repeated init ({}), re-announcing identity", self.init_count);
                }
                self.broadcast_ready();
            }

            HostCommand::Subscribe { topic } => {
                let subscribed = match self.node.subscribe(&topic).await {
                    Ok(()) => true,
                    Err(e) => {
                        tracing::warn!("Subscribe to {} failed: {}", topic, e);
                        false
                    }
                };
                self.clients
                    .broadcast(&HostEvent::Subscription { topic, subscribed });
            }

            HostCommand::Unsubscribe { topic } => {
                if let Err(e) = self.node.unsubscribe(&topic).await {
                    tracing::warn!("Unsubscribe from {} failed: {}", topic, e);
                }
                self.clients.broadcast(&HostEvent::Subscription {
                    topic,
                    subscribed: false,
                });
            }

            HostCommand::Publish {
                topic,
                message,
                request_id,
            } => {
                tokio::spawn(publish_and_report(
                    self.node.clone(),
                    self.clients.clone(),
                    topic,
                    message,
                    request_id,
                ));
            }

            HostCommand::GetSubscriptions => {
                self.clients.broadcast(&HostEvent::Subscriptions {
                    topics: self.node.topics(),
                });
            }

            HostCommand::GetPeers => {
                let peers = self.node.transport().connected_peers().await;
                self.clients.broadcast(&HostEvent::PeerList { peers });
            }
        }
    }

    fn handle_transport_event(&self, event: TransportEvent) {
        match event {
            TransportEvent::Message { topic, source, data } => {
                let value: Value = match serde_json::from_slice(&data) {
                    Ok(value) => value,
                    Err(e) => {
                        tracing::debug!("Dropping non-JSON payload on {}: {}", topic, e);
                        return;
                    }
                };
                match InboundMessage::classify(&value) {
                    InboundMessage::Chat(_) => {
                        self.clients.broadcast(&HostEvent::Message {
                            topic,
                            message: value,
                        });
                    }
                    InboundMessage::Internal(kind) => {
                        tracing::trace!(
                            "Internal {:?} on {} from {}",
                            kind,
                            topic,
                            source.as_deref().unwrap_or("unknown")
                        );
                    }
                    InboundMessage::Malformed(reason) => {
                        tracing::debug!("Dropping malformed message on {}: {}", topic, reason);
                    }
                }
            }

            TransportEvent::PeerConnected(peer_id) => {
                tracing::info!("Peer connected: {}", peer_id);
                self.clients.broadcast(&HostEvent::PeerConnection {
                    peer_id: peer_id.clone(),
                    status: PeerLinkStatus::Connected,
                });
                let node = self.node.clone();
                tokio::spawn(async move { node.announce_to_peer(&peer_id).await });
            }

            TransportEvent::PeerDisconnected(peer_id) => {
                tracing::info!("Peer disconnected: {}", peer_id);
                self.clients.broadcast(&HostEvent::PeerConnection {
                    peer_id,
                    status: PeerLinkStatus::Disconnected,
                });
            }
        }
    }
}

async fn publish_and_report(
    node: Arc<PubsubNode>,
    clients: Arc<ClientRegistry>,
    topic: String,
    message: Value,
    request_id: Option<String>,
) {
    let message_id = message
        .get("id")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    let result = match serde_json::to_vec(&message) {
        Ok(bytes) => node
            .publish(&topic, bytes)
            .await
            .map_err(|e| e.to_string()),
        Err(e) => Err(format!("unserializable message: {}", e)),
    };

    match result {
        Ok(()) => {
            clients.broadcast(&HostEvent::PublishResult {
                topic: topic.clone(),
                message_id,
                success: true,
                error: None,
                request_id,
            });
            // Gossip never loops back; echo so every local client sees its own message
            clients.broadcast(&HostEvent::Message { topic, message });
        }
        Err(error) => {
            tracing::warn!("Publish on {} failed: {}", topic, error);
            clients.broadcast(&HostEvent::PublishResult {
                topic,
                message_id,
                success: false,
                error: Some(error),
                request_id,
            });
        }
    }
}

async fn run_maintenance(node: Arc<PubsubNode>) {
    let config = node.config().clone();
    let mut heartbeat = interval_at(
        Instant::now() + config.heartbeat_interval,
        config.heartbeat_interval,
    );
    heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut health = interval_at(
        Instant::now() + config.health_check_interval,
        config.health_check_interval,
    );
    health.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = heartbeat.tick() => node.heartbeat().await,
            _ = health.tick() => {
                let report = node.health_check().await;
                tracing::debug!("Health check: {:?}", report);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MemoryNetwork;
    use serde_json::json;
    use std::time::Duration;

    fn quiet() -> HostConfig {
        HostConfig {
            overlay: OverlayConfig {
                min_topic_peers: 1,
                ..Default::default()
            },
            maintenance: false,
        }
    }

    async fn next(port: &mut ClientPort) -> HostEvent {
        tokio::time::timeout(Duration::from_secs(5), port.events.recv())
            .await
            .expect("timed out waiting for host event")
            .expect("host closed")
    }

    fn post(port: &ClientPort, command: Value) {
        use crate::bridge::HostLink;
        port.link.post(command).unwrap();
    }

    #[tokio::test]
    async fn test_init_is_idempotent() {
        let network = MemoryNetwork::new();
        let host = NodeHost::spawn(Arc::new(network.join("peerA")), quiet());
        let mut port = host.connect_client();

        post(&port, json!({"action": "init"}));
        post(&port, json!({"action": "init"}));
        let first = next(&mut port).await;
        let second = next(&mut port).await;
        assert_eq!(first, HostEvent::Ready { peer_id: "peerA".to_string() });
        assert_eq!(first, second);
        host.shutdown().await;
    }

    #[tokio::test]
    async fn test_subscription_broadcast_to_all_clients() {
        let network = MemoryNetwork::new();
        let host = NodeHost::spawn(Arc::new(network.join("peerA")), quiet());
        let mut one = host.connect_client();
        let mut two = host.connect_client();

        post(&one, json!({"action": "subscribe", "topic": "room"}));
        let expected = HostEvent::Subscription {
            topic: "room".to_string(),
            subscribed: true,
        };
        assert_eq!(next(&mut one).await, expected);
        assert_eq!(next(&mut two).await, expected);

        post(&two, json!({"action": "getSubscriptions"}));
        assert_eq!(
            next(&mut one).await,
            HostEvent::Subscriptions { topics: vec!["room".to_string()] }
        );

        post(&two, json!({"action": "unsubscribe", "topic": "room"}));
        assert_eq!(
            next(&mut one).await,
            HostEvent::Subscription { topic: "room".to_string(), subscribed: false }
        );
        assert!(host.subscriptions().is_empty());
        host.shutdown().await;
    }

    #[tokio::test]
    async fn test_malformed_commands_ignored() {
        let network = MemoryNetwork::new();
        let host = NodeHost::spawn(Arc::new(network.join("peerA")), quiet());
        let mut port = host.connect_client();

        post(&port, json!({"action": "subscribe"}));
        post(&port, json!({"action": "publish", "topic": "room"}));
        post(&port, json!({"nonsense": true}));
        post(&port, json!({"action": "getPeers"}));

        assert_eq!(next(&mut port).await, HostEvent::PeerList { peers: Vec::new() });
        host.shutdown().await;
    }

    #[tokio::test]
    async fn test_publish_reports_then_echoes() {
        let network = MemoryNetwork::new();
        let host = NodeHost::spawn(Arc::new(network.join("peerA")), quiet());
        let remote = network.join("peerB");
        remote.subscribe("room").await.unwrap();
        let mut port = host.connect_client();

        let message = json!({"id": "m1", "from": "peerA", "content": "hi", "timestamp": 1});
        post(&port, json!({
            "action": "publish", "topic": "room", "message": message.clone(), "requestId": "r1"
        }));

        // peer_connection from the remote joining may come first
        let mut events = Vec::new();
        while events.len() < 2 {
            match next(&mut port).await {
                HostEvent::PeerConnection { .. } => {}
                other => events.push(other),
            }
        }
        assert_eq!(
            events[0],
            HostEvent::PublishResult {
                topic: "room".to_string(),
                message_id: "m1".to_string(),
                success: true,
                error: None,
                request_id: Some("r1".to_string()),
            }
        );
        assert_eq!(
            events[1],
            HostEvent::Message { topic: "room".to_string(), message }
        );
        host.shutdown().await;
    }

    #[tokio::test]
    async fn test_remote_chat_forwarded_and_internal_consumed() {
        let network = MemoryNetwork::new();
        let host = NodeHost::spawn(Arc::new(network.join("peerA")), quiet());
        let remote = network.join("peerB");
        let mut port = host.connect_client();

        post(&port, json!({"action": "subscribe", "topic": "room"}));
        loop {
            if let HostEvent::Subscription { .. } = next(&mut port).await {
                break;
            }
        }

        let heartbeat = crate::protocol::ControlMessage::heartbeat("peerB", "room");
        remote.publish("room", heartbeat.to_bytes()).await.unwrap();
        let chat = json!({"id": "m2", "from": "peerB", "content": "yo", "timestamp": 2});
        remote
            .publish("room", serde_json::to_vec(&chat).unwrap())
            .await
            .unwrap();

        loop {
            match next(&mut port).await {
                HostEvent::Message { topic, message } => {
                    assert_eq!(topic, "room");
                    assert_eq!(message, chat);
                    break;
                }
                HostEvent::PeerConnection { .. } => {}
                other => panic!("unexpected event {:?}", other),
            }
        }
        host.shutdown().await;
    }

    #[tokio::test]
    async fn test_peer_connection_events() {
        let network = MemoryNetwork::new();
        let host = NodeHost::spawn(Arc::new(network.join("peerA")), quiet());
        let mut port = host.connect_client();

        let _remote = network.join("peerB");
        assert_eq!(
            next(&mut port).await,
            HostEvent::PeerConnection {
                peer_id: "peerB".to_string(),
                status: PeerLinkStatus::Connected,
            }
        );
        network.isolate("peerB");
        assert_eq!(
            next(&mut port).await,
            HostEvent::PeerConnection {
                peer_id: "peerB".to_string(),
                status: PeerLinkStatus::Disconnected,
            }
        );
        host.shutdown().await;
    }

    #[tokio::test]
    async fn test_dropped_client_pruned() {
        let network = MemoryNetwork::new();
        let host = NodeHost::spawn(Arc::new(network.join("peerA")), quiet());
        let mut keep = host.connect_client();
        let gone = host.connect_client();
        let link = gone.link.clone();
        drop(gone);

        use crate::bridge::HostLink;
        link.post(json!({"action": "init"})).unwrap();
        next(&mut keep).await;
        assert_eq!(host.client_count(), 1);
        host.shutdown().await;
    }
}
