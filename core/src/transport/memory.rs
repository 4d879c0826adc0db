// In-process pub/sub hub
//
// Every member of a `MemoryNetwork` is connected to every other online member.
// Publishing delivers to the other members subscribed to the topic, never back
// to the sender. Used by tests and by embedders that run several nodes in one
// process.

use super::abstraction::{PubsubTransport, TransportError, TransportEvent};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::mpsc;

struct Member {
    topics: HashSet<String>,
    events: mpsc::UnboundedSender<TransportEvent>,
    online: bool,
    /// Publishes left to fail before deliveries resume
    failing_publishes: u32,
}

#[derive(Default)]
struct NetworkState {
    members: HashMap<String, Member>,
}

impl NetworkState {
    fn online_peers_except(&self, peer_id: &str) -> Vec<String> {
        let mut peers: Vec<String> = self
            .members
            .iter()
            .filter(|(id, m)| id.as_str() != peer_id && m.online)
            .map(|(id, _)| id.clone())
            .collect();
        peers.sort();
        peers
    }

    fn notify(&self, peer_id: &str, event: TransportEvent) {
        if let Some(member) = self.members.get(peer_id) {
            let _ = member.events.send(event);
        }
    }

    /// Emit connect events in both directions between `peer_id` and every online member
    fn link_up(&self, peer_id: &str) {
        for other in self.online_peers_except(peer_id) {
            self.notify(&other, TransportEvent::PeerConnected(peer_id.to_string()));
            self.notify(peer_id, TransportEvent::PeerConnected(other));
        }
    }

    fn link_down(&self, peer_id: &str) {
        for other in self.online_peers_except(peer_id) {
            self.notify(&other, TransportEvent::PeerDisconnected(peer_id.to_string()));
            self.notify(peer_id, TransportEvent::PeerDisconnected(other));
        }
    }
}

/// Shared hub that `MemoryTransport`s attach to
#[derive(Clone, Default)]
pub struct MemoryNetwork {
    state: Arc<Mutex<NetworkState>>,
}

impl MemoryNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node to the network and connect it to every online member
    pub fn join(&self, peer_id: impl Into<String>) -> MemoryTransport {
        let peer_id = peer_id.into();
        let (tx, rx) = mpsc::unbounded_channel();
        let mut state = self.state.lock();
        state.members.insert(
            peer_id.clone(),
            Member {
                topics: HashSet::new(),
                events: tx,
                online: true,
                failing_publishes: 0,
            },
        );
        state.link_up(&peer_id);
        tracing::debug!("{} joined memory network", peer_id);

        MemoryTransport {
            peer_id,
            network: self.clone(),
            events: Mutex::new(Some(rx)),
        }
    }

    /// Cut a node off from every other member. Its subscriptions are kept.
    pub fn isolate(&self, peer_id: &str) {
        let mut state = self.state.lock();
        let was_online = state.members.get(peer_id).map(|m| m.online).unwrap_or(false);
        if !was_online {
            return;
        }
        state.link_down(peer_id);
        if let Some(member) = state.members.get_mut(peer_id) {
            member.online = false;
        }
    }

    /// Bring an isolated node back
    pub fn reconnect(&self, peer_id: &str) {
        let mut state = self.state.lock();
        match state.members.get_mut(peer_id) {
            Some(member) if !member.online => member.online = true,
            _ => return,
        }
        state.link_up(peer_id);
    }

    /// Drop a topic registration behind the node's back
    pub fn forget_topic(&self, peer_id: &str, topic: &str) {
        if let Some(member) = self.state.lock().members.get_mut(peer_id) {
            member.topics.remove(topic);
        }
    }

    /// Make the next `count` publishes from `peer_id` fail
    pub fn fail_publishes(&self, peer_id: &str, count: u32) {
        if let Some(member) = self.state.lock().members.get_mut(peer_id) {
            member.failing_publishes = count;
        }
    }

    pub fn is_online(&self, peer_id: &str) -> bool {
        self.state
            .lock()
            .members
            .get(peer_id)
            .map(|m| m.online)
            .unwrap_or(false)
    }
}

/// One node's view of a `MemoryNetwork`
pub struct MemoryTransport {
    peer_id: String,
    network: MemoryNetwork,
    events: Mutex<Option<mpsc::UnboundedReceiver<TransportEvent>>>,
}

impl MemoryTransport {
    pub fn network(&self) -> &MemoryNetwork {
        &self.network
    }

    fn ensure_online(&self) -> Result<(), TransportError> {
        if self.network.is_online(&self.peer_id) {
            Ok(())
        } else {
            Err(TransportError::NotRunning)
        }
    }
}

#[async_trait]
impl PubsubTransport for MemoryTransport {
    fn local_peer_id(&self) -> String {
        self.peer_id.clone()
    }

    async fn subscribe(&self, topic: &str) -> Result<(), TransportError> {
        self.ensure_online()?;
        let mut state = self.network.state.lock();
        let member = state
            .members
            .get_mut(&self.peer_id)
            .ok_or(TransportError::NotRunning)?;
        member.topics.insert(topic.to_string());
        Ok(())
    }

    async fn unsubscribe(&self, topic: &str) -> Result<(), TransportError> {
        let mut state = self.network.state.lock();
        if let Some(member) = state.members.get_mut(&self.peer_id) {
            member.topics.remove(topic);
        }
        Ok(())
    }

    async fn subscriptions(&self) -> Vec<String> {
        let state = self.network.state.lock();
        let mut topics: Vec<String> = state
            .members
            .get(&self.peer_id)
            .map(|m| m.topics.iter().cloned().collect())
            .unwrap_or_default();
        topics.sort();
        topics
    }

    async fn is_subscribed(&self, topic: &str) -> bool {
        self.network
            .state
            .lock()
            .members
            .get(&self.peer_id)
            .map(|m| m.topics.contains(topic))
            .unwrap_or(false)
    }

    async fn publish(&self, topic: &str, data: Vec<u8>) -> Result<(), TransportError> {
        self.ensure_online()?;
        let mut state = self.network.state.lock();

        if let Some(member) = state.members.get_mut(&self.peer_id) {
            if member.failing_publishes > 0 {
                member.failing_publishes -= 1;
                return Err(TransportError::PublishFailed(format!(
                    "injected failure on {}",
                    topic
                )));
            }
        }

        let recipients: Vec<String> = state
            .online_peers_except(&self.peer_id)
            .into_iter()
            .filter(|id| {
                state
                    .members
                    .get(id)
                    .map(|m| m.topics.contains(topic))
                    .unwrap_or(false)
            })
            .collect();

        if recipients.is_empty() {
            return Err(TransportError::InsufficientPeers(topic.to_string()));
        }

        for id in recipients {
            state.notify(
                &id,
                TransportEvent::Message {
                    topic: topic.to_string(),
                    source: Some(self.peer_id.clone()),
                    data: data.clone(),
                },
            );
        }
        Ok(())
    }

    async fn connected_peers(&self) -> Vec<String> {
        let state = self.network.state.lock();
        let online = state
            .members
            .get(&self.peer_id)
            .map(|m| m.online)
            .unwrap_or(false);
        if !online {
            return Vec::new();
        }
        state.online_peers_except(&self.peer_id)
    }

    async fn topic_peers(&self, topic: &str) -> Vec<String> {
        self.connected_peers()
            .await
            .into_iter()
            .filter(|id| {
                self.network
                    .state
                    .lock()
                    .members
                    .get(id)
                    .map(|m| m.topics.contains(topic))
                    .unwrap_or(false)
            })
            .collect()
    }

    async fn probe(&self) -> Result<(), TransportError> {
        tracing::trace!("probe on {}", self.peer_id);
        Ok(())
    }

    async fn restart(&self) -> Result<(), TransportError> {
        {
            let mut state = self.network.state.lock();
            if let Some(member) = state.members.get_mut(&self.peer_id) {
                member.topics.clear();
            }
        }
        self.network.isolate(&self.peer_id);
        self.network.reconnect(&self.peer_id);
        tracing::info!("{} restarted on memory network", self.peer_id);
        Ok(())
    }

    fn take_events(&self) -> Option<mpsc::UnboundedReceiver<TransportEvent>> {
        self.events.lock().take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_reaches_other_subscribers_only() {
        let network = MemoryNetwork::new();
        let a = network.join("a");
        let b = network.join("b");
        let c = network.join("c");
        let mut a_events = a.take_events().unwrap();
        let mut b_events = b.take_events().unwrap();
        let mut c_events = c.take_events().unwrap();

        a.subscribe("room").await.unwrap();
        b.subscribe("room").await.unwrap();
        a.publish("room", b"hi".to_vec()).await.unwrap();

        // drain connection events
        let mut b_got = Vec::new();
        while let Ok(e) = b_events.try_recv() {
            b_got.push(e);
        }
        assert!(b_got.contains(&TransportEvent::Message {
            topic: "room".to_string(),
            source: Some("a".to_string()),
            data: b"hi".to_vec(),
        }));

        while let Ok(e) = a_events.try_recv() {
            assert!(!matches!(e, TransportEvent::Message { .. }));
        }
        while let Ok(e) = c_events.try_recv() {
            assert!(!matches!(e, TransportEvent::Message { .. }));
        }
    }

    #[tokio::test]
    async fn test_join_emits_connection_events() {
        let network = MemoryNetwork::new();
        let a = network.join("a");
        let mut a_events = a.take_events().unwrap();
        let _b = network.join("b");

        assert_eq!(
            a_events.try_recv().unwrap(),
            TransportEvent::PeerConnected("b".to_string())
        );
        assert_eq!(a.connected_peers().await, vec!["b".to_string()]);
        assert!(a.take_events().is_none());
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_fails() {
        let network = MemoryNetwork::new();
        let a = network.join("a");
        let _b = network.join("b");
        assert_eq!(
            a.publish("room", vec![1]).await,
            Err(TransportError::InsufficientPeers("room".to_string()))
        );
    }

    #[tokio::test]
    async fn test_isolated_node_has_no_peers() {
        let network = MemoryNetwork::new();
        let a = network.join("a");
        let b = network.join("b");
        b.subscribe("room").await.unwrap();

        network.isolate("a");
        assert!(a.connected_peers().await.is_empty());
        assert!(b.connected_peers().await.is_empty());
        assert_eq!(a.publish("room", vec![1]).await, Err(TransportError::NotRunning));

        a.restart().await.unwrap();
        assert_eq!(a.connected_peers().await, vec!["b".to_string()]);
        assert!(a.subscriptions().await.is_empty());
    }

    #[tokio::test]
    async fn test_injected_publish_failures() {
        let network = MemoryNetwork::new();
        let a = network.join("a");
        let b = network.join("b");
        b.subscribe("room").await.unwrap();
        network.fail_publishes("a", 1);

        assert!(matches!(
            a.publish("room", vec![1]).await,
            Err(TransportError::PublishFailed(_))
        ));
        assert!(a.publish("room", vec![1]).await.is_ok());
    }

    #[tokio::test]
    async fn test_topic_peers() {
        let network = MemoryNetwork::new();
        let a = network.join("a");
        let b = network.join("b");
        let _c = network.join("c");
        b.subscribe("room").await.unwrap();
        assert_eq!(a.topic_peers("room").await, vec!["b".to_string()]);

        network.forget_topic("b", "room");
        assert!(a.topic_peers("room").await.is_empty());
        assert!(!b.is_subscribed("room").await);
    }
}
