// Overlay maintenance — keeps topic meshes alive on top of a pub/sub transport
//
// Announces subscriptions to new peers, heartbeats every topic, waits briefly
// for a thin mesh before publishing, and restarts the transport when the node
// has been isolated for a full health-check cycle.

use crate::protocol::{ConnectionStatus, ControlMessage};
use crate::retry::{RetryError, RetryPolicy};
use crate::transport::{PubsubTransport, TransportError};
use parking_lot::RwLock;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Intervals and thresholds for overlay maintenance
#[derive(Debug, Clone)]
pub struct OverlayConfig {
    pub heartbeat_interval: Duration,
    pub health_check_interval: Duration,
    /// Wait after a probe before counting peers again
    pub health_recheck_delay: Duration,
    /// Below this many topic peers, publishing first waits for the mesh
    pub min_topic_peers: usize,
    /// Bounded wait for topology to catch up before a publish
    pub peer_wait: Duration,
    pub publish_retry: RetryPolicy,
    pub subscribe_retry: RetryPolicy,
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(30),
            health_check_interval: Duration::from_secs(30),
            health_recheck_delay: Duration::from_secs(5),
            min_topic_peers: 3,
            peer_wait: Duration::from_secs(2),
            publish_retry: RetryPolicy::default(),
            subscribe_retry: RetryPolicy::default(),
        }
    }
}

/// Outcome of one health check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthReport {
    Healthy { peers: usize },
    /// Peers reappeared after the probe
    Recovered { peers: usize },
    /// No peers after the probe; the transport was restarted
    Restarted,
    /// No peers and the restart failed; the node stays disconnected
    Failed(TransportError),
}

/// A pub/sub node with overlay maintenance.
pub struct PubsubNode {
    transport: Arc<dyn PubsubTransport>,
    config: OverlayConfig,
    topics: RwLock<BTreeSet<String>>,
    status: RwLock<ConnectionStatus>,
    status_sink: Option<mpsc::UnboundedSender<ConnectionStatus>>,
}

impl PubsubNode {
    pub fn new(transport: Arc<dyn PubsubTransport>, config: OverlayConfig) -> Self {
        Self {
            transport,
            config,
            topics: RwLock::new(BTreeSet::new()),
            status: RwLock::new(ConnectionStatus::Connected),
            status_sink: None,
        }
    }

    /// Report every status change on `sink`
    pub fn with_status_sink(mut self, sink: mpsc::UnboundedSender<ConnectionStatus>) -> Self {
        self.status_sink = Some(sink);
        self
    }

    pub fn local_peer_id(&self) -> String {
        self.transport.local_peer_id()
    }

    pub fn transport(&self) -> &Arc<dyn PubsubTransport> {
        &self.transport
    }

    pub fn config(&self) -> &OverlayConfig {
        &self.config
    }

    pub fn status(&self) -> ConnectionStatus {
        *self.status.read()
    }

    fn set_status(&self, status: ConnectionStatus) {
        let changed = {
            let mut current = self.status.write();
            let changed = *current != status;
            *current = status;
            changed
        };
        if changed {
            tracing::info!("Overlay status: {}", status);
            if let Some(sink) = &self.status_sink {
                let _ = sink.send(status);
            }
        }
    }

    /// Locally subscribed topics, sorted
    pub fn topics(&self) -> Vec<String> {
        self.topics.read().iter().cloned().collect()
    }

    pub fn is_subscribed(&self, topic: &str) -> bool {
        self.topics.read().contains(topic)
    }

    pub async fn subscribe(&self, topic: &str) -> Result<(), RetryError<TransportError>> {
        let label = format!("subscribe {}", topic);
        self.config
            .subscribe_retry
            .run(&label, |_| self.transport.subscribe(topic))
            .await?;
        self.topics.write().insert(topic.to_string());
        tracing::debug!("Subscribed to {}", topic);
        Ok(())
    }

    pub async fn unsubscribe(&self, topic: &str) -> Result<(), TransportError> {
        self.topics.write().remove(topic);
        self.transport.unsubscribe(topic).await
    }

    /// Publish with a bounded wait for peers, then retries.
    pub async fn publish(&self, topic: &str, data: Vec<u8>) -> Result<(), RetryError<TransportError>> {
        self.ensure_topic_peers(topic).await;

        let label = format!("publish {}", topic);
        self.config
            .publish_retry
            .run(&label, |_| self.transport.publish(topic, data.clone()))
            .await
    }

    /// If the topic mesh is thin, nudge it and wait once. Returns the peer count seen last.
    pub async fn ensure_topic_peers(&self, topic: &str) -> usize {
        let peers = self.transport.topic_peers(topic).await.len();
        if peers >= self.config.min_topic_peers {
            return peers;
        }

        tracing::debug!(
            "Only {} peer(s) on {}, announcing and waiting {:?}",
            peers,
            topic,
            self.config.peer_wait
        );
        let nudge = ControlMessage::topic_announcement(&self.local_peer_id(), topic);
        if let Err(e) = self.transport.publish(topic, nudge.to_bytes()).await {
            tracing::debug!("Topic announcement on {} not sent: {}", topic, e);
        }
        tokio::time::sleep(self.config.peer_wait).await;

        let peers = self.transport.topic_peers(topic).await.len();
        tracing::debug!("{} peer(s) on {} after wait", peers, topic);
        peers
    }

    /// Re-announce every subscribed topic after a new peer connects
    pub async fn announce_to_peer(&self, peer_id: &str) {
        let topics = self.topics();
        if topics.is_empty() {
            return;
        }
        tracing::debug!("Announcing {} topic(s) to new peer {}", topics.len(), peer_id);

        let announcement = ControlMessage::announcement(&self.local_peer_id(), topics.clone());
        let bytes = announcement.to_bytes();
        for topic in topics {
            if let Err(e) = self.transport.publish(&topic, bytes.clone()).await {
                tracing::debug!("Announcement on {} failed: {}", topic, e);
            }
        }
    }

    /// One heartbeat round: re-register lost subscriptions, then heartbeat each topic
    pub async fn heartbeat(&self) {
        let me = self.local_peer_id();
        for topic in self.topics() {
            if !self.transport.is_subscribed(&topic).await {
                tracing::warn!("Subscription to {} lost, resubscribing", topic);
                if let Err(e) = self.transport.subscribe(&topic).await {
                    tracing::warn!("Resubscribe to {} failed: {}", topic, e);
                    continue;
                }
            }

            let beat = ControlMessage::heartbeat(&me, &topic);
            match self.transport.publish(&topic, beat.to_bytes()).await {
                Ok(()) => tracing::trace!("Heartbeat sent on {}", topic),
                Err(TransportError::InsufficientPeers(_)) => {
                    tracing::trace!("No peers for heartbeat on {}", topic)
                }
                Err(e) => tracing::debug!("Heartbeat on {} failed: {}", topic, e),
            }
        }
    }

    /// Probe and recheck when isolated; restart the transport if that does not help
    pub async fn health_check(&self) -> HealthReport {
        let peers = self.transport.connected_peers().await.len();
        if peers > 0 {
            self.set_status(ConnectionStatus::Connected);
            return HealthReport::Healthy { peers };
        }

        tracing::debug!("No connected peers, probing");
        if let Err(e) = self.transport.probe().await {
            tracing::debug!("Probe failed: {}", e);
        }
        tokio::time::sleep(self.config.health_recheck_delay).await;

        let peers = self.transport.connected_peers().await.len();
        if peers > 0 {
            self.set_status(ConnectionStatus::Connected);
            return HealthReport::Recovered { peers };
        }

        tracing::warn!("Still no peers after probe, restarting transport");
        self.set_status(ConnectionStatus::Disconnected);
        match self.transport.restart().await {
            Ok(()) => {
                self.resubscribe_all().await;
                self.set_status(ConnectionStatus::Connected);
                HealthReport::Restarted
            }
            Err(e) => {
                tracing::warn!("Transport restart failed: {}", e);
                HealthReport::Failed(e)
            }
        }
    }

    async fn resubscribe_all(&self) {
        for topic in self.topics() {
            if let Err(e) = self.transport.subscribe(&topic).await {
                tracing::warn!("Resubscribe to {} after restart failed: {}", topic, e);
            }
        }
    }
}
