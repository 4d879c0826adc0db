//! Transport abstraction layer for peerchat
//!
//! Defines the pub/sub surface the overlay and host are written against, so the
//! same logic runs over a libp2p gossipsub swarm or an in-process hub.

use async_trait::async_trait;
use std::fmt;
use thiserror::Error;
use tokio::sync::mpsc;

/// Events from the transport to the overlay
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// A payload arrived on a subscribed topic
    Message {
        topic: String,
        source: Option<String>,
        data: Vec<u8>,
    },
    /// A remote peer connected
    PeerConnected(String),
    /// A remote peer disconnected
    PeerDisconnected(String),
}

impl fmt::Display for TransportEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportEvent::Message { topic, source, data } => write!(
                f,
                "Message {{ topic: {}, source: {}, data_len: {} }}",
                topic,
                source.as_deref().unwrap_or("unknown"),
                data.len()
            ),
            TransportEvent::PeerConnected(peer) => write!(f, "PeerConnected {{ {} }}", peer),
            TransportEvent::PeerDisconnected(peer) => write!(f, "PeerDisconnected {{ {} }}", peer),
        }
    }
}

/// Errors that can occur in the transport layer
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("Insufficient peers on topic: {0}")]
    InsufficientPeers(String),

    #[error("Subscription failed: {0}")]
    SubscriptionFailed(String),

    #[error("Publish failed: {0}")]
    PublishFailed(String),

    #[error("Transport not running")]
    NotRunning,

    #[error("Restart failed: {0}")]
    RestartFailed(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// A topic-based publish/subscribe transport.
///
/// Publishing never loops back to the local node; self-echo is the host's job.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PubsubTransport: Send + Sync {
    /// Identity of the local node on this transport
    fn local_peer_id(&self) -> String;

    async fn subscribe(&self, topic: &str) -> Result<(), TransportError>;

    async fn unsubscribe(&self, topic: &str) -> Result<(), TransportError>;

    /// Topics currently registered with the transport
    async fn subscriptions(&self) -> Vec<String>;

    async fn is_subscribed(&self, topic: &str) -> bool;

    async fn publish(&self, topic: &str, data: Vec<u8>) -> Result<(), TransportError>;

    async fn connected_peers(&self) -> Vec<String>;

    /// Connected peers known to be subscribed to `topic`
    async fn topic_peers(&self, topic: &str) -> Vec<String>;

    /// Lightweight liveness nudge; may prompt peer discovery
    async fn probe(&self) -> Result<(), TransportError>;

    /// Tear the transport down and bring it back up. Subscriptions do not survive.
    async fn restart(&self) -> Result<(), TransportError>;

    /// Take the event stream. Only the first caller gets it.
    fn take_events(&self) -> Option<mpsc::UnboundedReceiver<TransportEvent>>;
}
