// Events broadcast from the node host to every connected bridge client

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Connection status of a bridge client (and, host side, of the transport)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    Connecting,
    Connected,
    Disconnected,
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionStatus::Connecting => write!(f, "connecting"),
            ConnectionStatus::Connected => write!(f, "connected"),
            ConnectionStatus::Disconnected => write!(f, "disconnected"),
        }
    }
}

/// Remote peer link state reported in `peer_connection` events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PeerLinkStatus {
    Connected,
    Disconnected,
}

/// An event sent by the host. Wire shape is `{type: "...", ...fields}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum HostEvent {
    #[serde(rename = "ipfs_ready")]
    Ready {
        #[serde(rename = "peerId")]
        peer_id: String,
    },
    #[serde(rename = "subscription")]
    Subscription { topic: String, subscribed: bool },
    #[serde(rename = "message")]
    Message { topic: String, message: Value },
    #[serde(rename = "subscriptions")]
    Subscriptions { topics: Vec<String> },
    #[serde(rename = "publish_result")]
    PublishResult {
        topic: String,
        #[serde(rename = "messageId")]
        message_id: String,
        success: bool,
        #[serde(default)]
        error: Option<String>,
        #[serde(default, rename = "requestId", skip_serializing_if = "Option::is_none")]
        request_id: Option<String>,
    },
    #[serde(rename = "peer_connection")]
    PeerConnection {
        #[serde(rename = "peerId")]
        peer_id: String,
        status: PeerLinkStatus,
    },
    #[serde(rename = "peer_list")]
    PeerList { peers: Vec<String> },
    /// Host-side transport health changed
    #[serde(rename = "connection_status")]
    ConnectionStatus { status: ConnectionStatus },
}

impl HostEvent {
    /// Parse a raw wire event. Unknown or malformed events yield `None`.
    pub fn from_value(value: &Value) -> Option<Self> {
        serde_json::from_value(value.clone()).ok()
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    /// Event type name as it appears on the wire
    pub fn kind(&self) -> &'static str {
        match self {
            HostEvent::Ready { .. } => "ipfs_ready",
            HostEvent::Subscription { .. } => "subscription",
            HostEvent::Message { .. } => "message",
            HostEvent::Subscriptions { .. } => "subscriptions",
            HostEvent::PublishResult { .. } => "publish_result",
            HostEvent::PeerConnection { .. } => "peer_connection",
            HostEvent::PeerList { .. } => "peer_list",
            HostEvent::ConnectionStatus { .. } => "connection_status",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_ready_wire_shape() {
        let event = HostEvent::Ready {
            peer_id: "peerA".to_string(),
        };
        assert_eq!(event.to_value(), json!({"type": "ipfs_ready", "peerId": "peerA"}));
    }

    #[test]
    fn test_publish_result_without_request_id() {
        let raw = json!({
            "type": "publish_result",
            "topic": "room",
            "messageId": "m1",
            "success": false,
            "error": "no peers"
        });
        match HostEvent::from_value(&raw) {
            Some(HostEvent::PublishResult {
                success,
                error,
                request_id,
                ..
            }) => {
                assert!(!success);
                assert_eq!(error.as_deref(), Some("no peers"));
                assert!(request_id.is_none());
            }
            other => panic!("unexpected parse: {:?}", other),
        }
    }

    #[test]
    fn test_peer_connection_status_lowercase() {
        let event = HostEvent::PeerConnection {
            peer_id: "p".to_string(),
            status: PeerLinkStatus::Disconnected,
        };
        assert_eq!(event.to_value()["status"], "disconnected");
    }

    #[test]
    fn test_unknown_event_ignored() {
        assert!(HostEvent::from_value(&json!({"type": "bogus"})).is_none());
        assert!(HostEvent::from_value(&json!({"topic": "x"})).is_none());
        assert!(HostEvent::from_value(&json!({"type": "subscription", "topic": "x"})).is_none());
    }

    #[test]
    fn test_connection_status_display() {
        assert_eq!(ConnectionStatus::Connecting.to_string(), "connecting");
        assert_eq!(
            HostEvent::ConnectionStatus {
                status: ConnectionStatus::Disconnected
            }
            .to_value(),
            json!({"type": "connection_status", "status": "disconnected"})
        );
    }
}
