// Application-level message envelopes — chat content and internal overlay traffic

use serde::{Deserialize, Serialize};
use serde_json::Value;
use web_time::{SystemTime, UNIX_EPOCH};

/// `type` value for user-visible chat content
pub const CHAT_TYPE: &str = "chat";

/// A user-visible chat message.
///
/// `id`, `from`, `content` and `timestamp` are required for delivery; `to` is
/// empty for topic-wide messages. `type` is absent or `"chat"`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    pub from: String,
    #[serde(default)]
    pub to: String,
    pub content: String,
    /// Unix timestamp (milliseconds)
    pub timestamp: u64,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

impl ChatMessage {
    /// Create a new chat message with a fresh UUID and the current time
    pub fn new(from: impl Into<String>, to: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            from: from.into(),
            to: to.into(),
            content: content.into(),
            timestamp: now_millis(),
            kind: None,
        }
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// Kind of protocol-internal traffic
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolKind {
    Heartbeat,
    Announcement,
    TopicAnnouncement,
    /// Any other non-chat `type`
    Other(String),
}

impl ProtocolKind {
    fn from_type(kind: &str) -> Self {
        match kind {
            "heartbeat" => ProtocolKind::Heartbeat,
            "announcement" => ProtocolKind::Announcement,
            "topic_announcement" => ProtocolKind::TopicAnnouncement,
            other => ProtocolKind::Other(other.to_string()),
        }
    }
}

/// Result of validating an inbound payload at the boundary
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    /// Deliverable chat content
    Chat(ChatMessage),
    /// Overlay maintenance traffic, consumed silently
    Internal(ProtocolKind),
    /// Claimed to be chat but failed validation
    Malformed(String),
}

impl InboundMessage {
    /// Classify a raw payload by its `type` field.
    pub fn classify(value: &Value) -> Self {
        let Some(object) = value.as_object() else {
            return InboundMessage::Malformed("payload is not an object".to_string());
        };

        match object.get("type") {
            None | Some(Value::Null) => {}
            Some(Value::String(kind)) if kind == CHAT_TYPE => {}
            Some(Value::String(kind)) => return InboundMessage::Internal(ProtocolKind::from_type(kind)),
            Some(other) => {
                return InboundMessage::Malformed(format!("non-string type field: {}", other));
            }
        }

        match serde_json::from_value::<ChatMessage>(value.clone()) {
            Ok(msg) => InboundMessage::Chat(msg),
            Err(e) => InboundMessage::Malformed(e.to_string()),
        }
    }

    /// Classify a raw transport payload (JSON bytes)
    pub fn from_bytes(bytes: &[u8]) -> Self {
        match serde_json::from_slice::<Value>(bytes) {
            Ok(value) => Self::classify(&value),
            Err(e) => InboundMessage::Malformed(format!("invalid JSON: {}", e)),
        }
    }

    pub fn is_chat(&self) -> bool {
        matches!(self, InboundMessage::Chat(_))
    }
}

/// Outbound overlay maintenance messages
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControlMessage {
    /// Keeps a topic mesh from pruning idle edges
    Heartbeat {
        from: String,
        topic: String,
        timestamp: u64,
    },
    /// Tells a newly connected peer which topics we are on
    Announcement {
        from: String,
        topics: Vec<String>,
        timestamp: u64,
    },
    /// Best-effort nudge before publishing into a thin mesh
    TopicAnnouncement {
        from: String,
        topic: String,
        timestamp: u64,
    },
}

impl ControlMessage {
    pub fn heartbeat(from: &str, topic: &str) -> Self {
        ControlMessage::Heartbeat {
            from: from.to_string(),
            topic: topic.to_string(),
            timestamp: now_millis(),
        }
    }

    pub fn announcement(from: &str, topics: Vec<String>) -> Self {
        ControlMessage::Announcement {
            from: from.to_string(),
            topics,
            timestamp: now_millis(),
        }
    }

    pub fn topic_announcement(from: &str, topic: &str) -> Self {
        ControlMessage::TopicAnnouncement {
            from: from.to_string(),
            topic: topic.to_string(),
            timestamp: now_millis(),
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        serde_json::to_vec(self).unwrap_or_default()
    }
}

/// Current Unix time in milliseconds
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_chat_without_type_is_delivered() {
        let raw = json!({"id": "1", "from": "a", "to": "b", "content": "hi", "timestamp": 5});
        match InboundMessage::classify(&raw) {
            InboundMessage::Chat(msg) => {
                assert_eq!(msg.content, "hi");
                assert_eq!(msg.to, "b");
                assert!(msg.kind.is_none());
            }
            other => panic!("expected chat, got {:?}", other),
        }
    }

    #[test]
    fn test_explicit_chat_type() {
        let raw = json!({"id": "1", "from": "a", "content": "hi", "timestamp": 5, "type": "chat"});
        assert!(InboundMessage::classify(&raw).is_chat());
    }

    #[test]
    fn test_internal_types_are_not_chat() {
        for kind in ["heartbeat", "announcement", "topic_announcement"] {
            let raw = json!({"id": "1", "from": "a", "content": "x", "timestamp": 5, "type": kind});
            assert!(matches!(
                InboundMessage::classify(&raw),
                InboundMessage::Internal(_)
            ));
        }
        let raw = json!({"type": "presence"});
        assert_eq!(
            InboundMessage::classify(&raw),
            InboundMessage::Internal(ProtocolKind::Other("presence".to_string()))
        );
    }

    #[test]
    fn test_missing_required_fields_is_malformed() {
        let missing_id = json!({"from": "a", "content": "x", "timestamp": 1});
        let missing_content = json!({"id": "1", "from": "a", "timestamp": 1});
        let missing_timestamp = json!({"id": "1", "from": "a", "content": "x"});
        for raw in [missing_id, missing_content, missing_timestamp] {
            assert!(matches!(
                InboundMessage::classify(&raw),
                InboundMessage::Malformed(_)
            ));
        }
        assert!(matches!(
            InboundMessage::classify(&json!("hello")),
            InboundMessage::Malformed(_)
        ));
        assert!(matches!(
            InboundMessage::from_bytes(b"not json"),
            InboundMessage::Malformed(_)
        ));
    }

    #[test]
    fn test_control_messages_classify_as_internal() {
        let heartbeat = ControlMessage::heartbeat("peerA", "room");
        assert_eq!(
            InboundMessage::from_bytes(&heartbeat.to_bytes()),
            InboundMessage::Internal(ProtocolKind::Heartbeat)
        );

        let announce = ControlMessage::announcement("peerA", vec!["room".to_string()]);
        assert_eq!(
            InboundMessage::from_bytes(&announce.to_bytes()),
            InboundMessage::Internal(ProtocolKind::Announcement)
        );

        let topic_announce = ControlMessage::topic_announcement("peerA", "room");
        assert_eq!(
            InboundMessage::from_bytes(&topic_announce.to_bytes()),
            InboundMessage::Internal(ProtocolKind::TopicAnnouncement)
        );
    }

    #[test]
    fn test_new_message_has_id_and_time() {
        let msg = ChatMessage::new("alice", "bob", "hello");
        assert!(!msg.id.is_empty());
        assert!(msg.timestamp > 0);
        assert!(msg.to_value().get("type").is_none());
    }
}
