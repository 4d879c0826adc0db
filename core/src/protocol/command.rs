// Commands sent from a bridge client to the node host

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A command posted by a foreground context to the background host.
///
/// Wire shape is `{action: "...", ...fields}`, camelCase, so the same JSON can
/// travel over a service-worker `postMessage` or an in-process channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum HostCommand {
    /// Ask the host to announce readiness (idempotent)
    Init,
    Subscribe {
        topic: String,
    },
    Unsubscribe {
        topic: String,
    },
    Publish {
        topic: String,
        message: Value,
        /// Correlates the eventual `publish_result` with this command
        #[serde(default, rename = "requestId", skip_serializing_if = "Option::is_none")]
        request_id: Option<String>,
    },
    GetSubscriptions,
    GetPeers,
}

impl HostCommand {
    /// Parse a raw wire command, rejecting malformed input.
    ///
    /// Returns `None` for unknown actions, missing or empty topics, and publish
    /// commands without a message body. The host drops those without replying.
    pub fn from_value(value: &Value) -> Option<Self> {
        let command: HostCommand = serde_json::from_value(value.clone()).ok()?;
        match &command {
            HostCommand::Subscribe { topic } | HostCommand::Unsubscribe { topic } => {
                if topic.is_empty() {
                    return None;
                }
            }
            HostCommand::Publish { topic, message, .. } => {
                if topic.is_empty() || message.is_null() {
                    return None;
                }
            }
            HostCommand::Init | HostCommand::GetSubscriptions | HostCommand::GetPeers => {}
        }
        Some(command)
    }

    /// Serialize to the wire representation
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    /// Action name as it appears on the wire
    pub fn action(&self) -> &'static str {
        match self {
            HostCommand::Init => "init",
            HostCommand::Subscribe { .. } => "subscribe",
            HostCommand::Unsubscribe { .. } => "unsubscribe",
            HostCommand::Publish { .. } => "publish",
            HostCommand::GetSubscriptions => "getSubscriptions",
            HostCommand::GetPeers => "getPeers",
        }
    }
}
