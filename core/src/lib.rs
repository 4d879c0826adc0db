// Peerchat Core — service-worker style messaging bridge
//
// A background host owns the network identity and topic state; any number of
// foreground bridge clients talk to it by message passing. The client keeps the
// durable record of subscription intent and replays it whenever the host
// announces readiness.

pub mod bridge;
pub mod identity;
pub mod overlay;
pub mod protocol;
pub mod retry;
pub mod store;
pub mod transport;

#[cfg(not(target_arch = "wasm32"))]
pub mod host;

pub use bridge::{BridgeClient, BridgeError, HostLink, LinkError, PublishOutcome};
pub use identity::{IdentityManager, IdentityStore, NodeIdentity};
pub use overlay::{HealthReport, OverlayConfig, PubsubNode};
pub use protocol::{
    ChatMessage, ConnectionStatus, ControlMessage, HostCommand, HostEvent, InboundMessage,
    PeerLinkStatus, ProtocolKind,
};
pub use retry::{RetryError, RetryPolicy};
pub use store::{ContentId, ContentStore, MessageArchive, StoreError};
pub use transport::{MemoryNetwork, MemoryTransport, PubsubTransport, TransportError, TransportEvent};

#[cfg(not(target_arch = "wasm32"))]
pub use host::{ClientPort, HostConfig, HostHandle, NodeHost};
#[cfg(not(target_arch = "wasm32"))]
pub use transport::{GossipsubTransport, SwarmSettings};
