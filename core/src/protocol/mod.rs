// Protocol module — wire types shared by the bridge client and the node host

pub mod command;
pub mod event;
pub mod message;

pub use command::HostCommand;
pub use event::{ConnectionStatus, HostEvent, PeerLinkStatus};
pub use message::{now_millis, ChatMessage, ControlMessage, InboundMessage, ProtocolKind};
