// Bridge module — the foreground side of the host/client split

pub mod client;
pub mod handlers;
pub mod link;

pub use client::{BridgeClient, BridgeError, PublishOutcome};
pub use handlers::{CallbackSet, HandlerRegistry, MessageHandler, StatusHandler};
pub use link::{HostLink, LinkError, RecordingLink};
