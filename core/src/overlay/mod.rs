// Overlay module — reconciliation and heartbeat on top of the transport

pub mod node;

pub use node::{HealthReport, OverlayConfig, PubsubNode};
