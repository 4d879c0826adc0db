// Transport module — pub/sub transports the overlay runs on

pub mod abstraction;
pub mod memory;

#[cfg(not(target_arch = "wasm32"))]
pub mod behaviour;
#[cfg(not(target_arch = "wasm32"))]
pub mod swarm;

pub use abstraction::{PubsubTransport, TransportError, TransportEvent};
pub use memory::{MemoryNetwork, MemoryTransport};
#[cfg(not(target_arch = "wasm32"))]
pub use swarm::{start_swarm, GossipsubTransport, SwarmCommand, SwarmHandle, SwarmSettings};
