// Host module — the background side of the host/client split

pub mod clients;
pub mod node_host;

pub use clients::{ClientId, ClientLink, ClientPort, ClientRegistry};
pub use node_host::{HostConfig, HostHandle, NodeHost};
