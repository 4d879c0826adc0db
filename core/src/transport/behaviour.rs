// Combined NetworkBehaviour for peerchat
//
// - gossipsub: topic pub/sub carrying chat and overlay control traffic
// - mdns: peer discovery on LAN
// - identify: exchange peer metadata

use libp2p::{
    gossipsub, identify, mdns,
    swarm::{behaviour::toggle::Toggle, NetworkBehaviour},
};
use std::time::Duration;

/// The peerchat network behaviour combining all protocols.
#[derive(NetworkBehaviour)]
pub struct PeerchatBehaviour {
    /// Topic pub/sub
    pub gossipsub: gossipsub::Behaviour,
    /// LAN peer discovery, off when multicast is unavailable
    pub mdns: Toggle<mdns::tokio::Behaviour>,
    /// Peer identification
    pub identify: identify::Behaviour,
}

/// Content-derived message id, so identical payloads are deduplicated by the mesh
fn message_id(message: &gossipsub::Message) -> gossipsub::MessageId {
    let mut hasher = blake3::Hasher::new();
    hasher.update(message.topic.as_str().as_bytes());
    hasher.update(&message.data);
    gossipsub::MessageId::from(hex::encode(hasher.finalize().as_bytes()))
}

impl PeerchatBehaviour {
    /// Create a new behaviour with the given keypair
    pub fn new(keypair: &libp2p::identity::Keypair, enable_mdns: bool) -> anyhow::Result<Self> {
        let peer_id = keypair.public().to_peer_id();

        // Chat rooms are small; keep the mesh thresholds low so a handful of
        // peers is enough to publish
        let gossipsub_config = gossipsub::ConfigBuilder::default()
            .heartbeat_interval(Duration::from_secs(10))
            .validation_mode(gossipsub::ValidationMode::Strict)
            .message_id_fn(message_id)
            .mesh_n(3)
            .mesh_n_low(1)
            .mesh_n_high(6)
            .mesh_outbound_min(0)
            .gossip_lazy(3)
            .build()
            .map_err(|e| anyhow::anyhow!("Gossipsub config error: {}", e))?;

        let gossipsub = gossipsub::Behaviour::new(
            gossipsub::MessageAuthenticity::Signed(keypair.clone()),
            gossipsub_config,
        )
        .map_err(|e| anyhow::anyhow!("Gossipsub error: {}", e))?;

        // mDNS for LAN discovery
        let mdns = if enable_mdns {
            Some(mdns::tokio::Behaviour::new(mdns::Config::default(), peer_id)?)
        } else {
            None
        };

        // Identify protocol
        let identify = identify::Behaviour::new(
            identify::Config::new("/peerchat/id/1.0.0".to_string(), keypair.public())
                .with_push_listen_addr_updates(true)
                .with_interval(Duration::from_secs(60)),
        );

        Ok(Self {
            gossipsub,
            mdns: Toggle::from(mdns),
            identify,
        })
    }
}
