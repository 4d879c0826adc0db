// Node key material

use anyhow::Result;
use libp2p::identity::Keypair;
use libp2p::PeerId;

/// The node's long-lived network identity (ed25519)
#[derive(Clone)]
pub struct NodeIdentity {
    keypair: Keypair,
}

impl NodeIdentity {
    /// Generate a new random identity
    pub fn generate() -> Self {
        Self {
            keypair: Keypair::generate_ed25519(),
        }
    }

    pub fn keypair(&self) -> &Keypair {
        &self.keypair
    }

    pub fn peer_id(&self) -> PeerId {
        self.keypair.public().to_peer_id()
    }

    /// Short hex fingerprint for display (Blake3 of the peer id)
    pub fn fingerprint(&self) -> String {
        let hash = blake3::hash(&self.peer_id().to_bytes());
        hex::encode(&hash.as_bytes()[..8])
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(self.keypair.to_protobuf_encoding()?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(Self {
            keypair: Keypair::from_protobuf_encoding(bytes)?,
        })
    }
}

impl std::fmt::Debug for NodeIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeIdentity")
            .field("peer_id", &self.peer_id())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bytes_restore_same_peer_id() {
        let identity = NodeIdentity::generate();
        let restored = NodeIdentity::from_bytes(&identity.to_bytes().unwrap()).unwrap();
        assert_eq!(identity.peer_id(), restored.peer_id());
        assert_eq!(identity.fingerprint(), restored.fingerprint());
    }

    #[test]
    fn test_garbage_rejected() {
        assert!(NodeIdentity::from_bytes(b"not a key").is_err());
    }

    #[test]
    fn test_debug_hides_secret() {
        let identity = NodeIdentity::generate();
        let debug = format!("{:?}", identity);
        assert!(debug.contains(&identity.peer_id().to_string()));
    }
}
