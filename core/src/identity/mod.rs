// Identity — the node's stable network keypair

mod keys;
mod store;

pub use keys::NodeIdentity;
pub use store::IdentityStore;

use anyhow::Result;

/// Manages the node identity
pub struct IdentityManager {
    store: IdentityStore,
    identity: Option<NodeIdentity>,
}

impl IdentityManager {
    /// Create a new identity manager with in-memory storage
    pub fn new() -> Self {
        Self::with_store(IdentityStore::memory())
    }

    pub fn with_store(store: IdentityStore) -> Self {
        Self {
            store,
            identity: None,
        }
    }

    /// Create an identity manager backed by a sled database at `path`
    #[cfg(not(target_arch = "wasm32"))]
    pub fn with_path(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let backend = crate::store::backend::SledStorage::open(path).map_err(|e| anyhow::anyhow!(e))?;
        Ok(Self::with_store(IdentityStore::persistent(std::sync::Arc::new(backend))))
    }

    /// Load the stored identity or generate and persist a new one
    pub fn initialize(&mut self) -> Result<&NodeIdentity> {
        let identity = match self.store.load()? {
            Some(identity) => {
                tracing::info!("Loaded existing identity {}", identity.peer_id());
                identity
            }
            None => {
                let identity = NodeIdentity::generate();
                tracing::info!("Generated new identity {}", identity.peer_id());
                self.store.save(&identity)?;
                identity
            }
        };
        Ok(self.identity.insert(identity))
    }

    /// Identity, if initialized
    pub fn identity(&self) -> Option<&NodeIdentity> {
        self.identity.as_ref()
    }
}

impl Default for IdentityManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_manager_creation() {
        let manager = IdentityManager::new();
        assert!(manager.identity().is_none());
    }

    #[test]
    fn test_identity_initialization() {
        let mut manager = IdentityManager::new();
        let peer_id = manager.initialize().unwrap().peer_id();
        assert_eq!(manager.identity().unwrap().peer_id(), peer_id);
    }

    #[test]
    fn test_identity_persistence() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("identity");

        let first = IdentityManager::with_path(&path)
            .unwrap()
            .initialize()
            .unwrap()
            .peer_id();

        let second = IdentityManager::with_path(&path)
            .unwrap()
            .initialize()
            .unwrap()
            .peer_id();

        assert_eq!(first, second);
    }
}
