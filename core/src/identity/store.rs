// Identity storage over a storage backend

use super::NodeIdentity;
use crate::store::backend::StorageBackend;
use anyhow::Result;
use std::sync::Arc;

const IDENTITY_KEY: &[u8] = b"identity_keypair";

/// Storage backend for the node keypair
pub enum IdentityStore {
    Memory,
    Persistent(Arc<dyn StorageBackend>),
}

impl IdentityStore {
    /// Create in-memory storage
    pub fn memory() -> Self {
        Self::Memory
    }

    /// Create persistent storage
    pub fn persistent(backend: Arc<dyn StorageBackend>) -> Self {
        Self::Persistent(backend)
    }

    pub fn save(&self, identity: &NodeIdentity) -> Result<()> {
        match self {
            // In-memory storage doesn't persist
            Self::Memory => Ok(()),
            Self::Persistent(db) => {
                db.put(IDENTITY_KEY, &identity.to_bytes()?)
                    .map_err(|e| anyhow::anyhow!(e))?;
                db.flush().map_err(|e| anyhow::anyhow!(e))?;
                Ok(())
            }
        }
    }

    pub fn load(&self) -> Result<Option<NodeIdentity>> {
        match self {
            Self::Memory => Ok(None),
            Self::Persistent(db) => match db.get(IDENTITY_KEY).map_err(|e| anyhow::anyhow!(e))? {
                Some(bytes) => Ok(Some(NodeIdentity::from_bytes(&bytes)?)),
                None => Ok(None),
            },
        }
    }

    pub fn clear(&self) -> Result<()> {
        match self {
            Self::Memory => Ok(()),
            Self::Persistent(db) => {
                db.remove(IDENTITY_KEY).map_err(|e| anyhow::anyhow!(e))?;
                db.flush().map_err(|e| anyhow::anyhow!(e))?;
                Ok(())
            }
        }
    }
}
