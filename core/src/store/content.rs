// Content-addressed message storage

use super::backend::StorageBackend;
use crate::protocol::ChatMessage;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

const BLOCK_PREFIX: &str = "blk:";

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("Storage backend error: {0}")]
    Backend(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Invalid content id: {0}")]
    InvalidContentId(String),

    #[error("Content not found: {0}")]
    NotFound(ContentId),

    #[error("Content does not match its id: {0}")]
    IntegrityMismatch(ContentId),

    #[error("Retrieval of {cid} failed after {attempts} attempts: {reason}")]
    Retrieval {
        cid: ContentId,
        attempts: u32,
        reason: String,
    },
}

/// Address derived from content: `z` + base58(blake3(bytes))
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentId(String);

impl ContentId {
    pub fn for_bytes(bytes: &[u8]) -> Self {
        let digest = blake3::hash(bytes);
        ContentId(format!("z{}", bs58::encode(digest.as_bytes()).into_string()))
    }

    /// Id of a message's canonical JSON encoding
    pub fn for_message(message: &ChatMessage) -> Result<Self, StoreError> {
        Ok(Self::for_bytes(&canonical_bytes(message)?))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ContentId {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let encoded = s
            .strip_prefix('z')
            .ok_or_else(|| StoreError::InvalidContentId(s.to_string()))?;
        let digest = bs58::decode(encoded)
            .into_vec()
            .map_err(|_| StoreError::InvalidContentId(s.to_string()))?;
        if digest.len() != blake3::OUT_LEN {
            return Err(StoreError::InvalidContentId(s.to_string()));
        }
        Ok(ContentId(s.to_string()))
    }
}

fn canonical_bytes(message: &ChatMessage) -> Result<Vec<u8>, StoreError> {
    serde_json::to_vec(message).map_err(|e| StoreError::Serialization(e.to_string()))
}

/// Durable content-addressed storage for chat messages
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ContentStore: Send + Sync {
    async fn store(&self, message: &ChatMessage) -> Result<ContentId, StoreError>;
    async fn retrieve(&self, cid: &ContentId) -> Result<ChatMessage, StoreError>;
}

/// `ContentStore` over a key-value backend
pub struct BlockStore<B: StorageBackend> {
    backend: B,
}

impl<B: StorageBackend> BlockStore<B> {
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    fn block_key(cid: &ContentId) -> Vec<u8> {
        format!("{}{}", BLOCK_PREFIX, cid).into_bytes()
    }

    pub fn contains(&self, cid: &ContentId) -> Result<bool, StoreError> {
        Ok(self
            .backend
            .get(&Self::block_key(cid))
            .map_err(StoreError::Backend)?
            .is_some())
    }

    pub fn block_count(&self) -> Result<usize, StoreError> {
        self.backend
            .count_prefix(BLOCK_PREFIX.as_bytes())
            .map_err(StoreError::Backend)
    }
}

#[async_trait]
impl<B: StorageBackend> ContentStore for BlockStore<B> {
    async fn store(&self, message: &ChatMessage) -> Result<ContentId, StoreError> {
        let bytes = canonical_bytes(message)?;
        let cid = ContentId::for_bytes(&bytes);
        self.backend
            .put(&Self::block_key(&cid), &bytes)
            .map_err(StoreError::Backend)?;
        self.backend.flush().map_err(StoreError::Backend)?;
        tracing::debug!("Stored message {} as {}", message.id, cid);
        Ok(cid)
    }

    async fn retrieve(&self, cid: &ContentId) -> Result<ChatMessage, StoreError> {
        let bytes = self
            .backend
            .get(&Self::block_key(cid))
            .map_err(StoreError::Backend)?
            .ok_or_else(|| StoreError::NotFound(cid.clone()))?;

        if ContentId::for_bytes(&bytes) != *cid {
            return Err(StoreError::IntegrityMismatch(cid.clone()));
        }
        serde_json::from_slice(&bytes).map_err(|e| StoreError::Serialization(e.to_string()))
    }
}
