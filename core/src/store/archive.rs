// Message archive — content store plus an ordered index of stored messages

use super::backend::{MemoryStorage, StorageBackend};
use super::content::{BlockStore, ContentId, ContentStore, StoreError};
use crate::protocol::ChatMessage;
use crate::retry::RetryPolicy;
use parking_lot::Mutex;
use std::sync::Arc;

const INDEX_PREFIX: &str = "idx:";
const SEEN_PREFIX: &str = "seen:";

/// Persists chat messages and remembers their content ids in arrival order.
pub struct MessageArchive {
    content: Arc<dyn ContentStore>,
    index: Arc<dyn StorageBackend>,
    retry: RetryPolicy,
    /// Held while a sequence number is allocated and written
    append: Mutex<()>,
}

impl MessageArchive {
    pub fn new(content: Arc<dyn ContentStore>, index: Arc<dyn StorageBackend>) -> Self {
        Self {
            content,
            index,
            retry: RetryPolicy::default(),
            append: Mutex::new(()),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Blocks and index in one in-memory backend
    pub fn in_memory() -> Self {
        let backend = MemoryStorage::new();
        Self::new(
            Arc::new(BlockStore::new(backend.clone())),
            Arc::new(backend),
        )
    }

    /// Blocks and index in a sled database at `path`
    #[cfg(not(target_arch = "wasm32"))]
    pub fn open(path: impl AsRef<std::path::Path>) -> Result<Self, StoreError> {
        let blocks = super::backend::SledStorage::open(path.as_ref().join("blocks"))
            .map_err(StoreError::Backend)?;
        let index = super::backend::SledStorage::open(path.as_ref().join("index"))
            .map_err(StoreError::Backend)?;
        Ok(Self::new(Arc::new(BlockStore::new(blocks)), Arc::new(index)))
    }

    /// Store a message and index its id. Storing the same content twice indexes it once.
    pub async fn store(&self, message: &ChatMessage) -> Result<ContentId, StoreError> {
        let cid = self.content.store(message).await?;

        let _append = self.append.lock();
        let seen_key = format!("{}{}", SEEN_PREFIX, cid);
        if self
            .index
            .get(seen_key.as_bytes())
            .map_err(StoreError::Backend)?
            .is_some()
        {
            return Ok(cid);
        }

        let seq = self
            .index
            .count_prefix(INDEX_PREFIX.as_bytes())
            .map_err(StoreError::Backend)?;
        let index_key = format!("{}{:020}", INDEX_PREFIX, seq);
        self.index
            .put(index_key.as_bytes(), cid.as_str().as_bytes())
            .map_err(StoreError::Backend)?;
        self.index
            .put(seen_key.as_bytes(), &[])
            .map_err(StoreError::Backend)?;
        self.index.flush().map_err(StoreError::Backend)?;
        Ok(cid)
    }

    /// Retrieve a message, retrying transient failures
    pub async fn retrieve(&self, cid: &ContentId) -> Result<ChatMessage, StoreError> {
        let label = format!("retrieve {}", cid);
        self.retry
            .run(&label, |_| self.content.retrieve(cid))
            .await
            .map_err(|e| StoreError::Retrieval {
                cid: cid.clone(),
                attempts: e.attempts(),
                reason: e.into_inner().to_string(),
            })
    }

    /// Indexed content ids in the order they were stored
    pub fn message_ids(&self) -> Result<Vec<ContentId>, StoreError> {
        let entries = self
            .index
            .scan_prefix(INDEX_PREFIX.as_bytes())
            .map_err(StoreError::Backend)?;

        let mut ids = Vec::with_capacity(entries.len());
        for (_, value) in entries {
            match String::from_utf8(value)
                .map_err(|e| StoreError::InvalidContentId(e.to_string()))
                .and_then(|s| s.parse::<ContentId>())
            {
                Ok(cid) => ids.push(cid),
                Err(e) => tracing::warn!("Skipping corrupt index entry: {}", e),
            }
        }
        Ok(ids)
    }

    pub fn len(&self) -> usize {
        self.index
            .count_prefix(INDEX_PREFIX.as_bytes())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every archived message that can still be retrieved, oldest first.
    ///
    /// Messages that fail retrieval are dropped with a warning.
    pub async fn load_conversation(&self) -> Result<Vec<ChatMessage>, StoreError> {
        let mut messages = Vec::new();
        for cid in self.message_ids()? {
            match self.retrieve(&cid).await {
                Ok(message) => messages.push(message),
                Err(e) => tracing::warn!("Dropping unretrievable message: {}", e),
            }
        }
        messages.sort_by_key(|m| m.timestamp);
        Ok(messages)
    }

    /// The newest `limit` messages, oldest first
    pub async fn load_recent(&self, limit: usize) -> Result<Vec<ChatMessage>, StoreError> {
        let mut messages = self.load_conversation().await?;
        if messages.len() > limit {
            messages.drain(..messages.len() - limit);
        }
        Ok(messages)
    }
}
