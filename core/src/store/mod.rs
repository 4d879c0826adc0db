// Store module — content-addressed message persistence

pub mod archive;
pub mod backend;
pub mod content;

pub use archive::MessageArchive;
#[cfg(not(target_arch = "wasm32"))]
pub use backend::SledStorage;
pub use backend::{MemoryStorage, StorageBackend};
pub use content::{BlockStore, ContentId, ContentStore, StoreError};
