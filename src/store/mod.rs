//! Shared storage backends.
//!
//! # Data Flow
//! ```text
//! security::rate_limit ──► KvStore (approximate counters with TTL)
//! assets::StaticAssets ──► ObjectStore (immutable content by key)
//! ```
//!
//! # Design Decisions
//! - Both are async traits so a networked store can replace the in-memory one
//! - Last write wins; no compare-and-swap
//! - Entries may vanish at any time (TTL or capacity); a miss is never an error

pub mod kv;
pub mod object;

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

pub use kv::MemoryKvStore;
pub use object::{FsObjectStore, MemoryObjectStore, ObjectStore, StoredObject};

/// Errors surfaced by storage backends.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid key: {0}")]
    InvalidKey(String),
}

/// Eventually-consistent key-value store with per-entry expiry.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Read a value. Expired and evicted keys read as `None`.
    async fn get(&self, key: &str) -> Result<Option<Bytes>, StoreError>;

    /// Write a value, replacing any previous one.
    async fn put(&self, key: &str, value: Bytes, ttl: Option<Duration>) -> Result<(), StoreError>;
}
