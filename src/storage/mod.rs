//! Storage Module
//!
//! Durable state for the subsystem lives behind four async traits so the
//! aggregator and lifecycle manager can re-derive everything they need on
//! each scheduled invocation:
//! - `BlobStore`: content-addressed micro-batch blobs with prefix listing
//! - `BatchRecordStore`: sealable batch records (latest and range lookups)
//! - `SealStore`: per-object seal records
//! - `ObjectStore`: the application objects that receive `_seal` metadata
//!
//! Backends: in-memory (tests, dry runs), filesystem blobs, and SQLite records
//! through sqlx.

mod blob;
mod memory;
mod sqlite;

pub use blob::{gunzip_json, gzip_json, FsBlobStore, MemoryBlobStore};
pub use memory::{MemoryObjectStore, MemoryRecordStore};
pub use sqlite::SqliteRecordStore;

use crate::anchoring::{SealRecord, SealStateKind};
use crate::error::Result;
use crate::SealableBatch;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Headers stored alongside a blob
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobHeaders {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_encoding: Option<String>,
}

impl BlobHeaders {
    /// Headers for a gzip-compressed JSON document
    pub fn gzipped_json() -> Self {
        Self {
            content_type: Some("application/json".to_string()),
            content_encoding: Some("gzip".to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Blob {
    pub key: String,
    pub body: Vec<u8>,
    pub headers: BlobHeaders,
}

/// Object storage abstraction for micro-batch blobs
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn put(&self, key: &str, body: Vec<u8>, headers: BlobHeaders) -> Result<()>;

    async fn get(&self, key: &str) -> Result<Option<Blob>>;

    /// Every blob whose key starts with `prefix`, in lexicographic key order
    async fn list_with_prefix(&self, prefix: &str) -> Result<Vec<Blob>>;
}

/// Record store for sealable batches
#[async_trait]
pub trait BatchRecordStore: Send + Sync {
    /// Most recently created batch (ties broken by the higher batch number)
    async fn latest_batch(&self) -> Result<Option<SealableBatch>>;

    /// Persist a new batch; fails with `Conflict` if its number is taken
    async fn insert_batch(&self, batch: &SealableBatch, created_at: i64) -> Result<()>;

    /// Batches numbered `from..=to`, ascending
    async fn batch_range(&self, from: u64, to: u64) -> Result<Vec<SealableBatch>>;
}

/// Record store for per-object seal records
#[async_trait]
pub trait SealStore: Send + Sync {
    async fn get_seal(&self, link: &str) -> Result<Option<SealRecord>>;

    /// Insert unless a record for the same link exists; returns whether it was inserted
    async fn insert_seal(&self, record: &SealRecord) -> Result<bool>;

    async fn put_seal(&self, record: &SealRecord) -> Result<()>;

    /// Upsert all records in a single batched write
    async fn put_seals(&self, records: &[SealRecord]) -> Result<()>;

    async fn list_seals(&self, kinds: &[SealStateKind]) -> Result<Vec<SealRecord>>;
}

/// The application object store seal metadata is written back to
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn get_object(&self, link: &str) -> Result<Option<Value>>;

    async fn put_object(&self, link: &str, object: Value) -> Result<()>;
}
