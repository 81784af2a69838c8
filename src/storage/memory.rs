//! In-memory record and object stores

use super::{BatchRecordStore, ObjectStore, SealStore};
use crate::anchoring::{SealRecord, SealStateKind};
use crate::error::{AnchorError, Result};
use crate::SealableBatch;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;

/// Batch and seal records held in memory
#[derive(Default)]
pub struct MemoryRecordStore {
    /// batch number -> (created_at, batch)
    batches: RwLock<BTreeMap<u64, (i64, SealableBatch)>>,
    seals: RwLock<BTreeMap<String, SealRecord>>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BatchRecordStore for MemoryRecordStore {
    async fn latest_batch(&self) -> Result<Option<SealableBatch>> {
        let batches = self.batches.read().await;
        Ok(batches
            .iter()
            .max_by_key(|(number, (created_at, _))| (*created_at, **number))
            .map(|(_, (_, batch))| batch.clone()))
    }

    async fn insert_batch(&self, batch: &SealableBatch, created_at: i64) -> Result<()> {
        let mut batches = self.batches.write().await;
        if batches.contains_key(&batch.batch_number) {
            return Err(AnchorError::Conflict(format!(
                "batch {} already exists",
                batch.batch_number
            )));
        }
        batches.insert(batch.batch_number, (created_at, batch.clone()));
        Ok(())
    }

    async fn batch_range(&self, from: u64, to: u64) -> Result<Vec<SealableBatch>> {
        if from > to {
            return Ok(Vec::new());
        }
        let batches = self.batches.read().await;
        Ok(batches
            .range(from..=to)
            .map(|(_, (_, batch))| batch.clone())
            .collect())
    }
}

#[async_trait]
impl SealStore for MemoryRecordStore {
    async fn get_seal(&self, link: &str) -> Result<Option<SealRecord>> {
        Ok(self.seals.read().await.get(link).cloned())
    }

    async fn insert_seal(&self, record: &SealRecord) -> Result<bool> {
        let mut seals = self.seals.write().await;
        if seals.contains_key(&record.link) {
            return Ok(false);
        }
        seals.insert(record.link.clone(), record.clone());
        Ok(true)
    }

    async fn put_seal(&self, record: &SealRecord) -> Result<()> {
        let mut seals = self.seals.write().await;
        seals.insert(record.link.clone(), record.clone());
        Ok(())
    }

    async fn put_seals(&self, records: &[SealRecord]) -> Result<()> {
        let mut seals = self.seals.write().await;
        for record in records {
            seals.insert(record.link.clone(), record.clone());
        }
        Ok(())
    }

    async fn list_seals(&self, kinds: &[SealStateKind]) -> Result<Vec<SealRecord>> {
        let seals = self.seals.read().await;
        Ok(seals
            .values()
            .filter(|r| kinds.contains(&r.kind()))
            .cloned()
            .collect())
    }
}

/// In-memory stand-in for the application object store
#[derive(Default)]
pub struct MemoryObjectStore {
    objects: RwLock<HashMap<String, Value>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn get_object(&self, link: &str) -> Result<Option<Value>> {
        Ok(self.objects.read().await.get(link).cloned())
    }

    async fn put_object(&self, link: &str, object: Value) -> Result<()> {
        self.objects.write().await.insert(link.to_string(), object);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn batch(n: u64) -> SealableBatch {
        SealableBatch::empty(n)
    }

    #[tokio::test]
    async fn test_latest_batch_by_creation_time() {
        let store = MemoryRecordStore::new();
        assert!(store.latest_batch().await.unwrap().is_none());

        store.insert_batch(&batch(0), 100).await.unwrap();
        store.insert_batch(&batch(1), 200).await.unwrap();
        assert_eq!(store.latest_batch().await.unwrap().unwrap().batch_number, 1);

        // same timestamp: higher number wins
        store.insert_batch(&batch(2), 200).await.unwrap();
        assert_eq!(store.latest_batch().await.unwrap().unwrap().batch_number, 2);
    }

    #[tokio::test]
    async fn test_duplicate_batch_number_conflicts() {
        let store = MemoryRecordStore::new();
        store.insert_batch(&batch(0), 1).await.unwrap();
        let result = store.insert_batch(&batch(0), 2).await;
        assert!(matches!(result, Err(AnchorError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_batch_range_inclusive() {
        let store = MemoryRecordStore::new();
        for n in 0..5 {
            store.insert_batch(&batch(n), n as i64).await.unwrap();
        }
        let numbers: Vec<u64> = store
            .batch_range(1, 3)
            .await
            .unwrap()
            .iter()
            .map(|b| b.batch_number)
            .collect();
        assert_eq!(numbers, vec![1, 2, 3]);
        assert!(store.batch_range(4, 1).await.unwrap().is_empty());
    }
}
