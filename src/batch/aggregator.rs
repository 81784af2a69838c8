//! Merkle Batch Aggregator
//!
//! Groups content links into micro-batches and sweeps them into numbered,
//! gapless sealable batches.
//!
//! # Generations and the safety buffer
//! A micro-batch is filed under the batch number that is *next* at the time
//! it is written. The sweep that creates batch `N` only reads micro-batches
//! filed under `N - safety_buffer`, giving slow writers `safety_buffer`
//! generations to finish. No lock coordinates the two paths; a writer slower
//! than that is simply left out of its generation's sweep (its blob stays
//! in the store and is reported as late when detected).

use crate::clock::Clock;
use crate::commitment::{key_for_micro_batch, merkle_root_hex, micro_batch_prefix};
use crate::error::{AnchorError, Result};
use crate::storage::{gunzip_json, gzip_json, BatchRecordStore, BlobHeaders, BlobStore};
use crate::{BatchedItem, MicroBatch, MicroBatchReceipt, Resource, SealableBatch};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Smallest safety buffer that still gives writers a full generation
pub const MIN_SAFETY_BUFFER: u64 = 2;

pub struct MerkleBatchAggregator {
    blobs: Arc<dyn BlobStore>,
    records: Arc<dyn BatchRecordStore>,
    clock: Arc<dyn Clock>,
    safety_buffer: u64,
}

impl MerkleBatchAggregator {
    /// Creates a new aggregator
    ///
    /// # Errors
    /// `InvalidInput` if `safety_buffer` is below 2
    pub fn new(
        blobs: Arc<dyn BlobStore>,
        records: Arc<dyn BatchRecordStore>,
        clock: Arc<dyn Clock>,
        safety_buffer: u64,
    ) -> Result<Self> {
        if safety_buffer < MIN_SAFETY_BUFFER {
            return Err(AnchorError::InvalidInput(format!(
                "safety buffer must be at least {}, got {}",
                MIN_SAFETY_BUFFER, safety_buffer
            )));
        }
        Ok(Self {
            blobs,
            records,
            clock,
            safety_buffer,
        })
    }

    pub fn safety_buffer(&self) -> u64 {
        self.safety_buffer
    }

    /// Most recently created sealable batch, if any
    pub async fn get_last_batch(&self) -> Result<Option<SealableBatch>> {
        self.records.latest_batch().await
    }

    /// `None` before the first batch exists
    pub async fn get_last_batch_number(&self) -> Result<Option<u64>> {
        Ok(self.get_last_batch().await?.map(|b| b.batch_number))
    }

    pub async fn get_next_batch_number(&self) -> Result<u64> {
        Ok(self.get_last_batch_number().await?.map_or(0, |n| n + 1))
    }

    /// Build a micro-batch from `items`
    ///
    /// Items are ordered by time, ties broken by link, so the result does not
    /// depend on the order `items` arrive in.
    pub fn create_micro_batch(items: &[BatchedItem]) -> Result<MicroBatch> {
        let mut sorted: Vec<&BatchedItem> = items.iter().collect();
        sorted.sort_by(|a, b| (a.time, &a.link).cmp(&(b.time, &b.link)));

        let (Some(first), Some(last)) = (sorted.first(), sorted.last()) else {
            return Err(AnchorError::InvalidInput(
                "cannot create a micro-batch from zero items".to_string(),
            ));
        };

        let links: Vec<String> = sorted.iter().map(|item| item.link.clone()).collect();
        let merkle_root = merkle_root_hex(&links)
            .ok_or_else(|| AnchorError::InvalidInput("micro-batch has no links".to_string()))?;

        Ok(MicroBatch {
            merkle_root,
            from_timestamp: first.time,
            to_timestamp: last.time,
            links,
        })
    }

    /// Store `batch` under generation `number`; returns its key
    pub async fn save_micro_batch(&self, batch: &MicroBatch, number: u64) -> Result<String> {
        let key = key_for_micro_batch(batch, number);
        let body = gzip_json(batch)?;
        self.blobs.put(&key, body, BlobHeaders::gzipped_json()).await?;
        debug!("Saved micro-batch {} ({} links)", key, batch.links.len());
        Ok(key)
    }

    /// Commit a set of saved resources as one micro-batch
    ///
    /// Returns `None` for an empty slice.
    pub async fn create_micro_batch_for_resources(
        &self,
        resources: &[Resource],
    ) -> Result<Option<MicroBatchReceipt>> {
        if resources.is_empty() {
            return Ok(None);
        }

        let items: Vec<BatchedItem> = resources.iter().map(Resource::to_batched_item).collect();
        let batch = Self::create_micro_batch(&items)?;
        let number = self.get_next_batch_number().await?;
        let key = self.save_micro_batch(&batch, number).await?;

        let late = self.is_generation_swept(number).await?;
        if late {
            warn!(
                "Micro-batch {} landed after generation {} was swept; it will not be in that batch",
                key, number
            );
        }

        Ok(Some(MicroBatchReceipt {
            batch,
            number,
            key,
            late,
        }))
    }

    /// Whether the sweep covering generation `number` has already happened
    pub async fn is_generation_swept(&self, number: u64) -> Result<bool> {
        let Some(last) = self.get_last_batch_number().await? else {
            return Ok(false);
        };
        Ok(number
            .checked_add(self.safety_buffer)
            .is_some_and(|sweeper| last >= sweeper))
    }

    /// Every micro-batch filed under generation `number`, in listing order
    pub async fn get_micro_batches(&self, number: u64) -> Result<Vec<MicroBatch>> {
        let blobs = self.blobs.list_with_prefix(&micro_batch_prefix(number)).await?;
        blobs.iter().map(|blob| gunzip_json(&blob.body)).collect()
    }

    /// Build (but do not persist) the next sealable batch
    ///
    /// The result must always be persisted, empty or not, to keep the batch
    /// sequence gapless.
    pub async fn gen_next_batch(&self) -> Result<SealableBatch> {
        let batch_number = self.get_next_batch_number().await?;
        if batch_number < self.safety_buffer {
            debug!("Batch {} is inside the safety buffer, nothing to sweep", batch_number);
            return Ok(SealableBatch::empty(batch_number));
        }

        let generation = batch_number - self.safety_buffer;
        let micro_batches = self.get_micro_batches(generation).await?;
        debug!(
            "Sweeping {} micro-batch(es) from generation {} into batch {}",
            micro_batches.len(),
            generation,
            batch_number
        );
        Ok(Self::batch_micro_batches(batch_number, &micro_batches))
    }

    /// Aggregate micro-batches into one sealable batch
    ///
    /// The root commits to every micro-batch's links concatenated in the
    /// given order (not re-sorted across micro-batches). `from_sub_batch`
    /// and `to_sub_batch` point at the roots of the earliest-starting and
    /// latest-ending micro-batches.
    pub fn batch_micro_batches(batch_number: u64, micro_batches: &[MicroBatch]) -> SealableBatch {
        let earliest = micro_batches.iter().min_by_key(|m| m.from_timestamp);
        let latest = micro_batches.iter().max_by_key(|m| m.to_timestamp);
        let links: Vec<&str> = micro_batches
            .iter()
            .flat_map(|m| m.links.iter().map(String::as_str))
            .collect();

        let (Some(earliest), Some(latest), Some(merkle_root)) =
            (earliest, latest, merkle_root_hex(&links))
        else {
            return SealableBatch::empty(batch_number);
        };

        SealableBatch {
            batch_number,
            merkle_root: Some(merkle_root),
            from_sub_batch: Some(earliest.merkle_root.clone()),
            to_sub_batch: Some(latest.merkle_root.clone()),
            from_link: earliest.links.first().cloned(),
            from_timestamp: Some(earliest.from_timestamp),
            to_link: latest.links.last().cloned(),
            to_timestamp: Some(latest.to_timestamp),
        }
    }

    /// Generate the next sealable batch and persist it
    pub async fn seal_next_batch(&self) -> Result<SealableBatch> {
        let batch = self.gen_next_batch().await?;
        self.records.insert_batch(&batch, self.clock.now_ms()).await?;
        match &batch.merkle_root {
            Some(root) => info!("Sealable batch #{} created with root {}", batch.batch_number, root),
            None => info!("Empty sealable batch #{} created", batch.batch_number),
        }
        Ok(batch)
    }
}
