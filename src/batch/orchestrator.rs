//! Orchestrator Module
//!
//! Stands in for the external cron trigger: a background loop that runs one
//! short unit of work per tick. Every step re-reads its inputs from storage,
//! so a crash or restart between ticks loses nothing.
//!
//! # Tick Flow
//! 1. Drain the `ResourcePool` into one micro-batch
//! 2. If a generation interval has passed, sweep the next sealable batch and
//!    hand a non-empty batch's root to the lifecycle manager
//! 3. Submit unsealed records
//! 4. Read confirmations for unconfirmed records
//! 5. Reclassify records that exceeded the grace period
//!
//! A failing step is logged and does not stop the steps after it; it is
//! retried on the next tick.

use crate::{
    anchoring::{AnchoringLifecycleManager, CreateSeal, FailureReport, SealReport, SyncReport},
    batch::{MerkleBatchAggregator, ResourcePool},
    config::BatchConfig,
    error::Result,
    MicroBatchReceipt, SealableBatch,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

/// What a single tick did
#[derive(Debug, Clone, Default)]
pub struct TickReport {
    pub micro_batch: Option<MicroBatchReceipt>,
    pub swept: Option<SealableBatch>,
    pub sealed: SealReport,
    pub synced: SyncReport,
    pub failures: FailureReport,
}

pub struct Orchestrator {
    pool: Arc<ResourcePool>,
    aggregator: Arc<MerkleBatchAggregator>,
    lifecycle: Arc<AnchoringLifecycleManager>,
    config: BatchConfig,
    /// Key our own batch roots are sealed under
    base_pub_key: String,
    grace_period: Duration,
    last_sweep: Mutex<Option<Instant>>,
}

impl Orchestrator {
    pub fn new(
        pool: Arc<ResourcePool>,
        aggregator: Arc<MerkleBatchAggregator>,
        lifecycle: Arc<AnchoringLifecycleManager>,
        config: BatchConfig,
        base_pub_key: String,
        grace_period: Duration,
    ) -> Self {
        Self {
            pool,
            aggregator,
            lifecycle,
            config,
            base_pub_key,
            grace_period,
            last_sweep: Mutex::new(None),
        }
    }

    /// Run ticks forever, `tick_interval_ms` apart
    pub async fn start(self) -> anyhow::Result<()> {
        info!("Orchestrator starting...");
        info!(
            "Configuration: safety_buffer={}, generation_interval_ms={}, tick_interval_ms={}, max_pool_items={}",
            self.config.safety_buffer,
            self.config.generation_interval_ms,
            self.config.tick_interval_ms,
            self.config.max_pool_items
        );

        let tick = Duration::from_millis(self.config.tick_interval_ms);
        loop {
            let report = self.run_once().await;
            if let Some(batch) = &report.swept {
                debug!("Tick swept batch #{}", batch.batch_number);
            }
            sleep(tick).await;
        }
    }

    /// One scheduled unit of work
    pub async fn run_once(&self) -> TickReport {
        let mut report = TickReport::default();

        match self.flush_pool().await {
            Ok(receipt) => report.micro_batch = receipt,
            Err(e) => warn!("Failed to commit pooled resources: {}", e),
        }

        if self.sweep_due().await {
            match self.sweep().await {
                Ok(batch) => report.swept = Some(batch),
                Err(e) => warn!("Failed to sweep next batch: {}", e),
            }
        }

        match self.lifecycle.seal_pending().await {
            Ok(sealed) => report.sealed = sealed,
            Err(e) => warn!("Failed to seal pending records: {}", e),
        }

        match self.lifecycle.sync_unconfirmed().await {
            Ok(synced) => report.synced = synced,
            Err(e) => warn!("Failed to sync unconfirmed records: {}", e),
        }

        match self.lifecycle.handle_failures(self.grace_period).await {
            Ok(failures) => report.failures = failures,
            Err(e) => warn!("Failed to handle long-unconfirmed records: {}", e),
        }

        report
    }

    async fn flush_pool(&self) -> Result<Option<MicroBatchReceipt>> {
        let resources = self.pool.drain(self.config.max_pool_items).await;
        if resources.is_empty() {
            return Ok(None);
        }

        match self.aggregator.create_micro_batch_for_resources(&resources).await {
            Ok(receipt) => {
                if let Some(r) = &receipt {
                    info!("Micro-batch {} created with {} links", r.key, r.batch.links.len());
                }
                Ok(receipt)
            }
            Err(e) => {
                self.pool.requeue(resources).await;
                Err(e)
            }
        }
    }

    async fn sweep_due(&self) -> bool {
        let interval = Duration::from_millis(self.config.generation_interval_ms);
        match *self.last_sweep.lock().await {
            Some(last) => last.elapsed() >= interval,
            None => true,
        }
    }

    async fn sweep(&self) -> Result<SealableBatch> {
        // a previous tick may have persisted its batch but failed to register the root
        if let Some(last) = self.aggregator.get_last_batch().await? {
            self.register_root(&last).await?;
        }

        let batch = self.aggregator.seal_next_batch().await?;
        // the generation is consumed once the batch is persisted
        *self.last_sweep.lock().await = Some(Instant::now());

        if let Err(e) = self.register_root(&batch).await {
            warn!(
                "Batch #{} persisted but its root was not registered, retrying next sweep: {}",
                batch.batch_number, e
            );
        }
        Ok(batch)
    }

    async fn register_root(&self, batch: &SealableBatch) -> Result<()> {
        if let Some(root) = &batch.merkle_root {
            self.lifecycle
                .create(CreateSeal {
                    key: self.base_pub_key.clone(),
                    link: root.clone(),
                    permalink: root.clone(),
                })
                .await?;
        }
        Ok(())
    }
}
