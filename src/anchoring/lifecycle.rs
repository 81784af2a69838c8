//! Anchoring Lifecycle Manager
//!
//! Owns the seal records and drives them through the state machine in
//! `state.rs`. Every operation re-reads what it needs from the `SealStore`,
//! so nothing is lost between scheduled invocations.
//!
//! # Failure classes
//! - **Failed writes** (our own submissions that never confirmed) go back to
//!   `Unsealed` and are retried without bound by the next `seal_pending`.
//! - **Failed reads** (watched commitments owned by someone else) are
//!   abandoned as `Unwatched` once the grace period runs out.
//!
//! Blockchain errors are never retried in-process; they are logged and left
//! for the next scheduled run.

use super::adapter::{BlockchainAdapter, ChainTx};
use super::state::{SealIntent, SealRecord, SealState, SealStateKind};
use crate::clock::Clock;
use crate::error::{AnchorError, Result};
use crate::storage::{ObjectStore, SealStore};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Request to seal an object we own
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateSeal {
    /// Base public key the seal address is derived from
    pub key: String,
    pub link: String,
    pub permalink: String,
}

/// Request to observe a counterparty's seal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchSeal {
    /// The counterparty's base public key
    pub key: String,
    pub link: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SealReport {
    /// Pending records whose address got resolved
    pub resolved: usize,
    pub sealed: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub checked: usize,
    pub updated: usize,
    pub confirmed: usize,
    /// The confirmation read itself failed; nothing was updated
    pub read_failed: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FailureReport {
    pub unwatched: usize,
    pub resealed: usize,
}

pub struct AnchoringLifecycleManager {
    seals: Arc<dyn SealStore>,
    objects: Arc<dyn ObjectStore>,
    blockchain: Arc<dyn BlockchainAdapter>,
    clock: Arc<dyn Clock>,
    required_confirmations: u64,
}

impl AnchoringLifecycleManager {
    pub fn new(
        seals: Arc<dyn SealStore>,
        objects: Arc<dyn ObjectStore>,
        blockchain: Arc<dyn BlockchainAdapter>,
        clock: Arc<dyn Clock>,
        required_confirmations: u64,
    ) -> Result<Self> {
        if required_confirmations == 0 {
            return Err(AnchorError::InvalidInput(
                "required confirmations must be at least 1".to_string(),
            ));
        }
        Ok(Self {
            seals,
            objects,
            blockchain,
            clock,
            required_confirmations,
        })
    }

    pub fn required_confirmations(&self) -> u64 {
        self.required_confirmations
    }

    fn new_record(&self, link: String, permalink: String, key: String, intent: SealIntent) -> SealRecord {
        let now = self.clock.now_ms();
        SealRecord {
            link,
            permalink,
            address: None,
            counterparty: match intent {
                SealIntent::Watch => Some(key.clone()),
                SealIntent::Write => None,
            },
            base_pub_key: key,
            blockchain: self.blockchain.blockchain().to_string(),
            network: self.blockchain.network().to_string(),
            intent,
            state: SealState::Pending,
            created_at: now,
            sealed_at: None,
            updated_at: now,
        }
    }

    /// Insert, or return the record a concurrent caller inserted first
    async fn insert_or_existing(&self, record: SealRecord) -> Result<SealRecord> {
        if self.seals.insert_seal(&record).await? {
            return Ok(record);
        }
        self.seals
            .get_seal(&record.link)
            .await?
            .ok_or_else(|| AnchorError::NotFound(format!("seal {}", record.link)))
    }

    /// Register an object we will seal ourselves; idempotent per link
    ///
    /// A record whose address cannot be resolved yet is stored as `Pending`
    /// and resolved again by `seal_pending`.
    pub async fn create(&self, request: CreateSeal) -> Result<SealRecord> {
        if let Some(existing) = self.seals.get_seal(&request.link).await? {
            debug!("Seal for {} already exists ({})", request.link, existing.kind());
            return Ok(existing);
        }

        let mut record = self.new_record(request.link, request.permalink, request.key, SealIntent::Write);
        match self.blockchain.seal_address(&record.link, &record.base_pub_key) {
            Ok(address) => {
                record.address = Some(address);
                record.state = SealState::Unsealed;
            }
            Err(e) => warn!("Could not resolve seal address for {}: {}", record.link, e),
        }

        let record = self.insert_or_existing(record).await?;
        info!("Created seal for {} ({})", record.link, record.kind());
        Ok(record)
    }

    /// Register a counterparty's object whose seal we only observe
    pub async fn watch(&self, request: WatchSeal) -> Result<SealRecord> {
        if let Some(existing) = self.seals.get_seal(&request.link).await? {
            debug!("Seal for {} already exists ({})", request.link, existing.kind());
            return Ok(existing);
        }

        let address = self.blockchain.seal_address(&request.link, &request.key)?;
        let mut record = self.new_record(request.link.clone(), request.link, request.key, SealIntent::Watch);
        record.address = Some(address);
        record.state = SealState::Watched;

        let record = self.insert_or_existing(record).await?;
        info!("Watching seal for {}", record.link);
        Ok(record)
    }

    pub async fn get(&self, link: &str) -> Result<Option<SealRecord>> {
        self.seals.get_seal(link).await
    }

    pub async fn get_pending(&self) -> Result<Vec<SealRecord>> {
        self.seals.list_seals(&[SealStateKind::Pending]).await
    }

    pub async fn get_unsealed(&self) -> Result<Vec<SealRecord>> {
        self.seals.list_seals(&[SealStateKind::Unsealed]).await
    }

    /// Records that are on chain (or watched) but not yet confirmed
    pub async fn get_unconfirmed(&self) -> Result<Vec<SealRecord>> {
        self.seals
            .list_seals(&[
                SealStateKind::Sealed,
                SealStateKind::Watched,
                SealStateKind::Unconfirmed,
            ])
            .await
    }

    /// Resolve pending addresses, then submit every unsealed record
    ///
    /// Each record is submitted on its own so one failure does not hold back
    /// the rest; a failed record stays `Unsealed` for the next run.
    pub async fn seal_pending(&self) -> Result<SealReport> {
        let mut report = SealReport::default();

        for mut record in self.get_pending().await? {
            match self.blockchain.seal_address(&record.link, &record.base_pub_key) {
                Ok(address) => {
                    record.resolve_address(address, self.clock.now_ms())?;
                    self.seals.put_seal(&record).await?;
                    report.resolved += 1;
                }
                Err(e) => warn!("Seal address for {} still unresolved: {}", record.link, e),
            }
        }

        for mut record in self.get_unsealed().await? {
            let Some(address) = record.address.clone() else {
                warn!("Unsealed record {} has no address, skipping", record.link);
                report.failed += 1;
                continue;
            };

            match self.blockchain.seal(&[address]).await {
                Ok(receipt) => {
                    record.mark_sealed(receipt.tx_id, self.clock.now_ms())?;
                    self.seals.put_seal(&record).await?;
                    info!("Sealed {} in tx {}", record.link, record.state.tx_id().unwrap_or_default());
                    report.sealed += 1;
                }
                Err(e) => {
                    warn!("Failed to seal {}: {}", record.link, e);
                    report.failed += 1;
                }
            }
        }

        Ok(report)
    }

    /// Read confirmations for every unconfirmed record and advance them
    pub async fn sync_unconfirmed(&self) -> Result<SyncReport> {
        let records = self.get_unconfirmed().await?;
        let mut report = SyncReport {
            checked: records.len(),
            ..Default::default()
        };
        if records.is_empty() {
            return Ok(report);
        }

        let addresses: Vec<String> = records.iter().filter_map(|r| r.address.clone()).collect();
        let txs = match self.blockchain.get_txs_for_addresses(&addresses).await {
            Ok(txs) => txs,
            Err(e) => {
                warn!("Failed to read confirmations for {} address(es): {}", addresses.len(), e);
                report.read_failed = true;
                return Ok(report);
            }
        };
        let best = best_tx_per_address(&txs);

        let now = self.clock.now_ms();
        let mut updates = Vec::new();
        for mut record in records {
            let Some(tx) = record.address.as_ref().and_then(|a| best.get(a.as_str())) else {
                continue;
            };
            if !record.observe(tx.tx_id.clone(), tx.confirmations, self.required_confirmations, now)? {
                continue;
            }

            if record.is_confirmed() {
                // on failure the record stays unconfirmed and the write-back is retried next run
                if let Err(e) = self.attach_seal_metadata(&record).await {
                    warn!("Failed to write seal metadata for {}: {}", record.link, e);
                    continue;
                }
                info!("Seal for {} confirmed ({} confirmations)", record.link, record.confirmations());
                report.confirmed += 1;
            }
            updates.push(record);
        }

        report.updated = updates.len();
        if !updates.is_empty() {
            self.seals.put_seals(&updates).await?;
        }
        Ok(report)
    }

    async fn attach_seal_metadata(&self, record: &SealRecord) -> Result<()> {
        let Some(mut object) = self.objects.get_object(&record.link).await? else {
            debug!("No stored object for {}, skipping seal metadata", record.link);
            return Ok(());
        };
        let Value::Object(fields) = &mut object else {
            return Err(AnchorError::Codec(format!("object {} is not a JSON object", record.link)));
        };
        fields.insert("_seal".to_string(), seal_metadata(record));
        self.objects.put_object(&record.link, object).await
    }

    fn age_exceeds(&self, since: i64, grace_period: Duration, now: i64) -> bool {
        let grace = i64::try_from(grace_period.as_millis()).unwrap_or(i64::MAX);
        now.saturating_sub(since) > grace
    }

    /// Watched records that have not confirmed within `grace_period` of creation
    pub async fn get_failed_reads(&self, grace_period: Duration) -> Result<Vec<SealRecord>> {
        let now = self.clock.now_ms();
        Ok(self
            .seals
            .list_seals(&[SealStateKind::Watched, SealStateKind::Unconfirmed])
            .await?
            .into_iter()
            .filter(|r| r.intent == SealIntent::Watch)
            .filter(|r| self.age_exceeds(r.created_at, grace_period, now))
            .collect())
    }

    /// Our submissions that have not confirmed within `grace_period` of the seal attempt
    pub async fn get_failed_writes(&self, grace_period: Duration) -> Result<Vec<SealRecord>> {
        let now = self.clock.now_ms();
        Ok(self
            .seals
            .list_seals(&[SealStateKind::Sealed, SealStateKind::Unconfirmed])
            .await?
            .into_iter()
            .filter(|r| r.intent == SealIntent::Write)
            .filter(|r| self.age_exceeds(r.sealed_at.unwrap_or(r.created_at), grace_period, now))
            .collect())
    }

    /// Both failure classes, for alerting
    pub async fn get_long_unconfirmed(&self, grace_period: Duration) -> Result<Vec<SealRecord>> {
        let mut records = self.get_failed_reads(grace_period).await?;
        records.extend(self.get_failed_writes(grace_period).await?);
        Ok(records)
    }

    /// Abandon failed reads and requeue failed writes, one batched write each
    pub async fn handle_failures(&self, grace_period: Duration) -> Result<FailureReport> {
        let now = self.clock.now_ms();

        let mut unwatched = self.get_failed_reads(grace_period).await?;
        for record in &mut unwatched {
            record.unwatch(now)?;
        }
        if !unwatched.is_empty() {
            self.seals.put_seals(&unwatched).await?;
            warn!("Gave up on {} watched seal(s)", unwatched.len());
        }

        let mut resealed = self.get_failed_writes(grace_period).await?;
        for record in &mut resealed {
            record.reseal(now)?;
        }
        if !resealed.is_empty() {
            self.seals.put_seals(&resealed).await?;
            warn!("Requeued {} unconfirmed seal(s) for resubmission", resealed.len());
        }

        Ok(FailureReport {
            unwatched: unwatched.len(),
            resealed: resealed.len(),
        })
    }
}

/// Highest-confirmation transaction paying to each address
fn best_tx_per_address(txs: &[ChainTx]) -> HashMap<&str, &ChainTx> {
    let mut best: HashMap<&str, &ChainTx> = HashMap::new();
    for tx in txs {
        for address in &tx.to.addresses {
            let entry = best.entry(address.as_str()).or_insert(tx);
            if tx.confirmations > entry.confirmations {
                *entry = tx;
            }
        }
    }
    best
}

/// `_seal` metadata written onto a confirmed object
pub fn seal_metadata(record: &SealRecord) -> Value {
    json!({
        "link": record.link,
        "permalink": record.permalink,
        "address": record.address,
        "basePubKey": record.base_pub_key,
        "blockchain": record.blockchain,
        "network": record.network,
        "txId": record.state.tx_id(),
        "confirmations": record.confirmations(),
    })
}
