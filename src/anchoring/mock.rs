//! In-memory blockchain used by tests and dry runs
//!
//! Transactions are "mined" only when `mine` is called: a transaction has
//! zero confirmations right after submission and gains one per mined block.

use super::adapter::{derive_seal_address, BlockchainAdapter, ChainTx, SealReceipt, TxRecipients};
use crate::error::{AnchorError, Result};
use async_trait::async_trait;
use ethers::utils::keccak256;
use tokio::sync::RwLock;
use tracing::debug;

struct MockTx {
    tx_id: String,
    addresses: Vec<String>,
    height: u64,
}

#[derive(Default)]
struct MockLedger {
    txs: Vec<MockTx>,
    height: u64,
    fail_seals: bool,
    fail_reads: bool,
    seal_calls: usize,
}

pub struct MockBlockchain {
    blockchain: String,
    network: String,
    ledger: RwLock<MockLedger>,
}

impl MockBlockchain {
    pub fn new(blockchain: impl Into<String>, network: impl Into<String>) -> Self {
        Self {
            blockchain: blockchain.into(),
            network: network.into(),
            ledger: RwLock::new(MockLedger::default()),
        }
    }

    /// Make every following `seal` call fail until reset
    pub async fn set_fail_seals(&self, fail: bool) {
        self.ledger.write().await.fail_seals = fail;
    }

    /// Make every following confirmation read fail until reset
    pub async fn set_fail_reads(&self, fail: bool) {
        self.ledger.write().await.fail_reads = fail;
    }

    pub async fn mine(&self, blocks: u64) {
        self.ledger.write().await.height += blocks;
    }

    /// Number of `seal` calls received, failed ones included
    pub async fn seal_calls(&self) -> usize {
        self.ledger.read().await.seal_calls
    }

    /// Record a transaction submitted by someone else (a counterparty's seal)
    pub async fn publish(&self, addresses: &[String]) -> String {
        let mut ledger = self.ledger.write().await;
        Self::append(&mut ledger, addresses)
    }

    fn append(ledger: &mut MockLedger, addresses: &[String]) -> String {
        let preimage = format!("{}:{}", ledger.txs.len(), addresses.join(","));
        let tx_id = hex::encode(keccak256(preimage.as_bytes()));
        ledger.txs.push(MockTx {
            tx_id: tx_id.clone(),
            addresses: addresses.to_vec(),
            height: ledger.height,
        });
        tx_id
    }
}

#[async_trait]
impl BlockchainAdapter for MockBlockchain {
    fn blockchain(&self) -> &str {
        &self.blockchain
    }

    fn network(&self) -> &str {
        &self.network
    }

    fn seal_address(&self, link: &str, base_pub_key: &str) -> Result<String> {
        derive_seal_address(link, base_pub_key)
    }

    async fn seal(&self, addresses: &[String]) -> Result<SealReceipt> {
        let mut ledger = self.ledger.write().await;
        ledger.seal_calls += 1;
        if ledger.fail_seals {
            return Err(AnchorError::Blockchain("mock seal failure".to_string()));
        }
        let tx_id = Self::append(&mut ledger, addresses);
        debug!("Mock sealed {} address(es) in {}", addresses.len(), tx_id);
        Ok(SealReceipt { tx_id })
    }

    async fn get_txs_for_addresses(&self, addresses: &[String]) -> Result<Vec<ChainTx>> {
        let ledger = self.ledger.read().await;
        if ledger.fail_reads {
            return Err(AnchorError::Blockchain("mock read failure".to_string()));
        }
        Ok(ledger
            .txs
            .iter()
            .filter(|tx| tx.addresses.iter().any(|a| addresses.contains(a)))
            .map(|tx| ChainTx {
                tx_id: tx.tx_id.clone(),
                confirmations: ledger.height - tx.height,
                to: TxRecipients {
                    addresses: tx.addresses.clone(),
                },
            })
            .collect())
    }
}
