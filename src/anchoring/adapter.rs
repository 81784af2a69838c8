//! Blockchain adapter seam
//!
//! Transaction construction, signing and chain wire formats live behind this
//! trait; the lifecycle manager only needs addresses, a transaction id per
//! submission, and confirmation counts.

use crate::error::{AnchorError, Result};
use async_trait::async_trait;
use ethers::types::Address;
use ethers::utils::keccak256;
use serde::{Deserialize, Serialize};

/// Accepted submission
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SealReceipt {
    pub tx_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxRecipients {
    pub addresses: Vec<String>,
}

/// A transaction as seen by a confirmation read
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainTx {
    pub tx_id: String,
    pub confirmations: u64,
    pub to: TxRecipients,
}

#[async_trait]
pub trait BlockchainAdapter: Send + Sync {
    fn blockchain(&self) -> &str;

    fn network(&self) -> &str;

    /// Deterministic seal address for `link` under `base_pub_key`
    fn seal_address(&self, link: &str, base_pub_key: &str) -> Result<String>;

    /// Submit one transaction committing to every address
    async fn seal(&self, addresses: &[String]) -> Result<SealReceipt>;

    /// Transactions paying to any of `addresses`
    async fn get_txs_for_addresses(&self, addresses: &[String]) -> Result<Vec<ChainTx>>;
}

/// Ethereum-style address derived from a hex public key and a link
///
/// `keccak256(pubkey || link)`, last 20 bytes, `0x`-prefixed lowercase hex.
pub fn derive_seal_address(link: &str, base_pub_key: &str) -> Result<String> {
    if link.is_empty() {
        return Err(AnchorError::InvalidInput("empty link".to_string()));
    }
    let key = hex::decode(base_pub_key.trim_start_matches("0x"))
        .map_err(|e| AnchorError::InvalidInput(format!("base public key: {}", e)))?;
    if key.is_empty() {
        return Err(AnchorError::InvalidInput("empty base public key".to_string()));
    }

    let mut preimage = key;
    preimage.extend_from_slice(link.as_bytes());
    let digest = keccak256(preimage);
    Ok(format!("{:#x}", Address::from_slice(&digest[12..])))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_is_deterministic_and_key_scoped() {
        let a = derive_seal_address("aa", "02ab").unwrap();
        assert_eq!(a, derive_seal_address("aa", "0x02ab").unwrap());
        assert_eq!(a.len(), 42);
        assert!(a.starts_with("0x"));

        assert_ne!(a, derive_seal_address("aa", "03ab").unwrap());
        assert_ne!(a, derive_seal_address("bb", "02ab").unwrap());
    }

    #[test]
    fn test_address_rejects_bad_key() {
        assert!(matches!(
            derive_seal_address("aa", "not-hex"),
            Err(AnchorError::InvalidInput(_))
        ));
        assert!(derive_seal_address("aa", "").is_err());
        assert!(derive_seal_address("", "02ab").is_err());
    }
}
