//! Storage key derivation for micro-batches
//!
//! Batch numbers are written as fixed-width, zero-padded decimal so that the
//! blob store's lexicographic key order equals numeric order.

use crate::error::{AnchorError, Result};
use crate::MicroBatch;
use sha2::{Digest, Sha256};

/// Digits in an encoded batch number
pub const BATCH_NUMBER_WIDTH: usize = 20;

/// Hex characters of the link digest kept in a micro-batch key
const TRUNCATED_HASH_LEN: usize = 20;

pub fn encode_batch_number(number: u64) -> String {
    format!("{:0width$}", number, width = BATCH_NUMBER_WIDTH)
}

pub fn decode_batch_number(encoded: &str) -> Result<u64> {
    if encoded.len() != BATCH_NUMBER_WIDTH || !encoded.bytes().all(|b| b.is_ascii_digit()) {
        return Err(AnchorError::InvalidInput(format!(
            "batch number must be {} decimal digits, got {:?}",
            BATCH_NUMBER_WIDTH, encoded
        )));
    }

    encoded
        .parse::<u64>()
        .map_err(|e| AnchorError::InvalidInput(format!("batch number {}: {}", encoded, e)))
}

/// First 20 hex chars of `sha256(concat(links))`
pub fn truncated_hash<S: AsRef<str>>(links: &[S]) -> String {
    let mut hasher = Sha256::new();
    for link in links {
        hasher.update(link.as_ref().as_bytes());
    }
    let mut digest = hex::encode(hasher.finalize());
    digest.truncate(TRUNCATED_HASH_LEN);
    digest
}

/// Listing prefix holding every micro-batch filed under `number`
pub fn micro_batch_prefix(number: u64) -> String {
    format!("{}/", encode_batch_number(number))
}

/// `{number:020}/{fromTimestamp}/{truncatedHash}.json`
pub fn key_for_micro_batch(batch: &MicroBatch, number: u64) -> String {
    format!(
        "{}{}/{}.json",
        micro_batch_prefix(number),
        batch.from_timestamp,
        truncated_hash(&batch.links)
    )
}
