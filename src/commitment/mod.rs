//! Hash Commitment Module
//!
//! Pure functions shared by the aggregator and the storage layer:
//! - Merkle roots over ordered link lists
//! - Fixed-width batch number encoding and micro-batch storage keys

mod keys;
mod merkle;

pub use keys::{
    decode_batch_number, encode_batch_number, key_for_micro_batch, micro_batch_prefix,
    truncated_hash, BATCH_NUMBER_WIDTH,
};
pub use merkle::{merkle_root, merkle_root_hex};
