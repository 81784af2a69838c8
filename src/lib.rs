//! Batch commitment and anchoring.
//!
//! Content links are grouped into Merkle-committed micro-batches, swept into
//! a gapless sequence of sealable batches, and each batch root is anchored
//! on a blockchain and tracked until it is confirmed.

pub mod types; // Batched items, micro-batches, sealable batches and resources.
pub mod error; // Error type shared by every module.
pub mod clock; // Injectable wall clock.
pub mod commitment; // Merkle roots and micro-batch storage keys.
pub mod storage; // Blob, batch record, seal record and object stores.
pub mod batch; // Micro-batching, sweeps and the scheduled loop.
pub mod anchoring; // Seal records, the chain adapter and the lifecycle manager.
pub mod api; // JSON-RPC ingest and status endpoint.
pub mod config; // Defines and loads service configuration.

// Re-export commonly used types for easier access.
pub use types::*;
pub use config::Config;
pub use error::{AnchorError, Result};
pub use batch::MerkleBatchAggregator;
pub use anchoring::AnchoringLifecycleManager;
