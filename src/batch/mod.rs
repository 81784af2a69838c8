//! Batch Module
//!
//! This module handles micro-batching and sealable batch creation:
//! - MerkleBatchAggregator: Builds micro-batches and sweeps them into gapless sealable batches
//! - ResourcePool: Buffers resources between scheduled ticks
//! - Orchestrator: Scheduled loop tying batching and anchoring together

mod aggregator;
mod pool;
pub mod orchestrator;


pub use aggregator::{MerkleBatchAggregator, MIN_SAFETY_BUFFER};
pub use orchestrator::{Orchestrator, TickReport};
pub use pool::ResourcePool;
