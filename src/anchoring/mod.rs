//! Anchoring Module
//!
//! Tracks every object or batch awaiting an on-chain transaction:
//! - `state`: the seal record and its state machine
//! - `adapter`: the `BlockchainAdapter` seam and seal address derivation
//! - `lifecycle`: submission, confirmation sync and failure recovery
//! - `mock`: an in-memory chain for tests and dry runs

mod adapter;
mod lifecycle;
mod mock;
mod state;


pub use adapter::{derive_seal_address, BlockchainAdapter, ChainTx, SealReceipt, TxRecipients};
pub use lifecycle::{
    seal_metadata, AnchoringLifecycleManager, CreateSeal, FailureReport, SealReport, SyncReport,
    WatchSeal,
};
pub use mock::MockBlockchain;
pub use state::{SealIntent, SealRecord, SealState, SealStateKind};
