//! API Module
//!
//! This module handles the JSON-RPC API for submitting resources and
//! querying batches and seal records.

mod server;
pub use server::{router, AppState, Server};
