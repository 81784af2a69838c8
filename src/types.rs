use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One object eligible for sealing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchedItem {
    pub time: i64,
    pub link: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prevlink: Option<String>,
}

/// Time-windowed group of links, Merkle-committed together
///
/// Stored as one immutable gzipped JSON blob; the field names are the
/// persisted wire names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MicroBatch {
    pub merkle_root: String,
    pub links: Vec<String>,
    pub from_timestamp: i64,
    pub to_timestamp: i64,
}

/// Numbered, gapless aggregation unit that is anchored on-chain
///
/// Every field but `batch_number` is absent when the swept generation held
/// no micro-batches.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SealableBatch {
    pub batch_number: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merkle_root: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_sub_batch: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_sub_batch: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_link: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_timestamp: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_link: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_timestamp: Option<i64>,
}

impl SealableBatch {
    /// Placeholder record for a generation with nothing to sweep
    pub fn empty(batch_number: u64) -> Self {
        Self {
            batch_number,
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.merkle_root.is_none()
    }
}

/// A saved application object as handed over by producers
///
/// Only the underscore-prefixed envelope fields matter to the aggregator; the
/// rest of the body is carried along untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    #[serde(rename = "_time")]
    pub time: i64,
    #[serde(rename = "_link")]
    pub link: String,
    #[serde(rename = "_prevlink", default, skip_serializing_if = "Option::is_none")]
    pub prevlink: Option<String>,
    #[serde(flatten)]
    pub body: Map<String, Value>,
}

impl Resource {
    pub fn new(time: i64, link: impl Into<String>) -> Self {
        Self {
            time,
            link: link.into(),
            prevlink: None,
            body: Map::new(),
        }
    }

    /// Project the envelope into the item the aggregator commits to
    pub fn to_batched_item(&self) -> BatchedItem {
        BatchedItem {
            time: self.time,
            link: self.link.clone(),
            prevlink: self.prevlink.clone(),
        }
    }
}

/// Result of persisting a micro-batch built from pooled resources
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MicroBatchReceipt {
    pub batch: MicroBatch,
    pub number: u64,
    pub key: String,
    /// Set when the generation this batch was filed under has already been
    /// swept, so it will not appear in that sealable batch
    pub late: bool,
}
