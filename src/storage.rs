//! TelemetryStore trait and the persisted sample type.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::ups::Snapshot;

pub mod sqlite;

pub use sqlite::SqliteTelemetryStore;

/// A snapshot as stored, with its store-assigned timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub snapshot: Snapshot,
}

#[async_trait]
pub trait TelemetryStore: Send + Sync {
    /// Persist one sample. The store assigns the timestamp when `timestamp` is `None`.
    /// Timestamps are stored with millisecond precision, so the returned sample may differ
    /// from the caller's value below one millisecond.
    async fn append(&self, snapshot: &Snapshot, timestamp: Option<DateTime<Utc>>) -> Result<Sample, StoreError>;

    /// Samples newer than `now - since`, newest first.
    async fn query(&self, since: chrono::Duration) -> Result<Vec<Sample>, StoreError>;

    /// Most recent sample, if any.
    async fn latest(&self) -> Result<Option<Sample>, StoreError>;
}
