//! Broker capability consumed by intake and status reporting.
//!
//! Adapters (Redis Streams today) implement [`Queue`] and are injected as
//! `Arc<dyn Queue>` when the process is wired. Opening the connection is
//! the adapter's constructor; everything after that goes through this trait.

use crate::error::QueueResult;
use async_trait::async_trait;

/// One pending broker entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueEntry {
    /// Broker-assigned id, opaque to the pipeline.
    pub entry_id: String,
    /// The string-encoded JSON document, if the entry carried one.
    pub data: Option<String>,
}

#[async_trait]
pub trait Queue: Send + Sync {
    /// Read up to `max_count` pending entries.
    ///
    /// An empty batch is the "no new entries" condition; errors are reserved
    /// for broker or connectivity failures.
    async fn read_next(&self, max_count: usize) -> QueueResult<Vec<QueueEntry>>;

    /// Mark an entry as consumed.
    async fn acknowledge(&self, entry_id: &str) -> QueueResult<()>;

    /// Append a serialized record to `stream`.
    async fn publish(&self, stream: &str, record: &str) -> QueueResult<()>;
}
