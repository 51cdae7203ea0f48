//! Publishes delivery outcomes onto the status stream.
//!
//! Best-effort: failures are logged as warnings and never retried, so a
//! broken status stream cannot stall or re-enter delivery.

use crate::event_sink::{EventLevel, EventSink};
use crate::payload::DeliveryOutcome;
use crate::queue::Queue;
use std::sync::Arc;
use tracing::debug;

pub struct StatusReporter {
    queue: Arc<dyn Queue>,
    stream: String,
    sink: Arc<dyn EventSink>,
}

impl StatusReporter {
    pub fn new(queue: Arc<dyn Queue>, stream: impl Into<String>, sink: Arc<dyn EventSink>) -> Self {
        Self {
            queue,
            stream: stream.into(),
            sink,
        }
    }

    /// Serialize and publish `outcome`. Returns whether the publish succeeded.
    pub async fn report(&self, outcome: &DeliveryOutcome) -> bool {
        let record = match serde_json::to_string(outcome) {
            Ok(record) => record,
            Err(e) => {
                self.sink.record(
                    EventLevel::Warning,
                    &format!(
                        "error serializing status update: webhook_id: {}: {}",
                        outcome.webhook_id, e
                    ),
                );
                return false;
            }
        };

        match self.queue.publish(&self.stream, &record).await {
            Ok(()) => {
                debug!(
                    webhook_id = %outcome.webhook_id,
                    stream = %self.stream,
                    success = outcome.is_success(),
                    "Published delivery status"
                );
                true
            }
            Err(e) => {
                self.sink.record(
                    EventLevel::Warning,
                    &format!(
                        "error publishing status update: webhook_id: {}: {}",
                        outcome.webhook_id, e
                    ),
                );
                false
            }
        }
    }
}
