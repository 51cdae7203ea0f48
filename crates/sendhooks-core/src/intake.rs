//! Broker read loop feeding the bounded intake channel.
//!
//! The loop favours broker liveness over delivery guarantees: handoff into
//! the channel never blocks. When the channel is full the payload is dropped
//! with a warning and its entry stays unacknowledged in the broker.
//!
//! A payload that cannot be decoded ends the loop with an error. Corrupt
//! entries point at a systemic problem, so the process is expected to exit
//! and be restarted by its supervisor rather than skip silently.

use crate::config::{AckPolicy, DeliveryConfig};
use crate::error::{IntakeError, IntakeResult};
use crate::event_sink::{EventLevel, EventSink};
use crate::payload::WebhookPayload;
use crate::queue::{Queue, QueueEntry};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

/// What happened to a payload offered to the intake channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handoff {
    Admitted,
    Dropped,
}

pub struct IntakePipeline {
    queue: Arc<dyn Queue>,
    sink: Arc<dyn EventSink>,
    batch_size: usize,
    poll_interval: Duration,
    ack_policy: AckPolicy,
}

impl IntakePipeline {
    pub fn new(queue: Arc<dyn Queue>, sink: Arc<dyn EventSink>, config: &DeliveryConfig) -> Self {
        Self {
            queue,
            sink,
            batch_size: config.read_batch_size,
            poll_interval: config.poll_interval,
            ack_policy: config.ack_policy,
        }
    }

    /// Read, decode and hand off entries until `cancel` fires.
    ///
    /// Returns `Ok(())` on cancellation. Broker read failures, decode
    /// failures and a closed channel are returned as errors.
    pub async fn run(
        &self,
        tx: mpsc::Sender<WebhookPayload>,
        cancel: CancellationToken,
    ) -> IntakeResult<()> {
        loop {
            let read = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(()),
                read = self.queue.read_next(self.batch_size) => read,
            };

            let entries = match read {
                Ok(entries) => entries,
                Err(e) => {
                    self.sink.record(
                        EventLevel::Error,
                        &format!("error reading from queue: {e}"),
                    );
                    return Err(e.into());
                }
            };

            if entries.is_empty() {
                trace!("No new entries, polling again");
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Ok(()),
                    _ = tokio::time::sleep(self.poll_interval) => continue,
                }
            }

            debug!(count = entries.len(), "Read entries from queue");

            for entry in entries {
                if cancel.is_cancelled() {
                    return Ok(());
                }
                let payload = self.decode(entry)?;
                match self.handoff(&tx, payload).await {
                    Ok(_) => {}
                    // The dispatcher stopped taking work because of shutdown.
                    Err(IntakeError::ChannelClosed) if cancel.is_cancelled() => return Ok(()),
                    Err(e) => return Err(e),
                }
            }
        }
    }

    /// Decode one entry, recording the failure before returning it.
    pub fn decode(&self, entry: QueueEntry) -> IntakeResult<WebhookPayload> {
        let result = match entry.data.as_deref() {
            Some(raw) => WebhookPayload::decode(&entry.entry_id, raw),
            None => Err(IntakeError::Decode {
                entry_id: entry.entry_id.clone(),
                reason: "expected string for 'data' field".to_string(),
            }),
        };

        if let Err(e) = &result {
            self.sink.record(EventLevel::Error, &e.to_string());
        }
        result
    }

    /// Offer `payload` to the channel without waiting.
    ///
    /// Admitted entries are acknowledged right away under
    /// [`AckPolicy::OnAdmission`]; a failed acknowledgement is logged and
    /// otherwise ignored, since the broker may simply redeliver the entry.
    pub async fn handoff(
        &self,
        tx: &mpsc::Sender<WebhookPayload>,
        payload: WebhookPayload,
    ) -> IntakeResult<Handoff> {
        let message_id = payload.message_id.clone();

        match tx.try_send(payload) {
            Ok(()) => {
                if self.ack_policy == AckPolicy::OnAdmission {
                    if let Err(e) = self.queue.acknowledge(&message_id).await {
                        self.sink.record(
                            EventLevel::Error,
                            &format!("failed to delete message {message_id}: {e}"),
                        );
                    }
                }
                Ok(Handoff::Admitted)
            }
            Err(TrySendError::Full(payload)) => {
                self.sink.record(
                    EventLevel::Warning,
                    &format!(
                        "dropped webhook due to channel overflow. webhook_id: {}",
                        payload.webhook_id
                    ),
                );
                Ok(Handoff::Dropped)
            }
            Err(TrySendError::Closed(_)) => Err(IntakeError::ChannelClosed),
        }
    }
}
