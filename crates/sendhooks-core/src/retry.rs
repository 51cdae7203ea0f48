//! Bounded retries with exponential backoff for one payload.
//!
//! Each payload runs its own sequence:
//!
//! ```text
//! Attempting --ok--------------------------------> Success
//!     |
//!     +--err, retryable, attempts < max--> sleep(delay); delay = next(delay) --> Attempting
//!     |
//!     +--err, attempts == max or non-retryable--> Exhausted
//! ```
//!
//! Attempts within a sequence are strictly sequential. The backoff sleep
//! and the in-flight HTTP call both race the cancellation token, so a
//! shutdown aborts a sequence at its current suspension point.

use crate::config::RetryPolicy;
use crate::event_sink::{EventLevel, EventSink};
use crate::payload::{DeliveryOutcome, DeliveryStatus, WebhookPayload};
use crate::sender::Sender;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// `deliveryError` of a sequence aborted by shutdown.
pub const CANCELLED_ERROR: &str = "delivery cancelled before completion";

/// Drives a [`Sender`] to a terminal [`DeliveryOutcome`].
pub struct RetryEngine {
    sender: Sender,
    policy: RetryPolicy,
    sink: Arc<dyn EventSink>,
}

impl RetryEngine {
    pub fn new(sender: Sender, policy: RetryPolicy, sink: Arc<dyn EventSink>) -> Self {
        Self {
            sender,
            policy,
            sink,
        }
    }

    /// The outcome for a payload that shutdown kept from its first attempt.
    pub fn abandon(&self, payload: &WebhookPayload) -> DeliveryOutcome {
        self.cancelled(payload, Utc::now(), payload.payload_size(), 0)
    }

    /// Run the retry sequence for `payload` until success, exhaustion or
    /// cancellation. Always yields exactly one outcome.
    pub async fn deliver(
        &self,
        payload: &WebhookPayload,
        cancel: &CancellationToken,
    ) -> DeliveryOutcome {
        let created = Utc::now();
        let payload_size = payload.payload_size();
        let backoff = self.policy.backoff();
        let mut delay = self.policy.initial_delay;
        let mut attempts: u32 = 0;

        let last_error = loop {
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    return self.cancelled(payload, created, payload_size, attempts);
                }
                result = self.sender.send(payload) => result,
            };
            attempts += 1;

            let err = match result {
                Ok(()) => {
                    info!(
                        webhook_id = %payload.webhook_id,
                        url = %payload.url,
                        attempts,
                        "Webhook delivered"
                    );
                    return DeliveryOutcome {
                        webhook_id: payload.webhook_id.clone(),
                        url: payload.url.clone(),
                        status: DeliveryStatus::Success,
                        delivery_error: String::new(),
                        created,
                        delivered: Some(Utc::now()),
                        payload_size,
                        number_of_tries: attempts,
                    };
                }
                Err(err) => err,
            };

            self.sink.record(
                EventLevel::Error,
                &format!(
                    "error sending webhook {} (attempt {}/{}): {}",
                    payload.webhook_id, attempts, self.policy.max_attempts, err
                ),
            );

            if !err.is_retryable() || attempts >= self.policy.max_attempts {
                break err.to_string();
            }

            debug!(
                webhook_id = %payload.webhook_id,
                attempt = attempts,
                delay_ms = delay.as_millis() as u64,
                "Backing off before next attempt"
            );

            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    return self.cancelled(payload, created, payload_size, attempts);
                }
                _ = tokio::time::sleep(delay) => {}
            }
            delay = backoff.next(delay);
        };

        self.sink.record(
            EventLevel::Warning,
            &format!(
                "failed to send webhook after {} attempt(s). webhook_id: {}",
                attempts, payload.webhook_id
            ),
        );

        failed_outcome(payload, created, payload_size, attempts, last_error)
    }

    fn cancelled(
        &self,
        payload: &WebhookPayload,
        created: DateTime<Utc>,
        payload_size: usize,
        attempts: u32,
    ) -> DeliveryOutcome {
        self.sink.record(
            EventLevel::Warning,
            &format!(
                "delivery of webhook {} cancelled after {} attempt(s)",
                payload.webhook_id, attempts
            ),
        );
        failed_outcome(
            payload,
            created,
            payload_size,
            attempts,
            CANCELLED_ERROR.to_string(),
        )
    }
}

fn failed_outcome(
    payload: &WebhookPayload,
    created: DateTime<Utc>,
    payload_size: usize,
    attempts: u32,
    error: String,
) -> DeliveryOutcome {
    DeliveryOutcome {
        webhook_id: payload.webhook_id.clone(),
        url: payload.url.clone(),
        status: DeliveryStatus::Failed,
        delivery_error: error,
        created,
        delivered: None,
        payload_size,
        number_of_tries: attempts,
    }
}
