//! Worker fan-out over the intake channel.
//!
//! Every payload gets its own task running the retry engine and then the
//! status reporter, so one slow destination never holds up another. A
//! semaphore caps how many of those tasks run at once; while the cap is
//! reached the dispatcher stops draining the channel, and intake sees a
//! full channel instead of the process opening unbounded connections.

use crate::event_sink::{EventLevel, EventSink};
use crate::payload::WebhookPayload;
use crate::queue::Queue;
use crate::retry::RetryEngine;
use crate::status::StatusReporter;
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

pub struct Dispatcher {
    engine: Arc<RetryEngine>,
    reporter: Arc<StatusReporter>,
    limiter: Arc<Semaphore>,
    /// Set when entries are acknowledged after their outcome is reported.
    acker: Option<Arc<dyn Queue>>,
    sink: Arc<dyn EventSink>,
}

impl Dispatcher {
    pub fn new(
        engine: Arc<RetryEngine>,
        reporter: Arc<StatusReporter>,
        max_in_flight: usize,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            engine,
            reporter,
            limiter: Arc::new(Semaphore::new(max_in_flight.max(1))),
            acker: None,
            sink,
        }
    }

    /// Acknowledge each entry on `queue` once its outcome has been reported.
    pub fn ack_after_outcome(mut self, queue: Arc<dyn Queue>) -> Self {
        self.acker = Some(queue);
        self
    }

    /// Drain `rx` until it closes or `cancel` fires, then wait for every
    /// spawned sequence to finish.
    ///
    /// Payloads admitted but not yet started when `cancel` fires are never
    /// attempted. Each is still accounted for, see [`Dispatcher::abandon`].
    pub async fn run(self, mut rx: mpsc::Receiver<WebhookPayload>, cancel: CancellationToken) {
        let mut tasks = JoinSet::new();
        let mut unstarted = Vec::new();

        loop {
            let payload = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                next = rx.recv() => match next {
                    Some(payload) => payload,
                    None => break,
                },
            };

            let permit = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    unstarted.push(payload);
                    break;
                }
                permit = self.limiter.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => {
                        unstarted.push(payload);
                        break;
                    }
                },
            };

            debug!(
                webhook_id = %payload.webhook_id,
                message_id = %payload.message_id,
                "Dispatching webhook"
            );

            let engine = self.engine.clone();
            let reporter = self.reporter.clone();
            let acker = self.acker.clone();
            let sink = self.sink.clone();
            let cancel = cancel.clone();

            tasks.spawn(async move {
                let _permit = permit;
                let outcome = engine.deliver(&payload, &cancel).await;
                reporter.report(&outcome).await;

                if let Some(queue) = acker {
                    if let Err(e) = queue.acknowledge(&payload.message_id).await {
                        sink.record(
                            EventLevel::Error,
                            &format!("failed to delete message {}: {}", payload.message_id, e),
                        );
                    }
                }
            });

            while let Some(result) = tasks.try_join_next() {
                log_join_failure(result);
            }
        }

        // Refuse further handoffs, then collect whatever is still buffered.
        rx.close();
        while let Some(payload) = rx.recv().await {
            unstarted.push(payload);
        }
        for payload in unstarted {
            self.abandon(payload).await;
        }

        if !tasks.is_empty() {
            info!(in_flight = tasks.len(), "Waiting for in-flight deliveries");
        }
        while let Some(result) = tasks.join_next().await {
            log_join_failure(result);
        }
    }

    /// Account for a payload that shutdown kept from ever being attempted.
    ///
    /// With acknowledgement at admission the entry is already gone from the
    /// broker, so a cancelled outcome is reported. Otherwise the entry stays
    /// unacknowledged for redelivery and only a warning is recorded.
    async fn abandon(&self, payload: WebhookPayload) {
        if self.acker.is_some() {
            self.sink.record(
                EventLevel::Warning,
                &format!(
                    "webhook {} not attempted before shutdown; message {} left in queue",
                    payload.webhook_id, payload.message_id
                ),
            );
            return;
        }
        let outcome = self.engine.abandon(&payload);
        self.reporter.report(&outcome).await;
    }
}

fn log_join_failure(result: Result<(), JoinError>) {
    if let Err(e) = result {
        error!(error = %e, "Delivery task failed");
    }
}
