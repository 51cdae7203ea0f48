//! Wires intake, dispatcher, retry engine and status reporter together.

use crate::config::{AckPolicy, DeliveryConfig};
use crate::dispatcher::Dispatcher;
use crate::error::CoreResult;
use crate::event_sink::{EventLevel, EventSink};
use crate::intake::IntakePipeline;
use crate::queue::Queue;
use crate::retry::RetryEngine;
use crate::sender::{HttpTransport, Sender};
use crate::status::StatusReporter;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// A complete delivery pipeline over one queue and one HTTP transport.
pub struct DeliveryPipeline {
    config: DeliveryConfig,
    queue: Arc<dyn Queue>,
    transport: Arc<dyn HttpTransport>,
    sink: Arc<dyn EventSink>,
}

impl DeliveryPipeline {
    pub fn new(
        config: DeliveryConfig,
        queue: Arc<dyn Queue>,
        transport: Arc<dyn HttpTransport>,
        sink: Arc<dyn EventSink>,
    ) -> CoreResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            queue,
            transport,
            sink,
        })
    }

    /// Run until `cancel` fires or intake fails.
    ///
    /// Intake runs on the calling task; the dispatcher runs on its own.
    /// When intake returns, the channel closes and in-flight deliveries are
    /// awaited before the intake result is handed back.
    pub async fn run(self, cancel: CancellationToken) -> CoreResult<()> {
        let (tx, rx) = mpsc::channel(self.config.channel_capacity);

        let sender = Sender::new(
            self.transport.clone(),
            self.config.secret_hash_header().to_string(),
        );
        let engine = Arc::new(RetryEngine::new(sender, self.config.retry, self.sink.clone()));
        let reporter = Arc::new(StatusReporter::new(
            self.queue.clone(),
            self.config.status_stream.clone(),
            self.sink.clone(),
        ));

        let mut dispatcher = Dispatcher::new(
            engine,
            reporter,
            self.config.max_in_flight,
            self.sink.clone(),
        );
        if self.config.ack_policy == AckPolicy::AfterOutcome {
            dispatcher = dispatcher.ack_after_outcome(self.queue.clone());
        }

        let dispatcher = tokio::spawn(dispatcher.run(rx, cancel.clone()));
        let intake = IntakePipeline::new(self.queue.clone(), self.sink.clone(), &self.config);

        info!(
            status_stream = %self.config.status_stream,
            channel_capacity = self.config.channel_capacity,
            max_in_flight = self.config.max_in_flight,
            ack_policy = ?self.config.ack_policy,
            "Delivery pipeline started"
        );

        let result = intake.run(tx, cancel.clone()).await;
        if let Err(e) = &result {
            self.sink.record(EventLevel::Error, &format!("intake stopped: {e}"));
        }

        // `tx` was moved into intake and is dropped by now, closing the channel.
        dispatcher.await?;
        info!("Delivery pipeline stopped");

        result.map_err(Into::into)
    }
}
