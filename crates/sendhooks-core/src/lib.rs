//! sendhooks-core: the webhook delivery pipeline.
//!
//! Consumes webhook-send requests from a broker stream, POSTs each one to
//! its destination with bounded retries and exponential backoff, and
//! publishes the terminal outcome onto a status stream.
//!
//! # Architecture
//!
//! ```text
//! Queue --> Intake --(bounded channel)--> Dispatcher --> RetryEngine --> Sender --> HTTP
//!   ^                                          |
//!   |____________ StatusReporter <_____________|
//! ```
//!
//! # Guarantees
//!
//! 1. **Never block the broker**: a full intake channel drops the payload
//!    (logged, left unacknowledged) instead of stalling the read loop.
//! 2. **Isolation**: each payload's retry sequence is its own task; a slow
//!    destination cannot delay any other payload.
//! 3. **One outcome per admitted payload**, reported best-effort.
//! 4. **Bounded concurrency**: at most `max_in_flight` sequences run at once.
//!
//! Delivery is at-least-once only with [`AckPolicy::AfterOutcome`]; the
//! default acknowledges at admission and can lose in-flight payloads on a
//! crash.

pub mod backoff;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod event_sink;
pub mod intake;
pub mod payload;
pub mod pipeline;
pub mod queue;
pub mod retry;
pub mod sender;
pub mod status;

#[cfg(test)]
mod tests;

pub use backoff::{next_backoff, BackoffPolicy, INITIAL_BACKOFF, MAX_BACKOFF};
pub use config::{AckPolicy, DeliveryConfig, RetryPolicy, DEFAULT_SECRET_HASH_HEADER};
pub use dispatcher::Dispatcher;
pub use error::{
    CoreError, CoreResult, IntakeError, IntakeResult, QueueError, QueueResult, SendError,
};
pub use event_sink::{EventLevel, EventSink, NullEventSink, RecordingEventSink, TracingEventSink};
pub use intake::{Handoff, IntakePipeline};
pub use payload::{DeliveryOutcome, DeliveryStatus, WebhookPayload};
pub use pipeline::DeliveryPipeline;
pub use queue::{Queue, QueueEntry};
pub use retry::RetryEngine;
pub use sender::{HttpTransport, ReqwestTransport, Sender, TransportResponse, WebhookRequest};
pub use status::StatusReporter;
pub use tokio_util::sync::CancellationToken;
