//! Error types for the delivery pipeline.

use thiserror::Error;

/// Failure of a single delivery attempt.
///
/// The retry engine treats every variant as "attempt failed"; only
/// [`SendError::is_retryable`] decides whether another attempt follows.
#[derive(Error, Debug)]
pub enum SendError {
    /// The payload data could not be serialized to JSON.
    #[error("error marshaling JSON: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The HTTP request could not be built (bad URL, bad header).
    #[error("error during the webhook request preparation: {0}")]
    RequestConstruction(String),

    /// Network, DNS, TLS, timeout or response-body read failure.
    #[error("transport error: {0}")]
    Transport(String),

    /// The destination answered with something other than 200.
    #[error("webhook sending failed with status: {status}, response body: {body}")]
    NonOkStatus { status: u16, body: String },
}

impl SendError {
    /// Whether repeating the attempt could possibly succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SendError::Transport(_) | SendError::NonOkStatus { .. })
    }
}

/// Failure reported by a [`Queue`](crate::queue::Queue) implementation.
#[derive(Error, Debug)]
pub enum QueueError {
    /// Connection to the broker failed or was lost.
    #[error("broker connection error: {0}")]
    Connection(String),

    /// The broker rejected or failed an operation.
    #[error("broker operation failed: {0}")]
    Operation(String),
}

/// Result type for queue operations.
pub type QueueResult<T> = Result<T, QueueError>;

/// Errors that end an intake read loop.
#[derive(Error, Debug)]
pub enum IntakeError {
    /// A broker entry did not contain a decodable payload.
    #[error("error unmarshalling message data for entry {entry_id}: {reason}")]
    Decode { entry_id: String, reason: String },

    /// A broker entry decoded but violates the payload contract.
    #[error("invalid webhook payload in entry {entry_id}: {reason}")]
    InvalidPayload { entry_id: String, reason: String },

    /// Reading from the broker failed.
    #[error(transparent)]
    Queue(#[from] QueueError),

    /// The dispatcher side of the intake channel is gone.
    #[error("intake channel closed")]
    ChannelClosed,
}

/// Result type for intake operations.
pub type IntakeResult<T> = Result<T, IntakeError>;

/// Errors surfaced while wiring or running the pipeline.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Intake loop terminated with an error.
    #[error(transparent)]
    Intake(#[from] IntakeError),

    /// Invalid configuration value.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The HTTP client could not be created.
    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    /// The dispatcher task panicked or was aborted.
    #[error("dispatcher task failed: {0}")]
    Dispatcher(#[from] tokio::task::JoinError),
}

/// Result type for pipeline operations.
pub type CoreResult<T> = Result<T, CoreError>;
