//! Cross-component tests for the delivery pipeline.
//!
//! - `harness.rs`     - MemoryQueue, ScriptedTransport and builders
//! - `retry.rs`       - retry sequence, backoff schedule, cancellation
//! - `backpressure.rs`- non-blocking handoff, drops, acknowledgement
//! - `intake.rs`      - read loop: decode failures, polling, shutdown
//! - `isolation.rs`   - concurrent sequences and the in-flight ceiling
//! - `status.rs`      - status records and end-to-end pipeline runs
//! - `http.rs`        - the reqwest transport against a loopback server

pub(crate) mod harness;
mod intake;
