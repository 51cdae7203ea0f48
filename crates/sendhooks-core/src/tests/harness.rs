//! Test harness for pipeline tests.
//!
//! Provides:
//! - MemoryQueue: an in-memory broker stream with ack and publish logs
//! - ScriptedTransport: an HTTP transport answering from per-host scripts
//! - helpers to build payloads and retry engines

use crate::config::RetryPolicy;
use crate::error::{QueueError, QueueResult, SendError};
use crate::event_sink::EventSink;
use crate::payload::{DeliveryOutcome, WebhookPayload};
use crate::queue::{Queue, QueueEntry};
use crate::retry::RetryEngine;
use crate::sender::{HttpTransport, Sender, TransportResponse, WebhookRequest};
use async_trait::async_trait;
use reqwest::header::HeaderMap;
use serde_json::json;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// In-memory broker stream.
#[derive(Default)]
pub struct MemoryQueue {
    pending: Mutex<VecDeque<QueueEntry>>,
    acked: Mutex<Vec<String>>,
    published: Mutex<Vec<(String, String)>>,
    next_id: AtomicU64,
    fail_next_read: Mutex<Option<String>>,
    fail_acks: AtomicBool,
    fail_publish: AtomicBool,
    cancel_when_drained: Mutex<Option<CancellationToken>>,
}

#[allow(dead_code)]
impl MemoryQueue {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Append a webhook document (XADD) and return its entry id.
    pub fn push_payload(&self, url: &str, webhook_id: &str) -> String {
        let doc = json!({
            "url": url,
            "webhookId": webhook_id,
            "data": {"webhook": webhook_id},
        });
        self.push_raw(Some(doc.to_string()))
    }

    /// Append an entry with arbitrary `data`.
    pub fn push_raw(&self, data: Option<String>) -> String {
        let id = format!("{}-0", self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        self.pending.lock().unwrap().push_back(QueueEntry {
            entry_id: id.clone(),
            data,
        });
        id
    }

    pub fn fail_next_read(&self, reason: &str) {
        *self.fail_next_read.lock().unwrap() = Some(reason.to_string());
    }

    pub fn fail_acks(&self) {
        self.fail_acks.store(true, Ordering::SeqCst);
    }

    pub fn fail_publish(&self) {
        self.fail_publish.store(true, Ordering::SeqCst);
    }

    /// Cancel `token` the first time a read finds the stream empty.
    pub fn cancel_when_drained(&self, token: CancellationToken) {
        *self.cancel_when_drained.lock().unwrap() = Some(token);
    }

    pub fn pending_len(&self) -> usize {
        self.pending.lock().unwrap().len()
    }

    pub fn acked(&self) -> Vec<String> {
        self.acked.lock().unwrap().clone()
    }

    pub fn published(&self) -> Vec<(String, String)> {
        self.published.lock().unwrap().clone()
    }

    pub fn published_count(&self) -> usize {
        self.published.lock().unwrap().len()
    }

    /// Published records decoded back into outcomes.
    pub fn outcomes(&self) -> Vec<DeliveryOutcome> {
        self.published()
            .iter()
            .map(|(_, record)| serde_json::from_str(record).unwrap())
            .collect()
    }
}

#[async_trait]
impl Queue for MemoryQueue {
    async fn read_next(&self, max_count: usize) -> QueueResult<Vec<QueueEntry>> {
        if let Some(reason) = self.fail_next_read.lock().unwrap().take() {
            return Err(QueueError::Connection(reason));
        }

        let mut pending = self.pending.lock().unwrap();
        let take = max_count.min(pending.len());
        let batch: Vec<QueueEntry> = pending.drain(..take).collect();

        if batch.is_empty() {
            if let Some(token) = self.cancel_when_drained.lock().unwrap().as_ref() {
                token.cancel();
            }
        }
        Ok(batch)
    }

    async fn acknowledge(&self, entry_id: &str) -> QueueResult<()> {
        if self.fail_acks.load(Ordering::SeqCst) {
            return Err(QueueError::Operation(format!("XDEL {entry_id} refused")));
        }
        self.acked.lock().unwrap().push(entry_id.to_string());
        Ok(())
    }

    async fn publish(&self, stream: &str, record: &str) -> QueueResult<()> {
        if self.fail_publish.load(Ordering::SeqCst) {
            return Err(QueueError::Operation("XADD refused".into()));
        }
        self.published
            .lock()
            .unwrap()
            .push((stream.to_string(), record.to_string()));
        Ok(())
    }
}

/// One scripted reply.
#[derive(Debug, Clone)]
#[allow(dead_code)]
pub enum Step {
    /// Answer immediately with this status.
    Respond(u16),
    /// Fail at the transport level.
    Fail(String),
    /// Wait, then answer with this status.
    Hang(Duration, u16),
}

/// A request seen by [`ScriptedTransport`].
#[derive(Debug, Clone)]
#[allow(dead_code)]
pub struct Call {
    pub host: String,
    pub at: Instant,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

/// Transport answering from per-host scripts, falling back to a default.
pub struct ScriptedTransport {
    scripts: Mutex<HashMap<String, VecDeque<Step>>>,
    default: Mutex<Step>,
    calls: Mutex<Vec<Call>>,
}

#[allow(dead_code)]
impl ScriptedTransport {
    pub fn new(default: Step) -> Arc<Self> {
        Arc::new(Self {
            scripts: Mutex::new(HashMap::new()),
            default: Mutex::new(default),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn always(status: u16) -> Arc<Self> {
        Self::new(Step::Respond(status))
    }

    /// Queue steps for requests to `host`, consumed in order.
    pub fn script(&self, host: &str, steps: Vec<Step>) {
        self.scripts
            .lock()
            .unwrap()
            .entry(host.to_string())
            .or_default()
            .extend(steps);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Gaps between consecutive calls.
    pub fn gaps(&self) -> Vec<Duration> {
        let calls = self.calls();
        calls.windows(2).map(|w| w[1].at - w[0].at).collect()
    }
}

#[async_trait]
impl HttpTransport for ScriptedTransport {
    async fn post(&self, request: WebhookRequest) -> Result<TransportResponse, SendError> {
        let host = request.url.host_str().unwrap_or_default().to_string();
        self.calls.lock().unwrap().push(Call {
            host: host.clone(),
            at: Instant::now(),
            headers: request.headers.clone(),
            body: request.body.clone(),
        });

        let step = {
            let scripted = self
                .scripts
                .lock()
                .unwrap()
                .get_mut(&host)
                .and_then(VecDeque::pop_front);
            scripted.unwrap_or_else(|| self.default.lock().unwrap().clone())
        };

        match step {
            Step::Respond(status) => Ok(TransportResponse {
                status,
                body: format!("status {status}"),
            }),
            Step::Fail(reason) => Err(SendError::Transport(reason)),
            Step::Hang(delay, status) => {
                tokio::time::sleep(delay).await;
                Ok(TransportResponse {
                    status,
                    body: String::new(),
                })
            }
        }
    }
}

/// A payload addressed to `http://<host>/hook`.
pub fn payload_for(host: &str, webhook_id: &str) -> WebhookPayload {
    WebhookPayload {
        url: format!("http://{host}/hook"),
        webhook_id: webhook_id.to_string(),
        message_id: format!("{webhook_id}-entry"),
        data: json!({"webhook": webhook_id}),
        secret_hash: String::new(),
        metadata: json!({}),
    }
}

pub fn engine(transport: Arc<ScriptedTransport>, sink: Arc<dyn EventSink>) -> RetryEngine {
    engine_with_policy(transport, RetryPolicy::default(), sink)
}

pub fn engine_with_policy(
    transport: Arc<ScriptedTransport>,
    policy: RetryPolicy,
    sink: Arc<dyn EventSink>,
) -> RetryEngine {
    RetryEngine::new(Sender::new(transport, "X-Secret-Hash"), policy, sink)
}

/// Assert `actual` is `expected` give or take timer granularity.
pub fn assert_close(actual: Duration, expected: Duration) {
    assert!(
        actual >= expected && actual < expected + Duration::from_millis(50),
        "expected ~{expected:?}, got {actual:?}"
    );
}
