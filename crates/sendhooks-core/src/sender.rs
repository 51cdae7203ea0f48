//! Single-attempt webhook delivery over HTTP.

use crate::error::{CoreResult, SendError};
use crate::payload::WebhookPayload;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

/// Longest response body kept for diagnostics.
pub const MAX_DIAGNOSTIC_BODY_BYTES: usize = 4096;

/// A fully constructed webhook POST.
#[derive(Debug, Clone)]
pub struct WebhookRequest {
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

/// Status and body of a completed HTTP exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    pub status: u16,
    pub body: String,
}

/// HTTP capability used by [`Sender`].
///
/// Implementations must be safe to share across every in-flight delivery.
/// Any failure to complete the exchange, including reading the body, is
/// reported as [`SendError::Transport`].
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn post(&self, request: WebhookRequest) -> Result<TransportResponse, SendError>;
}

/// [`HttpTransport`] over one pooled `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new(timeout: Duration) -> CoreResult<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn post(&self, request: WebhookRequest) -> Result<TransportResponse, SendError> {
        let mut response = self
            .client
            .post(request.url)
            .headers(request.headers)
            .body(request.body)
            .send()
            .await
            .map_err(|e| SendError::Transport(e.to_string()))?;

        let status = response.status().as_u16();
        // Stop once the diagnostic limit is reached; the rest is never read.
        let mut bytes = Vec::new();
        while bytes.len() < MAX_DIAGNOSTIC_BODY_BYTES {
            match response.chunk().await {
                Ok(Some(chunk)) => bytes.extend_from_slice(&chunk),
                Ok(None) => break,
                Err(e) => {
                    return Err(SendError::Transport(format!(
                        "error reading response body: {e}"
                    )))
                }
            }
        }
        bytes.truncate(MAX_DIAGNOSTIC_BODY_BYTES);
        let body = String::from_utf8_lossy(&bytes).into_owned();

        Ok(TransportResponse { status, body })
    }
}

/// Performs one delivery attempt for a payload.
#[derive(Clone)]
pub struct Sender {
    transport: Arc<dyn HttpTransport>,
    secret_hash_header: String,
}

impl Sender {
    pub fn new(transport: Arc<dyn HttpTransport>, secret_hash_header: impl Into<String>) -> Self {
        Self {
            transport,
            secret_hash_header: secret_hash_header.into(),
        }
    }

    /// Serialize the payload data and build the POST request.
    pub fn build_request(&self, payload: &WebhookPayload) -> Result<WebhookRequest, SendError> {
        let body = serde_json::to_vec(&payload.data)?;

        let url = Url::parse(&payload.url)
            .map_err(|e| SendError::RequestConstruction(format!("invalid url {:?}: {e}", payload.url)))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(SendError::RequestConstruction(format!(
                "unsupported url scheme: {}",
                url.scheme()
            )));
        }

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        if !payload.secret_hash.is_empty() {
            let name = HeaderName::from_bytes(self.secret_hash_header.as_bytes()).map_err(|e| {
                SendError::RequestConstruction(format!(
                    "invalid signing header name {:?}: {e}",
                    self.secret_hash_header
                ))
            })?;
            let value = HeaderValue::from_str(&payload.secret_hash).map_err(|e| {
                SendError::RequestConstruction(format!("invalid signing header value: {e}"))
            })?;
            headers.insert(name, value);
        }

        Ok(WebhookRequest { url, headers, body })
    }

    /// Deliver once. Only an HTTP 200 counts as success.
    pub async fn send(&self, payload: &WebhookPayload) -> Result<(), SendError> {
        let request = self.build_request(payload)?;

        debug!(
            webhook_id = %payload.webhook_id,
            url = %request.url,
            body_len = request.body.len(),
            "Sending webhook"
        );

        let response = self.transport.post(request).await?;
        if response.status == 200 {
            return Ok(());
        }

        let body = truncate_body(response.body);
        warn!(
            webhook_id = %payload.webhook_id,
            status = response.status,
            body = %body,
            "Webhook destination rejected delivery"
        );
        Err(SendError::NonOkStatus {
            status: response.status,
            body,
        })
    }
}

fn truncate_body(mut body: String) -> String {
    if body.len() <= MAX_DIAGNOSTIC_BODY_BYTES {
        return body;
    }
    let mut cut = MAX_DIAGNOSTIC_BODY_BYTES;
    while !body.is_char_boundary(cut) {
        cut -= 1;
    }
    body.truncate(cut);
    body
}
