//! Webhook payloads and delivery outcomes.
//!
//! Both types cross the broker boundary as JSON with camelCase keys.

use crate::error::{IntakeError, IntakeResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One webhook delivery request, decoded from a broker entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookPayload {
    /// Destination endpoint.
    pub url: String,
    /// Logical identifier of the webhook subscription.
    #[serde(default)]
    pub webhook_id: String,
    /// Broker entry id; set from the entry, not from the document.
    #[serde(default)]
    pub message_id: String,
    /// Body to POST, serialized verbatim.
    #[serde(default)]
    pub data: Value,
    /// Signing header value; empty means no header.
    #[serde(default)]
    pub secret_hash: String,
    /// Carried through untouched.
    #[serde(default, rename = "metaData", alias = "metadata")]
    pub metadata: Value,
}

impl WebhookPayload {
    /// Decode the JSON document stored in a broker entry.
    ///
    /// The entry id replaces whatever `messageId` the document carried.
    pub fn decode(entry_id: &str, raw: &str) -> IntakeResult<Self> {
        let mut payload: WebhookPayload =
            serde_json::from_str(raw).map_err(|e| IntakeError::Decode {
                entry_id: entry_id.to_string(),
                reason: e.to_string(),
            })?;

        if payload.url.trim().is_empty() {
            return Err(IntakeError::InvalidPayload {
                entry_id: entry_id.to_string(),
                reason: "url must not be empty".to_string(),
            });
        }

        payload.message_id = entry_id.to_string();
        Ok(payload)
    }

    /// Serialized size of `data` in bytes.
    pub fn payload_size(&self) -> usize {
        serde_json::to_vec(&self.data).map(|b| b.len()).unwrap_or(0)
    }
}

/// Terminal status of a delivery sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    Success,
    Failed,
}

/// Result of processing one [`WebhookPayload`], published on the status stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryOutcome {
    pub webhook_id: String,
    pub url: String,
    pub status: DeliveryStatus,
    /// Last failure reason; empty on success.
    #[serde(default)]
    pub delivery_error: String,
    /// When the retry sequence began.
    pub created: DateTime<Utc>,
    /// When the sequence concluded successfully.
    #[serde(default)]
    pub delivered: Option<DateTime<Utc>>,
    pub payload_size: usize,
    pub number_of_tries: u32,
}

impl DeliveryOutcome {
    pub fn is_success(&self) -> bool {
        self.status == DeliveryStatus::Success
    }
}
