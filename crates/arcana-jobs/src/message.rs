//! Wire shape of a queued job and its legacy fallback envelope.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::JobError;

/// A message travelling through the queue.
///
/// `action`/`payload` are opaque to the queue itself — the worker's
/// handler interprets them. Everything else is bookkeeping the queue
/// owns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobMessage {
    pub id: String,
    pub jobspec_id: String,
    pub action: String,
    pub payload: Value,
    pub attempts: u32,
    pub max_retries: u32,
    pub enqueued_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_attempt: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl JobMessage {
    /// Builds a freshly enqueued message. `id` is `{jobspec_id}:{now_unix_nano}`.
    pub fn new(jobspec_id: impl Into<String>, action: impl Into<String>, payload: Value, max_retries: u32) -> Self {
        let jobspec_id = jobspec_id.into();
        let now = Utc::now();
        let id = format!("{jobspec_id}:{}", now.timestamp_nanos_opt().unwrap_or_default());
        Self {
            id,
            jobspec_id,
            action: action.into(),
            payload,
            attempts: 0,
            max_retries,
            enqueued_at: now,
            last_attempt: None,
            error: None,
        }
    }

    /// Parses a [`JobMessage`] from raw bytes pulled off the wire.
    pub fn decode(raw: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(raw)
    }

    pub fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Records a dequeue attempt: bumps `attempts` and stamps `last_attempt`.
    pub fn record_attempt(&mut self) {
        self.attempts += 1;
        self.last_attempt = Some(Utc::now());
    }

    pub fn has_retries_remaining(&self) -> bool {
        self.attempts < self.max_retries
    }
}

/// Legacy producer shape, accepted as a fallback when a raw queue entry
/// does not decode as a [`JobMessage`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboxEnvelope {
    pub id: String,
    pub enqueued_at: DateTime<Utc>,
    pub attempt: u32,
}

impl OutboxEnvelope {
    pub fn decode(raw: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(raw)
    }

    /// Synthesizes a [`JobMessage`] from this envelope, carrying the
    /// envelope's bytes as an opaque payload so the handler sees them
    /// unchanged.
    pub fn into_job_message(self, raw_payload: Value, default_max_retries: u32) -> Result<JobMessage, JobError> {
        if self.id.is_empty() {
            return Err(JobError::MalformedMessage("outbox envelope has an empty id".into()));
        }
        let now = Utc::now();
        Ok(JobMessage {
            id: format!("env:{}:{}", self.id, now.timestamp_nanos_opt().unwrap_or_default()),
            jobspec_id: self.id,
            action: "outbox".to_string(),
            payload: raw_payload,
            attempts: self.attempt,
            max_retries: default_max_retries,
            enqueued_at: self.enqueued_at,
            last_attempt: None,
            error: None,
        })
    }
}

/// Attempts to decode a raw queue entry as a [`JobMessage`], falling
/// back to the [`OutboxEnvelope`] shape on failure.
pub fn decode_queue_entry(raw: &[u8], default_max_retries: u32) -> Result<JobMessage, JobError> {
    match JobMessage::decode(raw) {
        Ok(message) => Ok(message),
        Err(message_err) => {
            let value: Value = serde_json::from_slice(raw)
                .map_err(|_| JobError::MalformedMessage(message_err.to_string()))?;
            match serde_json::from_value::<OutboxEnvelope>(value.clone()) {
                Ok(envelope) => envelope.into_job_message(value, default_max_retries),
                Err(envelope_err) => Err(JobError::MalformedMessage(format!(
                    "neither job message ({message_err}) nor outbox envelope ({envelope_err}) decoded"
                ))),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn new_builds_compound_id() {
        let msg = JobMessage::new("spec-1", "rebuild", json!({"k": "v"}), 3);
        assert!(msg.id.starts_with("spec-1:"));
        assert_eq!(msg.attempts, 0);
    }

    #[test]
    fn decode_queue_entry_prefers_job_message_shape() {
        let msg = JobMessage::new("spec-1", "rebuild", json!({}), 3);
        let raw = msg.encode().unwrap();
        let decoded = decode_queue_entry(&raw, 3).unwrap();
        assert_eq!(decoded.id, msg.id);
    }

    #[test]
    fn decode_queue_entry_falls_back_to_outbox_envelope() {
        let raw = br#"{"id":"legacy-1","enqueued_at":"2026-01-01T00:00:00Z","attempt":2}"#;
        let decoded = decode_queue_entry(raw, 3).unwrap();
        assert_eq!(decoded.jobspec_id, "legacy-1");
        assert_eq!(decoded.attempts, 2);
        assert!(decoded.id.starts_with("env:legacy-1:"));
    }

    #[test]
    fn decode_queue_entry_rejects_unrecognized_shape() {
        let raw = br#"{"totally": "unrelated"}"#;
        let result = decode_queue_entry(raw, 3);
        assert!(matches!(result, Err(JobError::MalformedMessage(_))));
    }
}
