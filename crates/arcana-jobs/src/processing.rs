//! Tracks in-flight jobs and recovers ones a worker never finished.
//!
//! Each `mark_processing` call writes a Redis key with a visibility-timeout
//! TTL *and* records the same deadline in an in-memory index. Recovery
//! walks the index rather than relying on Redis TTL semantics (a key
//! whose TTL elapsed is simply gone, so Redis alone can't tell us *which*
//! message expired without a `SCAN`).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use tracing::warn;

use crate::error::JobError;
use crate::message::JobMessage;
use crate::primitives::QueuePrimitives;
use crate::redis::RedisKeys;

pub struct ProcessingTracker<P: QueuePrimitives> {
    primitives: Arc<P>,
    keys: RedisKeys,
    visibility_timeout: Duration,
    deadlines: RwLock<HashMap<String, (Instant, JobMessage)>>,
}

impl<P: QueuePrimitives> ProcessingTracker<P> {
    pub fn new(primitives: Arc<P>, keys: RedisKeys, visibility_timeout: Duration) -> Self {
        Self { primitives, keys, visibility_timeout, deadlines: RwLock::new(HashMap::new()) }
    }

    pub async fn mark_processing(&self, message: &JobMessage) -> Result<(), JobError> {
        let encoded = message.encode()?;
        self.primitives
            .setex(&self.keys.processing(&message.id), encoded, self.visibility_timeout)
            .await?;
        self.deadlines
            .write()
            .insert(message.id.clone(), (Instant::now() + self.visibility_timeout, message.clone()));
        Ok(())
    }

    pub async fn mark_completed(&self, message_id: &str) -> Result<(), JobError> {
        self.primitives.del(&self.keys.processing(message_id)).await?;
        self.deadlines.write().remove(message_id);
        Ok(())
    }

    pub async fn mark_failed(&self, message_id: &str) -> Result<(), JobError> {
        self.mark_completed(message_id).await
    }

    /// Reads and drops index entries whose visibility timeout has
    /// elapsed, reconstructing the message each one was tracking so the
    /// caller can hand it back to [`crate::retry::RetryHandler`]. The
    /// processing key is re-fetched first — the TTL may not actually
    /// have elapsed in Redis yet even though our index deadline has —
    /// and the index's own copy is the fallback once Redis no longer
    /// has it (the common case, since that's the reason a TTL exists).
    pub async fn recover_stale(&self) -> Result<Vec<JobMessage>, JobError> {
        let now = Instant::now();
        let stale: Vec<(String, JobMessage)> = {
            let deadlines = self.deadlines.read();
            deadlines
                .iter()
                .filter(|(_, (deadline, _))| *deadline <= now)
                .map(|(id, (_, message))| (id.clone(), message.clone()))
                .collect()
        };

        if stale.is_empty() {
            return Ok(Vec::new());
        }

        let mut recovered = Vec::with_capacity(stale.len());
        for (id, indexed_message) in &stale {
            let key = self.keys.processing(id);
            let message = match self.primitives.get(&key).await {
                Ok(Some(raw)) => JobMessage::decode(&raw).unwrap_or_else(|e| {
                    warn!(job.id = %id, error = %e, "processing key held an undecodable message, using index copy");
                    indexed_message.clone()
                }),
                Ok(None) => indexed_message.clone(),
                Err(e) => {
                    warn!(job.id = %id, error = %e, "failed to re-fetch processing key, using index copy");
                    indexed_message.clone()
                }
            };

            if let Err(e) = self.primitives.del(&key).await {
                warn!(job.id = %id, error = %e, "failed to clear expired processing key during recovery");
            }
            recovered.push(message);
        }

        let stale_ids: Vec<&String> = stale.iter().map(|(id, _)| id).collect();
        self.deadlines.write().retain(|id, _| !stale_ids.contains(&id));
        warn!(count = recovered.len(), "recovered stale processing jobs");
        Ok(recovered)
    }

    pub fn get_processing_count(&self) -> u64 {
        self.deadlines.read().len() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitives::FakePrimitives;
    use serde_json::json;
    use std::time::Duration as StdDuration;

    fn tracker(visibility_timeout: Duration) -> ProcessingTracker<FakePrimitives> {
        ProcessingTracker::new(Arc::new(FakePrimitives::new()), RedisKeys::new("q"), visibility_timeout)
    }

    #[tokio::test]
    async fn mark_processing_then_completed_clears_index() {
        let t = tracker(Duration::from_secs(60));
        let message = JobMessage::new("spec", "build", json!({}), 3);
        t.mark_processing(&message).await.unwrap();
        assert_eq!(t.get_processing_count(), 1);

        t.mark_completed(&message.id).await.unwrap();
        assert_eq!(t.get_processing_count(), 0);
    }

    #[tokio::test]
    async fn recover_stale_only_claims_expired_entries() {
        let t = tracker(Duration::from_millis(10));
        let message = JobMessage::new("spec", "build", json!({}), 3);
        t.mark_processing(&message).await.unwrap();

        assert!(t.recover_stale().await.unwrap().is_empty());

        tokio::time::sleep(StdDuration::from_millis(20)).await;
        let recovered = t.recover_stale().await.unwrap();
        assert_eq!(recovered.len(), 1);
        assert_eq!(recovered[0].id, message.id);
        assert_eq!(t.get_processing_count(), 0);
    }

    #[tokio::test]
    async fn recover_stale_reconstructs_message_from_processing_key_when_present() {
        let t = tracker(Duration::from_millis(10));
        let message = JobMessage::new("spec", "build", json!({"k": "v"}), 3);
        t.mark_processing(&message).await.unwrap();

        tokio::time::sleep(StdDuration::from_millis(20)).await;
        let recovered = t.recover_stale().await.unwrap();
        assert_eq!(recovered.len(), 1);
        assert_eq!(recovered[0].payload, message.payload);
        assert_eq!(recovered[0].jobspec_id, message.jobspec_id);
    }
}
