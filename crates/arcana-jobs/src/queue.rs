//! `RedisQueue`: the public facade over enqueue/dequeue/complete/fail.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use arcana_resilience::CircuitBreaker;
use serde_json::Value;
use tracing::{debug, instrument};

use crate::error::{JobError, JobResult};
use crate::message::{decode_queue_entry, JobMessage};
use crate::primitives::QueuePrimitives;
use crate::processing::ProcessingTracker;
use crate::redis::RedisKeys;
use crate::retry::{RetryHandler, RetryPolicy};
use crate::stats::StatsCollector;

/// Constructor-injected collaborators wired together into a single
/// queue handle. Every Redis call goes through `breaker`, which
/// classifies failures via [`JobError::counts_as_circuit_failure`].
pub struct RedisQueue<P: QueuePrimitives> {
    primitives: Arc<P>,
    keys: RedisKeys,
    breaker: Arc<CircuitBreaker>,
    retry: RetryHandler<P>,
    processing: ProcessingTracker<P>,
    stats: StatsCollector<P>,
    queue_name: String,
    max_retries: u32,
    brpop_block: Duration,
}

impl<P: QueuePrimitives> RedisQueue<P> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        primitives: Arc<P>,
        breaker: Arc<CircuitBreaker>,
        queue_name: impl Into<String>,
        max_retries: u32,
        retry_delay_base: Duration,
        visibility_timeout: Duration,
        brpop_block: Duration,
        retry_policy: RetryPolicy,
    ) -> Self {
        let queue_name = queue_name.into();
        let keys = RedisKeys::new(queue_name.clone());
        Self {
            retry: RetryHandler::new(primitives.clone(), keys.clone(), retry_policy, retry_delay_base),
            processing: ProcessingTracker::new(primitives.clone(), keys.clone(), visibility_timeout),
            stats: StatsCollector::new(primitives.clone(), keys.clone()),
            primitives,
            keys,
            breaker,
            queue_name,
            max_retries,
            brpop_block,
        }
    }

    async fn guarded<T, F, Fut>(&self, op: F) -> JobResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = JobResult<T>>,
    {
        self.breaker.call_classified(op, JobError::counts_as_circuit_failure).await.map_err(JobError::from)
    }

    #[instrument(skip(self, payload), fields(queue.name = %self.queue_name, jobspec.id = %jobspec_id))]
    pub async fn enqueue(&self, jobspec_id: &str, action: &str, payload: Value) -> JobResult<JobMessage> {
        let message = JobMessage::new(jobspec_id, action, payload, self.max_retries);
        let encoded = message.encode()?;
        let key = self.keys.main();
        self.guarded(|| async { self.primitives.lpush(&key, encoded).await }).await?;
        debug!(job.id = %message.id, "enqueued");
        Ok(message)
    }

    /// Pulls the next message, preferring the main list and falling
    /// back to a due retry. Returns `None` when nothing is ready.
    #[instrument(skip(self), fields(queue.name = %self.queue_name))]
    pub async fn dequeue(&self) -> JobResult<Option<JobMessage>> {
        let key = self.keys.main();
        let timeout = self.brpop_block;
        let raw = self.guarded(|| async { self.primitives.brpop(&key, timeout).await }).await?;

        let mut message = match raw {
            Some(raw) => decode_queue_entry(&raw, self.max_retries)?,
            None => match self.retry.dequeue_retry().await? {
                Some(message) => message,
                None => return Ok(None),
            },
        };

        message.record_attempt();
        self.processing.mark_processing(&message).await?;
        Ok(Some(message))
    }

    pub async fn complete(&self, message: &JobMessage) -> JobResult<()> {
        if let Err(e) = self.processing.mark_completed(&message.id).await {
            debug!(job.id = %message.id, error = %e, "processing key already absent on completion");
        }
        Ok(())
    }

    pub async fn fail(&self, message: JobMessage, error: impl std::fmt::Display) -> JobResult<()> {
        if let Err(e) = self.processing.mark_failed(&message.id).await {
            debug!(job.id = %message.id, error = %e, "processing key already absent on failure");
        }
        self.retry.handle_failure(message, error).await
    }

    /// Reclaims jobs whose visibility timeout elapsed without a
    /// `complete`/`fail` call, feeding each one back through
    /// [`RetryHandler::handle_failure`] exactly like an explicit
    /// failure would — so it either lands in `Q:retry` with a bumped
    /// attempt count or, once retries are exhausted, in `Q:dead`.
    pub async fn recover_stale_jobs(&self) -> JobResult<u64> {
        let stale = self.processing.recover_stale().await?;
        let count = stale.len() as u64;
        for message in stale {
            let job_id = message.id.clone();
            if let Err(e) = self.retry.handle_failure(message, "processing timeout").await {
                debug!(job.id = %job_id, error = %e, "failed to reschedule recovered stale job");
            }
        }
        Ok(count)
    }

    pub async fn get_queue_stats(&self) -> JobResult<HashMap<String, u64>> {
        self.stats.collect(&self.processing).await
    }

    pub async fn close(&self) -> JobResult<()> {
        Ok(())
    }
}

#[cfg(test)]
pub mod test_support {
    use super::*;
    use crate::primitives::FakePrimitives;
    use arcana_resilience::CircuitBreaker;

    pub fn fake_queue(queue_name: &str) -> RedisQueue<FakePrimitives> {
        RedisQueue::new(
            Arc::new(FakePrimitives::new()),
            Arc::new(CircuitBreaker::with_defaults("test-queue")),
            queue_name,
            3,
            Duration::from_millis(10),
            Duration::from_secs(60),
            Duration::from_millis(10),
            RetryPolicy::Linear,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::fake_queue;
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn enqueue_then_dequeue_round_trips() {
        let queue = fake_queue("q");
        let enqueued = queue.enqueue("spec-1", "build", json!({"k": "v"})).await.unwrap();

        let dequeued = queue.dequeue().await.unwrap().unwrap();
        assert_eq!(dequeued.id, enqueued.id);
        assert_eq!(dequeued.attempts, 1);
    }

    #[tokio::test]
    async fn dequeue_with_nothing_pending_returns_none() {
        let queue = fake_queue("q");
        assert!(queue.dequeue().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn complete_clears_processing_entry() {
        let queue = fake_queue("q");
        queue.enqueue("spec-1", "build", json!({})).await.unwrap();
        let message = queue.dequeue().await.unwrap().unwrap();

        queue.complete(&message).await.unwrap();
        let stats = queue.get_queue_stats().await.unwrap();
        assert_eq!(stats["processing"], 0);
    }

    #[tokio::test]
    async fn fail_reschedules_when_retries_remain() {
        let queue = fake_queue("q");
        queue.enqueue("spec-1", "build", json!({})).await.unwrap();
        let message = queue.dequeue().await.unwrap().unwrap();

        queue.fail(message, "boom").await.unwrap();
        let stats = queue.get_queue_stats().await.unwrap();
        assert_eq!(stats["retry"], 1);
        assert_eq!(stats["processing"], 0);
    }

    #[tokio::test]
    async fn recover_stale_jobs_reschedules_message_into_retry_set() {
        let queue = RedisQueue::new(
            Arc::new(crate::primitives::FakePrimitives::new()),
            Arc::new(arcana_resilience::CircuitBreaker::with_defaults("test-queue")),
            "q",
            3,
            Duration::from_millis(10),
            Duration::from_millis(10),
            Duration::from_millis(10),
            RetryPolicy::Linear,
        );
        let enqueued = queue.enqueue("spec-1", "build", json!({})).await.unwrap();
        let dequeued = queue.dequeue().await.unwrap().unwrap();
        assert_eq!(dequeued.attempts, 1);

        tokio::time::sleep(Duration::from_millis(20)).await;

        let recovered = queue.recover_stale_jobs().await.unwrap();
        assert_eq!(recovered, 1);

        let stats = queue.get_queue_stats().await.unwrap();
        assert_eq!(stats["retry"], 1);
        assert_eq!(stats["processing"], 0);

        let requeued = queue.dequeue().await.unwrap().unwrap();
        assert_eq!(requeued.id, enqueued.id);
        assert_eq!(requeued.attempts, 2);
    }
}
