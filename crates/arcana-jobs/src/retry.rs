//! Retry scheduling for failed jobs: linear (or exponential) backoff into
//! a scored retry set, falling through to the dead letter queue once
//! retries are exhausted.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::JobError;
use crate::message::JobMessage;
use crate::primitives::QueuePrimitives;
use crate::redis::RedisKeys;

/// Backoff shape used to compute how long a failed job waits before its
/// next attempt. Linear is the default, matching this queue's documented
/// `+1m, +2m, +3m` retry cadence; exponential is available for callers
/// that want a steeper falloff.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RetryPolicy {
    Linear,
    Exponential,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::Linear
    }
}

impl RetryPolicy {
    /// Computes the delay before attempt number `attempt` (1-indexed),
    /// given the configured base delay.
    pub fn delay_for_attempt(&self, attempt: u32, base: Duration) -> Duration {
        let attempt = attempt.max(1);
        match self {
            RetryPolicy::Linear => base * attempt,
            RetryPolicy::Exponential => base * 2u32.saturating_pow(attempt - 1),
        }
    }
}

/// Schedules retries and dead-letters exhausted jobs.
pub struct RetryHandler<P: QueuePrimitives> {
    pub(crate) primitives: Arc<P>,
    pub(crate) keys: RedisKeys,
    policy: RetryPolicy,
    retry_delay_base: Duration,
}

impl<P: QueuePrimitives> RetryHandler<P> {
    pub fn new(primitives: Arc<P>, keys: RedisKeys, policy: RetryPolicy, retry_delay_base: Duration) -> Self {
        Self { primitives, keys, policy, retry_delay_base }
    }

    /// Records `error` on `message` and either schedules a retry (scored
    /// into the retry set by retry-at unix seconds) or dead-letters it
    /// when retries are exhausted.
    pub async fn handle_failure(&self, mut message: JobMessage, error: impl std::fmt::Display) -> Result<(), JobError> {
        message.error = Some(error.to_string());

        if message.has_retries_remaining() {
            let delay = self.policy.delay_for_attempt(message.attempts, self.retry_delay_base);
            let retry_at = (Utc::now() + chrono::Duration::from_std(delay).unwrap_or_default()).timestamp() as f64;
            let encoded = message.encode()?;
            debug!(job.id = %message.id, attempts = message.attempts, delay_secs = delay.as_secs(), "scheduling retry");
            self.primitives.zadd(&self.keys.retry(), encoded, retry_at).await?;
        } else {
            let encoded = message.encode()?;
            info!(job.id = %message.id, attempts = message.attempts, "retries exhausted, moving to dead letter queue");
            self.primitives.lpush(&self.keys.dead(), encoded).await?;
        }
        Ok(())
    }

    /// Claims one due retry, if any. Uses a read-then-remove pattern: a
    /// concurrent worker may win the race to `ZREM` the same member, in
    /// which case this retries the claim once before giving up.
    pub async fn dequeue_retry(&self) -> Result<Option<JobMessage>, JobError> {
        let now = Utc::now().timestamp() as f64;

        for _ in 0..2 {
            let candidates = self.primitives.zrangebyscore(&self.keys.retry(), now, 1).await?;
            let Some(raw) = candidates.into_iter().next() else {
                return Ok(None);
            };
            let removed = self.primitives.zrem(&self.keys.retry(), &raw).await?;
            if removed == 0 {
                continue;
            }
            let message = JobMessage::decode(&raw).map_err(|e| JobError::MalformedMessage(e.to_string()))?;
            return Ok(Some(message));
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitives::FakePrimitives;
    use serde_json::json;

    fn handler(policy: RetryPolicy, base: Duration) -> RetryHandler<FakePrimitives> {
        RetryHandler::new(Arc::new(FakePrimitives::new()), RedisKeys::new("q"), policy, base)
    }

    #[test]
    fn linear_delay_matches_documented_cadence() {
        let policy = RetryPolicy::Linear;
        let base = Duration::from_secs(60);
        assert_eq!(policy.delay_for_attempt(1, base), Duration::from_secs(60));
        assert_eq!(policy.delay_for_attempt(2, base), Duration::from_secs(120));
        assert_eq!(policy.delay_for_attempt(3, base), Duration::from_secs(180));
    }

    #[test]
    fn exponential_delay_doubles() {
        let policy = RetryPolicy::Exponential;
        let base = Duration::from_secs(1);
        assert_eq!(policy.delay_for_attempt(1, base), Duration::from_secs(1));
        assert_eq!(policy.delay_for_attempt(2, base), Duration::from_secs(2));
        assert_eq!(policy.delay_for_attempt(3, base), Duration::from_secs(4));
    }

    #[tokio::test]
    async fn handle_failure_schedules_retry_when_attempts_remain() {
        let h = handler(RetryPolicy::Linear, Duration::from_secs(60));
        let mut message = JobMessage::new("spec", "build", json!({}), 3);
        message.record_attempt();
        h.handle_failure(message, "boom").await.unwrap();
        assert_eq!(h.primitives.zcard("q:retry").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn handle_failure_dead_letters_when_exhausted() {
        let h = handler(RetryPolicy::Linear, Duration::from_secs(60));
        let mut message = JobMessage::new("spec", "build", json!({}), 1);
        message.record_attempt();
        h.handle_failure(message, "boom").await.unwrap();
        assert_eq!(h.primitives.zcard("q:retry").await.unwrap(), 0);
        assert_eq!(h.primitives.llen("q:dead").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn dequeue_retry_returns_none_when_nothing_due() {
        let h = handler(RetryPolicy::Linear, Duration::from_secs(60));
        assert!(h.dequeue_retry().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn dequeue_retry_claims_due_entry() {
        let h = handler(RetryPolicy::Linear, Duration::from_secs(60));
        let message = JobMessage::new("spec", "build", json!({}), 3);
        let encoded = message.encode().unwrap();
        h.primitives.zadd("q:retry", encoded, 0.0).await.unwrap();

        let claimed = h.dequeue_retry().await.unwrap().unwrap();
        assert_eq!(claimed.id, message.id);
        assert_eq!(h.primitives.zcard("q:retry").await.unwrap(), 0);
    }
}
