//! Redis connection pool and the job queue's fixed key layout.

use crate::config::RedisConfig;
use crate::error::{JobError, JobResult};
use deadpool_redis::{Config, Pool, Runtime};
use tracing::info;

/// Creates a Redis connection pool and verifies it with a `PING`.
///
/// The `PING` is what lets a caller treat pool creation as the
/// "construct the advanced-queue handle" step of worker startup
/// (§4.C9): a pool that can't prove it's reachable right now should not
/// be handed to `RedisQueue`, which assumes a live connection.
pub async fn create_pool(config: &RedisConfig) -> JobResult<Pool> {
    info!("creating redis connection pool for job queue");

    let pool = build_pool(config)?;
    let mut conn = pool.get().await?;
    redis::cmd("PING").query_async::<String>(&mut *conn).await?;

    info!("redis connection pool created");
    Ok(pool)
}

/// Builds a pool without an up-front `PING`, for the degraded-mode
/// fallback when [`create_pool`] fails: deadpool connects lazily on
/// first checkout, so a worker using this pool can still recover once
/// Redis becomes reachable again.
pub fn build_pool(config: &RedisConfig) -> JobResult<Pool> {
    let cfg = Config::from_url(&config.url);
    cfg.builder()
        .map_err(|e| JobError::Internal(format!("invalid redis config: {e}")))?
        .max_size(config.pool_size)
        .runtime(Runtime::Tokio1)
        .build()
        .map_err(|e| JobError::Internal(format!("failed to build pool: {e}")))
}

/// The queue's four Redis keys, all scoped to a single `queue_name`.
#[derive(Debug, Clone)]
pub struct RedisKeys {
    queue_name: String,
}

impl RedisKeys {
    pub fn new(queue_name: impl Into<String>) -> Self {
        Self { queue_name: queue_name.into() }
    }

    /// Main list (`LPUSH` head, `BRPOP` tail).
    pub fn main(&self) -> String {
        self.queue_name.clone()
    }

    /// Retry sorted set, scored by retry-at unix seconds.
    pub fn retry(&self) -> String {
        format!("{}:retry", self.queue_name)
    }

    /// Dead letter list.
    pub fn dead(&self) -> String {
        format!("{}:dead", self.queue_name)
    }

    /// Processing marker for a single message, with a visibility-timeout TTL.
    pub fn processing(&self, message_id: &str) -> String {
        format!("{}:processing:{}", self.queue_name, message_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_match_the_wire_layout() {
        let keys = RedisKeys::new("rebuilds");
        assert_eq!(keys.main(), "rebuilds");
        assert_eq!(keys.retry(), "rebuilds:retry");
        assert_eq!(keys.dead(), "rebuilds:dead");
        assert_eq!(keys.processing("job-1"), "rebuilds:processing:job-1");
    }
}
