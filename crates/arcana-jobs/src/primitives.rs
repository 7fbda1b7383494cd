//! The narrow set of Redis commands the queue is built from, behind a
//! trait so tests can swap in an in-memory fake.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use deadpool_redis::Pool;
use futures::StreamExt;
use redis::AsyncCommands;

use crate::error::JobError;

/// Commands the job queue issues against Redis. Implemented for real by
/// [`RedisPrimitives`] and, in tests, by an in-memory fake.
#[async_trait]
pub trait QueuePrimitives: Send + Sync {
    async fn lpush(&self, key: &str, value: Vec<u8>) -> Result<(), JobError>;
    async fn brpop(&self, key: &str, timeout: Duration) -> Result<Option<Vec<u8>>, JobError>;
    async fn llen(&self, key: &str) -> Result<u64, JobError>;

    async fn zadd(&self, key: &str, member: Vec<u8>, score: f64) -> Result<(), JobError>;
    async fn zrem(&self, key: &str, member: &[u8]) -> Result<u64, JobError>;
    async fn zcard(&self, key: &str) -> Result<u64, JobError>;
    /// Returns up to `count` members scored at or below `max_score`, in ascending score order.
    async fn zrangebyscore(&self, key: &str, max_score: f64, count: u64) -> Result<Vec<Vec<u8>>, JobError>;

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, JobError>;
    async fn setex(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), JobError>;
    async fn del(&self, key: &str) -> Result<u64, JobError>;
    async fn scan(&self, pattern: &str) -> Result<Vec<String>, JobError>;

    /// Reads `LLEN main`, `ZCARD retry`, and `LLEN dead` as a single
    /// pipelined round trip, so a concurrent enqueue/dequeue can't skew
    /// the three counts relative to one another.
    async fn count_snapshot(&self, main_key: &str, retry_key: &str, dead_key: &str) -> Result<(u64, u64, u64), JobError>;
}

/// Production [`QueuePrimitives`] backed by a pooled Redis connection.
pub struct RedisPrimitives {
    pool: Pool,
}

impl RedisPrimitives {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl QueuePrimitives for RedisPrimitives {
    async fn lpush(&self, key: &str, value: Vec<u8>) -> Result<(), JobError> {
        let mut conn = self.pool.get().await?;
        conn.lpush::<_, _, ()>(key, value).await.map_err(JobError::from_redis)
    }

    async fn brpop(&self, key: &str, timeout: Duration) -> Result<Option<Vec<u8>>, JobError> {
        let mut conn = self.pool.get().await?;
        let result: Option<(String, Vec<u8>)> = conn
            .brpop(key, timeout.as_secs_f64())
            .await
            .map_err(JobError::from_redis)?;
        Ok(result.map(|(_, value)| value))
    }

    async fn llen(&self, key: &str) -> Result<u64, JobError> {
        let mut conn = self.pool.get().await?;
        conn.llen(key).await.map_err(JobError::from_redis)
    }

    async fn zadd(&self, key: &str, member: Vec<u8>, score: f64) -> Result<(), JobError> {
        let mut conn = self.pool.get().await?;
        conn.zadd::<_, _, _, ()>(key, member, score).await.map_err(JobError::from_redis)
    }

    async fn zrem(&self, key: &str, member: &[u8]) -> Result<u64, JobError> {
        let mut conn = self.pool.get().await?;
        conn.zrem(key, member).await.map_err(JobError::from_redis)
    }

    async fn zcard(&self, key: &str) -> Result<u64, JobError> {
        let mut conn = self.pool.get().await?;
        conn.zcard(key).await.map_err(JobError::from_redis)
    }

    async fn zrangebyscore(&self, key: &str, max_score: f64, count: u64) -> Result<Vec<Vec<u8>>, JobError> {
        let mut conn = self.pool.get().await?;
        redis::cmd("ZRANGEBYSCORE")
            .arg(key)
            .arg("-inf")
            .arg(max_score)
            .arg("LIMIT")
            .arg(0)
            .arg(count)
            .query_async(&mut *conn)
            .await
            .map_err(JobError::from_redis)
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, JobError> {
        let mut conn = self.pool.get().await?;
        conn.get(key).await.map_err(JobError::from_redis)
    }

    async fn setex(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), JobError> {
        let mut conn = self.pool.get().await?;
        conn.set_ex::<_, _, ()>(key, value, ttl.as_secs().max(1))
            .await
            .map_err(JobError::from_redis)
    }

    async fn del(&self, key: &str) -> Result<u64, JobError> {
        let mut conn = self.pool.get().await?;
        conn.del(key).await.map_err(JobError::from_redis)
    }

    async fn scan(&self, pattern: &str) -> Result<Vec<String>, JobError> {
        let mut conn = self.pool.get().await?;
        let keys: Vec<String> = conn.scan_match(pattern).await.map_err(JobError::from_redis)?.collect().await;
        Ok(keys)
    }

    async fn count_snapshot(&self, main_key: &str, retry_key: &str, dead_key: &str) -> Result<(u64, u64, u64), JobError> {
        let mut conn = self.pool.get().await?;
        redis::pipe()
            .atomic()
            .llen(main_key)
            .zcard(retry_key)
            .llen(dead_key)
            .query_async(&mut *conn)
            .await
            .map_err(JobError::from_redis)
    }
}

/// In-memory [`QueuePrimitives`] for unit tests. Not feature-complete
/// Redis semantics — just enough to exercise queue logic deterministically.
#[cfg(test)]
pub struct FakePrimitives {
    lists: parking_lot::Mutex<HashMap<String, std::collections::VecDeque<Vec<u8>>>>,
    zsets: parking_lot::Mutex<HashMap<String, Vec<(Vec<u8>, f64)>>>,
    strings: parking_lot::Mutex<HashMap<String, Vec<u8>>>,
}

#[cfg(test)]
impl FakePrimitives {
    pub fn new() -> Self {
        Self {
            lists: parking_lot::Mutex::new(HashMap::new()),
            zsets: parking_lot::Mutex::new(HashMap::new()),
            strings: parking_lot::Mutex::new(HashMap::new()),
        }
    }
}

#[cfg(test)]
impl Default for FakePrimitives {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[async_trait]
impl QueuePrimitives for FakePrimitives {
    async fn lpush(&self, key: &str, value: Vec<u8>) -> Result<(), JobError> {
        self.lists.lock().entry(key.to_string()).or_default().push_front(value);
        Ok(())
    }

    async fn brpop(&self, key: &str, _timeout: Duration) -> Result<Option<Vec<u8>>, JobError> {
        Ok(self.lists.lock().entry(key.to_string()).or_default().pop_back())
    }

    async fn llen(&self, key: &str) -> Result<u64, JobError> {
        Ok(self.lists.lock().get(key).map(|l| l.len() as u64).unwrap_or(0))
    }

    async fn zadd(&self, key: &str, member: Vec<u8>, score: f64) -> Result<(), JobError> {
        let mut zsets = self.zsets.lock();
        let set = zsets.entry(key.to_string()).or_default();
        set.retain(|(m, _)| m != &member);
        set.push((member, score));
        Ok(())
    }

    async fn zrem(&self, key: &str, member: &[u8]) -> Result<u64, JobError> {
        let mut zsets = self.zsets.lock();
        let Some(set) = zsets.get_mut(key) else { return Ok(0) };
        let before = set.len();
        set.retain(|(m, _)| m.as_slice() != member);
        Ok((before - set.len()) as u64)
    }

    async fn zcard(&self, key: &str) -> Result<u64, JobError> {
        Ok(self.zsets.lock().get(key).map(|s| s.len() as u64).unwrap_or(0))
    }

    async fn zrangebyscore(&self, key: &str, max_score: f64, count: u64) -> Result<Vec<Vec<u8>>, JobError> {
        let zsets = self.zsets.lock();
        let Some(set) = zsets.get(key) else { return Ok(Vec::new()) };
        let mut matches: Vec<_> = set.iter().filter(|(_, score)| *score <= max_score).cloned().collect();
        matches.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap());
        Ok(matches.into_iter().take(count as usize).map(|(m, _)| m).collect())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, JobError> {
        Ok(self.strings.lock().get(key).cloned())
    }

    async fn setex(&self, key: &str, value: Vec<u8>, _ttl: Duration) -> Result<(), JobError> {
        self.strings.lock().insert(key.to_string(), value);
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<u64, JobError> {
        let removed_string = self.strings.lock().remove(key).is_some();
        let removed_list = self.lists.lock().remove(key).is_some();
        Ok(u64::from(removed_string || removed_list))
    }

    async fn scan(&self, pattern: &str) -> Result<Vec<String>, JobError> {
        let prefix = pattern.trim_end_matches('*');
        Ok(self.strings.lock().keys().filter(|k| k.starts_with(prefix)).cloned().collect())
    }

    async fn count_snapshot(&self, main_key: &str, retry_key: &str, dead_key: &str) -> Result<(u64, u64, u64), JobError> {
        let main = self.llen(main_key).await?;
        let retry = self.zcard(retry_key).await?;
        let dead = self.llen(dead_key).await?;
        Ok((main, retry, dead))
    }
}
