//! Queue depth reporting: main list, retry set, dead letter list, and
//! in-flight count.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::JobError;
use crate::primitives::QueuePrimitives;
use crate::processing::ProcessingTracker;
use crate::redis::RedisKeys;

pub struct StatsCollector<P: QueuePrimitives> {
    primitives: Arc<P>,
    keys: RedisKeys,
}

impl<P: QueuePrimitives> StatsCollector<P> {
    pub fn new(primitives: Arc<P>, keys: RedisKeys) -> Self {
        Self { primitives, keys }
    }

    /// Returns `{main, retry, dead, processing}` counts. The three Redis
    /// counts are read as a single pipelined batch so a concurrent
    /// enqueue/dequeue can't skew them relative to one another. Any
    /// failed command surfaces as [`JobError::StatsUnavailable`].
    pub async fn collect(&self, processing: &ProcessingTracker<P>) -> Result<HashMap<String, u64>, JobError> {
        let (main, retry, dead) = self
            .primitives
            .count_snapshot(&self.keys.main(), &self.keys.retry(), &self.keys.dead())
            .await
            .map_err(|e| JobError::StatsUnavailable(e.to_string()))?;

        let mut stats = HashMap::with_capacity(4);
        stats.insert("main".to_string(), main);
        stats.insert("retry".to_string(), retry);
        stats.insert("dead".to_string(), dead);
        stats.insert("processing".to_string(), processing.get_processing_count());
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::JobMessage;
    use crate::primitives::FakePrimitives;
    use std::time::Duration;
    use serde_json::json;

    #[tokio::test]
    async fn collect_reports_all_four_counts() {
        let primitives = Arc::new(FakePrimitives::new());
        let keys = RedisKeys::new("q");
        let stats = StatsCollector::new(primitives.clone(), keys.clone());
        let processing = ProcessingTracker::new(primitives.clone(), keys, Duration::from_secs(60));

        primitives.lpush("q", b"x".to_vec()).await.unwrap();
        primitives.zadd("q:retry", b"y".to_vec(), 0.0).await.unwrap();
        primitives.lpush("q:dead", b"z".to_vec()).await.unwrap();
        let message = JobMessage::new("spec", "build", json!({}), 3);
        processing.mark_processing(&message).await.unwrap();

        let result = stats.collect(&processing).await.unwrap();
        assert_eq!(result["main"], 1);
        assert_eq!(result["retry"], 1);
        assert_eq!(result["dead"], 1);
        assert_eq!(result["processing"], 1);
    }
}
