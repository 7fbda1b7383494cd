//! A Redis-backed reliable job queue: at-least-once delivery, linear
//! retry backoff, a dead letter queue, and visibility-timeout-based
//! recovery of jobs a worker never finished.
//!
//! ```text
//! enqueue -> Q (list) -> dequeue -> handler
//!                                     |-> ok: processing key cleared
//!                                     `-> err: Q:retry (zset) -> Q:dead (list)
//! ```
//!
//! `Q:processing:{message.id}` carries a visibility-timeout TTL; an
//! in-memory index tracks the same deadlines so stale jobs can be
//! recovered without scanning Redis.

pub mod config;
pub mod error;
pub mod message;
pub mod primitives;
pub mod processing;
pub mod queue;
pub mod redis;
pub mod retry;
pub mod stats;
pub mod worker;

pub use config::{JobsConfig, QueueConfig, RedisConfig};
pub use error::{JobError, JobResult};
pub use message::{JobMessage, OutboxEnvelope};
pub use primitives::{QueuePrimitives, RedisPrimitives};
pub use processing::ProcessingTracker;
pub use queue::RedisQueue;
pub use redis::{build_pool, create_pool};
pub use retry::{RetryHandler, RetryPolicy};
pub use stats::StatsCollector;
pub use worker::{JobHandler, WorkerLoop};
