//! The long-lived loop that drains a single queue.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use tracing::{debug, error, info, warn, Instrument};

use crate::message::{decode_queue_entry, JobMessage};
use crate::primitives::QueuePrimitives;
use crate::queue::RedisQueue;

/// A handler invoked for every dequeued message. Returning `Err` sends
/// the message through the retry/dead-letter path; `Ok` completes it.
pub type JobHandler = Arc<dyn Fn(JobMessage) -> BoxFuture<'static, Result<(), String>> + Send + Sync>;

/// One worker loop per queue name. Cancellation is cooperative: the
/// loop checks the token between iterations but does not abort an
/// in-flight handler call.
///
/// `queue` is `None` when the advanced-queue handle (retry/dead-letter/
/// processing-tracker wiring) couldn't be constructed at startup — see
/// [`WorkerLoop::new_degraded`]. In that case `run` falls back to a bare
/// BRPOP loop with no retry or dead-letter semantics.
pub struct WorkerLoop<P: QueuePrimitives> {
    queue: Option<Arc<RedisQueue<P>>>,
    primitives: Arc<P>,
    queue_name: String,
    handler: JobHandler,
    recovery_tick: Duration,
    stop: Arc<AtomicBool>,
}

impl<P: QueuePrimitives + 'static> WorkerLoop<P> {
    pub fn new(
        queue: Arc<RedisQueue<P>>,
        primitives: Arc<P>,
        queue_name: impl Into<String>,
        handler: JobHandler,
        recovery_tick: Duration,
    ) -> Self {
        Self {
            queue: Some(queue),
            primitives,
            queue_name: queue_name.into(),
            handler,
            recovery_tick,
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Builds a degraded-mode loop: no `RedisQueue` handle, so messages
    /// are dequeued with a raw BRPOP and handed to the handler directly.
    /// A failing handler just drops the message — there is no retry set
    /// or dead-letter list to fall back on. Used when constructing the
    /// advanced-queue handle failed at startup (e.g. Redis was briefly
    /// unreachable).
    pub fn new_degraded(primitives: Arc<P>, queue_name: impl Into<String>, handler: JobHandler, recovery_tick: Duration) -> Self {
        Self {
            queue: None,
            primitives,
            queue_name: queue_name.into(),
            handler,
            recovery_tick,
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Signals the loop to stop after its current iteration.
    pub fn stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    /// Runs until `stop()` is called. Spawns a concurrent task that
    /// periodically recovers jobs whose visibility timeout elapsed.
    pub async fn run(&self) {
        let Some(queue) = self.queue.clone() else {
            warn!(queue.name = %self.queue_name, "no advanced-queue handle, running degraded BRPOP loop with no retry/dead-letter semantics");
            return self.run_degraded().await;
        };

        let recovery_queue = queue.clone();
        let recovery_stop = self.stop.clone();
        let recovery_tick = self.recovery_tick;
        let recovery_task = tokio::spawn(
            async move {
                while !recovery_stop.load(Ordering::SeqCst) {
                    tokio::time::sleep(recovery_tick).await;
                    match recovery_queue.recover_stale_jobs().await {
                        Ok(0) => {}
                        Ok(n) => info!(recovered = n, "recovered stale jobs"),
                        Err(e) => warn!(error = %e, "stale job recovery failed"),
                    }
                }
            }
            .instrument(tracing::info_span!("stale-job-recovery")),
        );

        info!(queue.name = %self.queue_name, "worker loop started");

        while !self.stop.load(Ordering::SeqCst) {
            match queue.dequeue().await {
                Ok(Some(message)) => self.process(&queue, message).await,
                Ok(None) => {
                    // Nothing pending; a brief direct poll keeps latency
                    // low without busy-looping on an empty queue.
                    let _ = self.primitives.brpop(&self.queue_name, Duration::from_millis(200)).await;
                }
                Err(e) => {
                    error!(error = %e, "dequeue failed, falling back to a direct poll");
                    let _ = self.primitives.brpop(&self.queue_name, Duration::from_millis(500)).await;
                    tokio::time::sleep(Duration::from_millis(500)).await;
                }
            }
        }

        recovery_task.abort();
        info!(queue.name = %self.queue_name, "worker loop stopped");
    }

    /// Degraded loop used when no advanced-queue handle is available:
    /// a bare BRPOP, handler invocation, and nothing else. A failing
    /// handler just drops the message.
    async fn run_degraded(&self) {
        info!(queue.name = %self.queue_name, "degraded worker loop started");

        while !self.stop.load(Ordering::SeqCst) {
            self.process_one_degraded().await;
        }

        info!(queue.name = %self.queue_name, "degraded worker loop stopped");
    }

    /// One BRPOP-and-handle cycle of the degraded loop, split out from
    /// [`WorkerLoop::run_degraded`] so it can be driven directly in tests.
    async fn process_one_degraded(&self) {
        match self.primitives.brpop(&self.queue_name, Duration::from_millis(500)).await {
            Ok(Some(raw)) => match decode_queue_entry(&raw, 0) {
                Ok(message) => {
                    debug!(job.id = %message.id, action = %message.action, "processing message (degraded mode)");
                    if let Err(handler_error) = (self.handler)(message.clone()).await {
                        error!(job.id = %message.id, error = %handler_error, "handler failed in degraded mode, message dropped");
                    }
                }
                Err(e) => warn!(error = %e, "failed to decode message in degraded mode, dropping"),
            },
            Ok(None) => {}
            Err(e) => {
                error!(error = %e, "degraded BRPOP failed");
                tokio::time::sleep(Duration::from_millis(500)).await;
            }
        }
    }

    async fn process(&self, queue: &RedisQueue<P>, message: JobMessage) {
        debug!(job.id = %message.id, action = %message.action, "processing message");
        let result = (self.handler)(message.clone()).await;
        match result {
            Ok(()) => {
                if let Err(e) = queue.complete(&message).await {
                    error!(job.id = %message.id, error = %e, "failed to mark job complete");
                }
            }
            Err(handler_error) => {
                warn!(job.id = %message.id, error = %handler_error, "handler returned an error");
                if let Err(e) = queue.fail(message, handler_error).await {
                    error!(error = %e, "failed to record job failure");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::test_support::fake_queue;
    use serde_json::json;
    use std::sync::atomic::AtomicU32;

    #[tokio::test]
    async fn successful_handler_completes_the_message() {
        let queue = Arc::new(fake_queue("q"));
        queue.enqueue("spec-1", "build", json!({})).await.unwrap();

        let processed = Arc::new(AtomicU32::new(0));
        let processed_clone = processed.clone();
        let handler: JobHandler = Arc::new(move |_msg| {
            processed_clone.fetch_add(1, Ordering::SeqCst);
            Box::pin(async { Ok(()) })
        });

        let dequeued = queue.dequeue().await.unwrap().unwrap();
        let worker = WorkerLoop::new(queue.clone(), Arc::new(crate::primitives::FakePrimitives::new()), "q", handler, Duration::from_secs(300));
        worker.process(&queue, dequeued).await;

        assert_eq!(processed.load(Ordering::SeqCst), 1);
        let stats = queue.get_queue_stats().await.unwrap();
        assert_eq!(stats["processing"], 0);
    }

    #[tokio::test]
    async fn failing_handler_reschedules_the_message() {
        let queue = Arc::new(fake_queue("q"));
        queue.enqueue("spec-1", "build", json!({})).await.unwrap();

        let handler: JobHandler = Arc::new(|_msg| Box::pin(async { Err("boom".to_string()) }));
        let dequeued = queue.dequeue().await.unwrap().unwrap();
        let worker = WorkerLoop::new(queue.clone(), Arc::new(crate::primitives::FakePrimitives::new()), "q", handler, Duration::from_secs(300));
        worker.process(&queue, dequeued).await;

        let stats = queue.get_queue_stats().await.unwrap();
        assert_eq!(stats["retry"], 1);
    }

    #[tokio::test]
    async fn degraded_loop_invokes_handler_for_a_raw_enqueued_message() {
        let primitives = Arc::new(crate::primitives::FakePrimitives::new());
        let message = JobMessage::new("spec-1", "build", json!({}), 3);
        primitives.lpush("q", message.encode().unwrap()).await.unwrap();

        let processed = Arc::new(AtomicU32::new(0));
        let processed_clone = processed.clone();
        let handler: JobHandler = Arc::new(move |_msg| {
            processed_clone.fetch_add(1, Ordering::SeqCst);
            Box::pin(async { Ok(()) })
        });

        let worker = WorkerLoop::new_degraded(primitives.clone(), "q", handler, Duration::from_secs(300));
        worker.process_one_degraded().await;

        assert_eq!(processed.load(Ordering::SeqCst), 1);
    }
}
