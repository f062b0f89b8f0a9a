//! Queue-driven remediation loop.
//!
//! A concurrency permit is reserved for every message before it is
//! received, so a message never waits in flight for a free slot. Each
//! message then runs on its own task and polling resumes as soon as any
//! slot frees up. A message is acked once its violation reaches a terminal
//! outcome, escalations included. Unparseable bodies are acked after
//! logging so they cannot poison the queue.
//!
//! Shutdown is only observed between polls. Received messages always run
//! to completion, and [`RemediationWorker::run`] returns after the last
//! in-flight task has acked.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Notify, OwnedSemaphorePermit, Semaphore};
use tracing::{debug, error, info, warn};

use webacl_queue::{parse_message, QueueConsumer, QueueError, QueueMessage};

use crate::scheduler::RemediationScheduler;

/// SQS receive limit.
pub const MAX_BATCH_SIZE: u32 = 10;

/// Pause after a failed poll before trying again.
const POLL_ERROR_BACKOFF: Duration = Duration::from_secs(5);

/// Pause after an empty poll. Long-polling consumers rarely hit it.
const IDLE_BACKOFF: Duration = Duration::from_secs(1);

pub struct RemediationWorker {
    queue: Arc<dyn QueueConsumer>,
    scheduler: Arc<RemediationScheduler>,
    semaphore: Arc<Semaphore>,
    concurrency: u32,
    batch_size: u32,
}

impl RemediationWorker {
    pub fn new(
        queue: Arc<dyn QueueConsumer>,
        scheduler: Arc<RemediationScheduler>,
        concurrency: usize,
    ) -> Self {
        let concurrency = u32::try_from(concurrency.max(1)).unwrap_or(u32::MAX);
        Self {
            queue,
            scheduler,
            semaphore: Arc::new(Semaphore::new(concurrency as usize)),
            concurrency,
            batch_size: MAX_BATCH_SIZE,
        }
    }

    pub fn with_batch_size(mut self, batch_size: u32) -> Self {
        self.batch_size = batch_size.clamp(1, MAX_BATCH_SIZE);
        self
    }

    /// Poll once for as many messages as there are free slots and start
    /// each on its own task.
    ///
    /// Waits for at least one free slot first. Returns the number of
    /// messages received; use [`drain`](Self::drain) to wait for them.
    pub async fn run_once(&self) -> Result<usize, QueueError> {
        match self.reserve().await {
            Some(permits) => self.dispatch(permits).await,
            None => Ok(0),
        }
    }

    /// Wait until every started message has been acked.
    pub async fn drain(&self) {
        if let Ok(all) = self.semaphore.acquire_many(self.concurrency).await {
            drop(all);
        }
    }

    /// Run until `shutdown` is notified, then drain.
    pub async fn run(&self, shutdown: Arc<Notify>) {
        info!(
            batch_size = self.batch_size,
            concurrency = self.concurrency,
            "Remediation worker started"
        );
        loop {
            let permits = tokio::select! {
                _ = shutdown.notified() => break,
                permits = self.reserve() => permits,
            };
            let Some(permits) = permits else {
                break;
            };

            let pause = match self.dispatch(permits).await {
                Ok(0) => IDLE_BACKOFF,
                Ok(_) => Duration::ZERO,
                Err(e) => {
                    error!(error = %e, "Queue poll failed");
                    POLL_ERROR_BACKOFF
                }
            };
            if !pause.is_zero() {
                tokio::select! {
                    _ = shutdown.notified() => break,
                    _ = tokio::time::sleep(pause) => {}
                }
            }
        }

        info!("Shutdown requested, waiting for in-flight violations");
        self.drain().await;
        info!("Remediation worker stopped");
    }

    /// One permit, waiting if needed, plus whatever else is free up to the
    /// batch size. `None` once the semaphore is closed.
    async fn reserve(&self) -> Option<Vec<OwnedSemaphorePermit>> {
        let first = self.semaphore.clone().acquire_owned().await.ok()?;
        let mut permits = vec![first];
        while permits.len() < self.batch_size as usize {
            match self.semaphore.clone().try_acquire_owned() {
                Ok(permit) => permits.push(permit),
                Err(_) => break,
            }
        }
        Some(permits)
    }

    /// Receive up to `permits.len()` messages and hand each its permit.
    /// Unused permits are released on return.
    async fn dispatch(&self, permits: Vec<OwnedSemaphorePermit>) -> Result<usize, QueueError> {
        let max_messages = u32::try_from(permits.len()).unwrap_or(MAX_BATCH_SIZE);
        let batch = self.queue.poll_batch(max_messages).await?;
        if batch.is_empty() {
            return Ok(0);
        }
        debug!(count = batch.len(), free_slots = permits.len(), "Received violation batch");

        let count = batch.len();
        for (msg, permit) in batch.into_iter().zip(permits) {
            tokio::spawn(process(self.queue.clone(), self.scheduler.clone(), msg, permit));
        }
        Ok(count)
    }
}

async fn process(
    queue: Arc<dyn QueueConsumer>,
    scheduler: Arc<RemediationScheduler>,
    msg: QueueMessage,
    _permit: OwnedSemaphorePermit,
) {
    match parse_message(&msg) {
        Ok(event) => {
            let outcome = scheduler.run(event).await;
            debug!(
                message_id = %msg.id,
                attempts = outcome.attempts,
                escalated = outcome.escalated,
                "Violation settled"
            );
        }
        Err(e) => {
            warn!(message_id = %msg.id, error = %e, "Dropping unparseable violation message");
        }
    }

    if let Err(e) = queue.ack(&msg.receipt_handle).await {
        warn!(message_id = %msg.id, error = %e, "Failed to ack message");
    }
}
