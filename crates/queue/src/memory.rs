//! In-process queue used by dry runs and tests.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;

use crate::consumer::{QueueConsumer, QueueHealth, QueueMessage};
use crate::error::QueueError;

#[derive(Default)]
struct State {
    ready: VecDeque<QueueMessage>,
    in_flight: HashMap<String, QueueMessage>,
    acked: Vec<String>,
    next_id: u64,
}

/// A FIFO queue with SQS-like receive/ack semantics.
///
/// Received messages stay in flight until acked. Each poll bumps the
/// receive count.
#[derive(Default)]
pub struct MemoryQueue {
    state: Mutex<State>,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue a body; returns the message id.
    pub fn push(&self, body: impl Into<String>) -> String {
        let mut state = self.lock();
        state.next_id += 1;
        let id = format!("mem-{}", state.next_id);
        state.ready.push_back(QueueMessage {
            id: id.clone(),
            body: body.into(),
            receipt_handle: String::new(),
            timestamp: Utc::now(),
            attempt_count: 0,
        });
        id
    }

    /// Ids of acked messages, in ack order.
    pub fn acked(&self) -> Vec<String> {
        self.lock().acked.clone()
    }

    pub fn pending(&self) -> usize {
        self.lock().ready.len()
    }

    pub fn in_flight(&self) -> usize {
        self.lock().in_flight.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        // A poisoned lock only means a test panicked mid-operation.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl QueueConsumer for MemoryQueue {
    async fn poll_batch(&self, max_messages: u32) -> Result<Vec<QueueMessage>, QueueError> {
        let mut state = self.lock();
        let mut out = Vec::new();
        while out.len() < max_messages as usize {
            let Some(mut msg) = state.ready.pop_front() else {
                break;
            };
            msg.attempt_count += 1;
            msg.receipt_handle = format!("{}#{}", msg.id, msg.attempt_count);
            state.in_flight.insert(msg.receipt_handle.clone(), msg.clone());
            out.push(msg);
        }
        Ok(out)
    }

    async fn ack(&self, receipt_handle: &str) -> Result<(), QueueError> {
        let mut state = self.lock();
        let msg = state
            .in_flight
            .remove(receipt_handle)
            .ok_or_else(|| QueueError::Ack(format!("unknown receipt handle {receipt_handle}")))?;
        state.acked.push(msg.id);
        Ok(())
    }

    async fn health_check(&self) -> Result<QueueHealth, QueueError> {
        Ok(QueueHealth {
            connected: true,
            approximate_message_count: Some(self.pending() as u64),
            provider: "memory".to_string(),
        })
    }
}
