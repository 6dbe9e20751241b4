//! In-process delayed task scheduler.
//!
//! Each scheduled task is a sleeping Tokio task that hands the
//! [`ScheduledTask`] to a channel when its time comes. The worker loop owns
//! the receiving end. Tasks live only as long as the process; pending queue
//! rows are rescheduled by [`BulkQueue::resume`](crate::BulkQueue::resume).

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use catalog_core::{async_trait, StoreError, StoreResult, TaskScheduler};
use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

/// A task whose run time has come.
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduledTask {
    pub action: String,
    pub payload: Value,
}

/// Receiving end of a [`TokioScheduler`].
pub type TaskReceiver = mpsc::UnboundedReceiver<ScheduledTask>;

struct Timer {
    payload_key: String,
    handle: JoinHandle<()>,
}

/// [`TaskScheduler`] backed by Tokio timers.
///
/// Scheduling a task whose action and payload match one that has not fired
/// yet is a no-op, so rescheduling pending work is cheap.
pub struct TokioScheduler {
    sender: mpsc::UnboundedSender<ScheduledTask>,
    timers: Mutex<HashMap<String, Vec<Timer>>>,
}

impl TokioScheduler {
    pub fn new() -> (Self, TaskReceiver) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (
            Self {
                sender,
                timers: Mutex::new(HashMap::new()),
            },
            receiver,
        )
    }

    /// Number of tasks that have not fired yet.
    pub fn pending(&self) -> usize {
        let mut timers = self.lock();
        timers
            .values_mut()
            .map(|list| {
                list.retain(|timer| !timer.handle.is_finished());
                list.len()
            })
            .sum()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Vec<Timer>>> {
        self.timers.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl TaskScheduler for TokioScheduler {
    async fn schedule(&self, action: &str, payload: Value, run_at: DateTime<Utc>) -> StoreResult<()> {
        if self.sender.is_closed() {
            return Err(StoreError::new("task receiver dropped"));
        }

        let payload_key = payload.to_string();
        let mut timers = self.lock();
        let list = timers.entry(action.to_string()).or_default();
        list.retain(|timer| !timer.handle.is_finished());
        if list.iter().any(|timer| timer.payload_key == payload_key) {
            debug!(action, payload = %payload_key, "task already scheduled");
            return Ok(());
        }

        let delay = (run_at - Utc::now()).to_std().unwrap_or(Duration::ZERO);
        let sender = self.sender.clone();
        let task = ScheduledTask {
            action: action.to_string(),
            payload,
        };
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            // A closed channel means the worker stopped; the queue row stays
            // pending and is picked up on the next resume.
            let _ = sender.send(task);
        });

        list.push(Timer {
            payload_key,
            handle,
        });
        Ok(())
    }

    async fn cancel_all(&self, action: &str) -> StoreResult<usize> {
        let Some(list) = self.lock().remove(action) else {
            return Ok(0);
        };

        let mut cancelled = 0;
        for timer in list {
            if !timer.handle.is_finished() {
                timer.handle.abort();
                cancelled += 1;
            }
        }
        debug!(action, cancelled, "scheduled tasks cancelled");
        Ok(cancelled)
    }
}
