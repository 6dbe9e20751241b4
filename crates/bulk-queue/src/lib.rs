//! Bulk generation for catalog items.
//!
//! [`BulkQueue::enqueue`] accepts a batch against the daily cap and schedules
//! one job per item, spaced to stay under the provider's rate limit. Each
//! job runs [`BulkQueue::process`]: generate, compare with the existing
//! description, then either save or keep the existing text.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use bulk_queue::{BulkQueue, QueueStores, TokioScheduler};
//! use generator::GenerationPipeline;
//! use similarity::CosineComparator;
//!
//! # async fn example(stores: QueueStores, pipeline: Arc<GenerationPipeline>) -> Result<(), bulk_queue::QueueError> {
//! let (scheduler, tasks) = TokioScheduler::new();
//! let queue = Arc::new(BulkQueue::new(
//!     stores,
//!     pipeline,
//!     Arc::new(scheduler),
//!     Arc::new(CosineComparator),
//! ));
//!
//! let report = queue.enqueue(&[101, 102, 103]).await?;
//! println!("{} queued, {} skipped", report.enqueued, report.skipped);
//!
//! // Run jobs for an hour
//! let shutdown = tokio::time::sleep(std::time::Duration::from_secs(3600));
//! queue.run_worker(tasks, shutdown).await;
//! # Ok(())
//! # }
//! ```

mod queue;
mod scheduler;

pub use queue::{
    BulkQueue, CancelReport, EnqueueReport, ProcessOutcome, QueueConfig, QueueError, QueueStatus,
    QueueStores, BATCH_DELAY, DEFAULT_POLL_INTERVAL, DEFAULT_RECENT_JOBS,
    DEFAULT_STATUS_WINDOW_DAYS, PROCESS_ACTION,
};
pub use scheduler::{ScheduledTask, TaskReceiver, TokioScheduler};
