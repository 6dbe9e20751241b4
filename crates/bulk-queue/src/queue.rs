//! Bulk generation queue.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use catalog_core::{
    AuditEvent, AuditAction, AuditSink, CatalogItem, CatalogStore, ConfigStore, ItemId,
    ItemStateUpdate, JobStatus, JobTransition, Mode, QueueJob, QueueStore, QueueTotals, Settings,
    SimilarityVerdict, StoreError, TaskScheduler, Zone,
};
use chrono::Utc;
use generator::{AuditRecorder, GenerationPipeline};
use serde::{Deserialize, Serialize};
use serde_json::json;
use similarity::Comparator;
use thiserror::Error;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::scheduler::{ScheduledTask, TaskReceiver};

/// Scheduler action name for single-item jobs.
pub const PROCESS_ACTION: &str = "describer_process_item";

/// Spacing between consecutive jobs of a batch, sized for ~30 requests per minute.
pub const BATCH_DELAY: Duration = Duration::from_secs(3);

pub const DEFAULT_STATUS_WINDOW_DAYS: u32 = 7;
pub const DEFAULT_RECENT_JOBS: u32 = 20;

/// How often the worker looks for pending rows without a timer.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(60);

/// Errors from queue orchestration.
#[derive(Debug, Error)]
pub enum QueueError {
    /// Nothing can be queued until tomorrow.
    #[error("daily limit reached ({limit}), try again tomorrow")]
    DailyLimitReached { limit: u32 },

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// The catalog holds the new content but the row or audit write failed.
    #[error("content saved, bookkeeping failed: {0}")]
    AfterSave(StoreError),

    /// A scheduled task carried a payload this queue does not understand.
    #[error("invalid task payload: {0}")]
    InvalidPayload(String),
}

/// Timing and reporting knobs.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    pub batch_delay: Duration,
    pub status_window_days: u32,
    pub recent_jobs: u32,
    pub poll_interval: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            batch_delay: BATCH_DELAY,
            status_window_days: DEFAULT_STATUS_WINDOW_DAYS,
            recent_jobs: DEFAULT_RECENT_JOBS,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

/// The stores a queue works against.
#[derive(Clone)]
pub struct QueueStores {
    pub catalog: Arc<dyn CatalogStore>,
    pub config: Arc<dyn ConfigStore>,
    pub jobs: Arc<dyn QueueStore>,
    pub audit: Arc<dyn AuditSink>,
}

impl QueueStores {
    /// All four roles served by one store.
    pub fn shared<S>(store: Arc<S>) -> Self
    where
        S: CatalogStore + ConfigStore + QueueStore + AuditSink + 'static,
    {
        Self {
            catalog: store.clone(),
            config: store.clone(),
            jobs: store.clone(),
            audit: store,
        }
    }
}

/// Result of [`BulkQueue::enqueue`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EnqueueReport {
    pub enqueued: usize,
    /// Locked items, items with content while overwrite is off, unknown ids.
    pub skipped: usize,
    /// Ids beyond today's allowance. Not queued and not counted as skipped.
    pub dropped_over_cap: usize,
}

/// What a single job run did.
#[derive(Debug, Clone, PartialEq)]
pub enum ProcessOutcome {
    Complete { model_used: String },
    SkippedSimilarity { percent: u32 },
    Failed(String),
    /// Another run holds the item's processing flag.
    AlreadyRunning,
    /// The row is missing or no longer pending (cancelled, or already run).
    NotPending,
}

/// Result of [`BulkQueue::cancel`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CancelReport {
    pub unscheduled: usize,
    pub cancelled: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueueStatus {
    pub window_days: u32,
    pub totals: QueueTotals,
    pub recent: Vec<QueueJob>,
}

#[derive(Debug, Deserialize)]
struct ProcessPayload {
    item_id: ItemId,
}

/// Daily-capped batch generation with per-item mutual exclusion.
pub struct BulkQueue {
    stores: QueueStores,
    pipeline: Arc<GenerationPipeline>,
    scheduler: Arc<dyn TaskScheduler>,
    comparator: Arc<dyn Comparator>,
    recorder: AuditRecorder,
    config: QueueConfig,
}

impl BulkQueue {
    pub fn new(
        stores: QueueStores,
        pipeline: Arc<GenerationPipeline>,
        scheduler: Arc<dyn TaskScheduler>,
        comparator: Arc<dyn Comparator>,
    ) -> Self {
        let recorder = AuditRecorder::new(stores.catalog.clone(), stores.audit.clone());
        Self {
            stores,
            pipeline,
            scheduler,
            comparator,
            recorder,
            config: QueueConfig::default(),
        }
    }

    pub fn with_config(mut self, config: QueueConfig) -> Self {
        self.config = config;
        self
    }

    /// Queue a batch of items.
    ///
    /// The batch is truncated to what remains of today's cap. Accepted ids
    /// are skipped when locked, unknown, or already described while
    /// overwrite is off. The rest get a pending row and a job staggered by
    /// the batch delay times their position in the batch.
    pub async fn enqueue(&self, item_ids: &[ItemId]) -> Result<EnqueueReport, QueueError> {
        let settings = Settings::new(self.stores.config.as_ref());
        let limit = settings.daily_limit().await?;
        let overwrite = settings.overwrite().await?;
        let queued_today = self.stores.jobs.count_queued_today().await?;

        let allowance = u64::from(limit).saturating_sub(queued_today);
        if allowance == 0 {
            warn!(limit, queued_today, "daily limit reached");
            return Err(QueueError::DailyLimitReached { limit });
        }

        let accepted = item_ids.len().min(allowance as usize);
        let mut report = EnqueueReport {
            dropped_over_cap: item_ids.len() - accepted,
            ..Default::default()
        };

        for (position, &item_id) in item_ids[..accepted].iter().enumerate() {
            let Some(item) = self.stores.catalog.get_item(item_id).await? else {
                debug!(item_id, "unknown item skipped");
                report.skipped += 1;
                continue;
            };
            if item.state.locked || (!overwrite && item.has_existing_description()) {
                report.skipped += 1;
                continue;
            }

            self.stores
                .jobs
                .upsert_pending(item_id, item.state.tier_or_default())
                .await?;
            self.schedule(item_id, position).await?;
            report.enqueued += 1;
        }

        info!(
            enqueued = report.enqueued,
            skipped = report.skipped,
            dropped_over_cap = report.dropped_over_cap,
            "batch queued"
        );
        Ok(report)
    }

    /// Reschedule every pending row, oldest first. Returns how many.
    pub async fn resume(&self) -> Result<usize, QueueError> {
        let pending = self.stores.jobs.pending_items().await?;
        for (position, &item_id) in pending.iter().enumerate() {
            self.schedule(item_id, position).await?;
        }
        if !pending.is_empty() {
            info!(count = pending.len(), "pending jobs scheduled");
        }
        Ok(pending.len())
    }

    async fn schedule(&self, item_id: ItemId, position: usize) -> Result<(), QueueError> {
        let delay = self.config.batch_delay * position as u32;
        let run_at = Utc::now() + chrono::Duration::milliseconds(delay.as_millis() as i64);
        self.scheduler
            .schedule(PROCESS_ACTION, json!({ "item_id": item_id }), run_at)
            .await?;
        Ok(())
    }

    /// Run one item's job.
    ///
    /// Only pending rows run, and only while holding the item's processing
    /// flag. The status is read again once the flag is held, since a
    /// duplicate delivery may have waited out a whole earlier run. The flag
    /// is released on every path out.
    pub async fn process(&self, item_id: ItemId) -> Result<ProcessOutcome, QueueError> {
        if !self.is_pending(item_id).await? {
            debug!(item_id, "job not pending, nothing to do");
            return Ok(ProcessOutcome::NotPending);
        }

        if !self.stores.catalog.try_claim(item_id).await? {
            info!(item_id, "item already being processed");
            return Ok(ProcessOutcome::AlreadyRunning);
        }

        let result = match self.is_pending(item_id).await {
            Ok(true) => self.run_claimed(item_id).await,
            Ok(false) => {
                debug!(item_id, "job finished while waiting for the flag");
                Ok(ProcessOutcome::NotPending)
            }
            Err(err) => Err(err.into()),
        };

        if let Err(err) = &result {
            error!(item_id, error = %err, "job aborted");
            if let Err(mark) = self
                .stores
                .jobs
                .transition(item_id, JobTransition::Failed(err.to_string()))
                .await
            {
                error!(item_id, error = %mark, "could not mark job failed");
            }
        }
        if let Err(err) = self.stores.catalog.release_claim(item_id).await {
            error!(item_id, error = %err, "could not release processing flag");
        }

        result
    }

    async fn is_pending(&self, item_id: ItemId) -> Result<bool, StoreError> {
        Ok(matches!(
            self.stores.jobs.job(item_id).await?,
            Some(job) if job.status == JobStatus::Pending
        ))
    }

    async fn run_claimed(&self, item_id: ItemId) -> Result<ProcessOutcome, QueueError> {
        let jobs = &self.stores.jobs;
        jobs.transition(item_id, JobTransition::Generating).await?;

        let Some(item) = self.stores.catalog.get_item(item_id).await? else {
            let message = "item not found".to_string();
            jobs.transition(item_id, JobTransition::Failed(message.clone()))
                .await?;
            return Ok(ProcessOutcome::Failed(message));
        };

        let tier = item.state.tier_or_default();
        let started = Instant::now();
        let generated = self
            .pipeline
            .generate(&item, Some(tier), Mode::Full)
            .await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        let event = AuditEvent::new(item.id, item.product.title.clone(), AuditAction::Saved)
            .tier(tier)
            .mode(Mode::Full)
            .response_time(elapsed_ms);

        let outcome = match generated {
            Ok(outcome) => outcome,
            Err(err) => {
                let message = err.to_string();
                warn!(item_id, kind = err.kind(), error = %message, "generation failed");
                jobs.transition(item_id, JobTransition::Failed(message.clone()))
                    .await?;
                self.recorder
                    .record(
                        AuditEvent {
                            action: AuditAction::Rejected,
                            ..event
                        }
                        .rejected_because(message.clone()),
                    )
                    .await?;
                return Ok(ProcessOutcome::Failed(message));
            }
        };

        let similarity = self.similarity(&item, outcome.content.long_description.as_deref());
        let event = event
            .model(Some(outcome.model_used.clone()))
            .similarity(&similarity)
            .word_counts(&outcome.content);

        if similarity.zone == Zone::Block {
            let reason = format!(
                "Similariteit te hoog ({}%), bestaande tekst behouden",
                similarity.percent
            );
            info!(item_id, percent = similarity.percent, "existing content kept");
            jobs.transition(item_id, JobTransition::SkippedSimilarity(reason.clone()))
                .await?;
            self.recorder
                .record(
                    AuditEvent {
                        action: AuditAction::BlockedSimilarity,
                        ..event
                    }
                    .reason(reason),
                )
                .await?;
            return Ok(ProcessOutcome::SkippedSimilarity {
                percent: similarity.percent,
            });
        }

        self.stores
            .catalog
            .set_item_content(item_id, &outcome.content)
            .await?;
        self.finish_saved(item_id, &outcome.model_used, event)
            .await
            .map_err(QueueError::AfterSave)?;

        info!(item_id, model = %outcome.model_used, "generated content saved");
        Ok(ProcessOutcome::Complete {
            model_used: outcome.model_used,
        })
    }

    /// Item state, job row and audit entry for content already written.
    async fn finish_saved(
        &self,
        item_id: ItemId,
        model_used: &str,
        event: AuditEvent,
    ) -> Result<(), StoreError> {
        self.stores
            .catalog
            .update_item_state(
                item_id,
                ItemStateUpdate {
                    ai_status: Some("complete".to_string()),
                    ..Default::default()
                },
            )
            .await?;
        self.stores
            .jobs
            .transition(
                item_id,
                JobTransition::Complete {
                    model_used: model_used.to_string(),
                },
            )
            .await?;
        self.recorder.record(event).await?;
        Ok(())
    }

    /// Existing long text against the generated one. Items without a
    /// description are allowed with a score of zero.
    fn similarity(&self, item: &CatalogItem, generated_long: Option<&str>) -> SimilarityVerdict {
        if !item.has_existing_description() {
            return SimilarityVerdict::scored(0.0);
        }
        self.comparator.compare(
            item.existing.long_description.as_deref().unwrap_or_default(),
            generated_long.unwrap_or_default(),
            &item.noise_tokens(),
        )
    }

    /// Drop unfired jobs and cancel every pending row. Running jobs finish.
    pub async fn cancel(&self) -> Result<CancelReport, QueueError> {
        let unscheduled = self.scheduler.cancel_all(PROCESS_ACTION).await?;
        let cancelled = self.stores.jobs.cancel_pending().await?;
        info!(unscheduled, cancelled, "queue cancelled");
        Ok(CancelReport {
            unscheduled,
            cancelled,
        })
    }

    /// Per-status counts over the status window plus the latest rows.
    pub async fn status(&self) -> Result<QueueStatus, QueueError> {
        Ok(QueueStatus {
            window_days: self.config.status_window_days,
            totals: self
                .stores
                .jobs
                .totals(self.config.status_window_days)
                .await?,
            recent: self.stores.jobs.recent(self.config.recent_jobs).await?,
        })
    }

    /// Dispatch scheduled tasks until `shutdown` completes.
    ///
    /// Jobs for different items run concurrently. Pending rows are
    /// rescheduled on start and every poll interval, which picks up batches
    /// queued by other processes. In-flight jobs are awaited before
    /// returning.
    pub async fn run_worker<S>(self: Arc<Self>, mut tasks: TaskReceiver, shutdown: S)
    where
        S: Future<Output = ()> + Send,
    {
        info!("queue worker started");
        let mut running = JoinSet::new();
        let mut poll = tokio::time::interval(self.config.poll_interval);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                biased;

                () = &mut shutdown => {
                    info!("shutdown signal received, stopping queue worker");
                    break;
                }

                task = tasks.recv() => {
                    let Some(task) = task else {
                        warn!("task channel closed");
                        break;
                    };
                    match self.parse_task(&task) {
                        Ok(item_id) => {
                            let queue = Arc::clone(&self);
                            running.spawn(async move { (item_id, queue.process(item_id).await) });
                        }
                        Err(err) => warn!(action = %task.action, error = %err, "task ignored"),
                    }
                }

                Some(joined) = running.join_next(), if !running.is_empty() => {
                    log_job(joined);
                }

                _ = poll.tick() => {
                    if let Err(err) = self.resume().await {
                        warn!(error = %err, "could not reschedule pending jobs");
                    }
                }
            }
        }

        while let Some(joined) = running.join_next().await {
            log_job(joined);
        }
        info!("queue worker stopped");
    }

    fn parse_task(&self, task: &ScheduledTask) -> Result<ItemId, QueueError> {
        if task.action != PROCESS_ACTION {
            return Err(QueueError::InvalidPayload(format!(
                "unknown action '{}'",
                task.action
            )));
        }
        serde_json::from_value::<ProcessPayload>(task.payload.clone())
            .map(|payload| payload.item_id)
            .map_err(|err| QueueError::InvalidPayload(err.to_string()))
    }
}

fn log_job(
    joined: Result<(ItemId, Result<ProcessOutcome, QueueError>), tokio::task::JoinError>,
) {
    match joined {
        Ok((item_id, Ok(outcome))) => debug!(item_id, outcome = ?outcome, "job finished"),
        Ok((item_id, Err(err))) => error!(item_id, error = %err, "job failed"),
        Err(err) => error!(error = %err, "job panicked"),
    }
}
