//! In-memory implementation of every store trait.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

use catalog_core::{
    async_trait, format_timestamp, timestamp_now, AuditAction, AuditEvent, AuditFilter, AuditPage,
    AuditRecord, AuditSink, AuditSummary, CatalogItem, CatalogStore, ConfigStore, FallbackNotice,
    GeneratedContent, HealthSnapshot, ItemGenerationState, ItemId, ItemStateUpdate, JobStatus,
    JobTransition, MonitorStore, QueueJob, QueueStore, QueueTotals, StoreError, StoreResult, Tier,
    Zone,
};
use chrono::{Duration as ChronoDuration, Utc};

/// Rows returned by an audit export.
pub const EXPORT_LIMIT: usize = 5000;

#[derive(Default)]
struct Inner {
    items: BTreeMap<ItemId, CatalogItem>,
    states: HashMap<ItemId, ItemGenerationState>,
    settings: HashMap<String, String>,
    audit: Vec<AuditRecord>,
    jobs: BTreeMap<ItemId, QueueJob>,
    health: Option<HealthSnapshot>,
    notice: Option<FallbackNotice>,
    content_writes: usize,
}

/// Catalog, config, audit, queue and monitor state held in memory.
///
/// One mutex guards everything, so claims and upserts are atomic.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a catalog item. Its state is stored separately.
    pub fn insert_item(&self, item: CatalogItem) {
        let mut inner = self.lock();
        inner.states.insert(item.id, item.state.clone());
        inner.items.insert(item.id, item);
    }

    /// Current catalog content of an item.
    pub fn content(&self, id: ItemId) -> Option<GeneratedContent> {
        self.lock().items.get(&id).map(|item| item.existing.clone())
    }

    /// Number of successful `set_item_content` calls.
    pub fn content_writes(&self) -> usize {
        self.lock().content_writes
    }

    /// Audit events in append order.
    pub fn audit_events(&self) -> Vec<AuditEvent> {
        self.lock()
            .audit
            .iter()
            .map(|record| record.event.clone())
            .collect()
    }

    /// Move a job's queued time, for day and window boundary tests.
    pub fn backdate_job(&self, item_id: ItemId, days: i64) {
        let queued_at = format_timestamp(Utc::now() - ChronoDuration::days(days));
        if let Some(job) = self.lock().jobs.get_mut(&item_id) {
            job.queued_at = queued_at;
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn apply_update(state: &mut ItemGenerationState, update: ItemStateUpdate) {
    if let Some(locked) = update.locked {
        state.locked = locked;
    }
    if let Some(tier) = update.tier {
        state.tier = Some(tier);
    }
    if let Some(brand) = update.brand {
        state.brand = Some(brand);
    }
    if let Some(model) = update.last_model {
        state.last_model = Some(model);
    }
    if let Some(at) = update.last_generated_at {
        state.last_generated_at = Some(at);
    }
    if let Some(status) = update.ai_status {
        state.ai_status = Some(status);
    }
    if let Some(action) = update.last_action {
        state.last_action = Some(action);
    }
    if let Some(similarity) = update.last_similarity {
        state.last_similarity = Some(similarity);
    }
}

#[async_trait]
impl CatalogStore for MemoryStore {
    async fn get_item(&self, id: ItemId) -> StoreResult<Option<CatalogItem>> {
        let inner = self.lock();
        Ok(inner.items.get(&id).map(|item| CatalogItem {
            state: inner.states.get(&id).cloned().unwrap_or_default(),
            ..item.clone()
        }))
    }

    async fn set_item_content(&self, id: ItemId, content: &GeneratedContent) -> StoreResult<()> {
        let mut inner = self.lock();
        let item = inner
            .items
            .get_mut(&id)
            .ok_or_else(|| StoreError::new(format!("item {} not found", id)))?;
        for (field, text) in content.present() {
            item.existing.set(field, Some(text.to_string()));
        }
        inner.content_writes += 1;
        Ok(())
    }

    async fn item_state(&self, id: ItemId) -> StoreResult<ItemGenerationState> {
        Ok(self.lock().states.get(&id).cloned().unwrap_or_default())
    }

    async fn update_item_state(&self, id: ItemId, update: ItemStateUpdate) -> StoreResult<()> {
        apply_update(self.lock().states.entry(id).or_default(), update);
        Ok(())
    }

    async fn try_claim(&self, id: ItemId) -> StoreResult<bool> {
        let mut inner = self.lock();
        let state = inner.states.entry(id).or_default();
        if state.generating {
            return Ok(false);
        }
        state.generating = true;
        Ok(true)
    }

    async fn release_claim(&self, id: ItemId) -> StoreResult<()> {
        if let Some(state) = self.lock().states.get_mut(&id) {
            state.generating = false;
        }
        Ok(())
    }
}

#[async_trait]
impl ConfigStore for MemoryStore {
    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        Ok(self.lock().settings.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> StoreResult<()> {
        self.lock()
            .settings
            .insert(key.to_string(), value.to_string());
        Ok(())
    }
}

fn matches_filter(event: &AuditEvent, filter: &AuditFilter) -> bool {
    filter.action.map_or(true, |action| event.action == action)
        && filter
            .zone
            .map_or(true, |zone| event.similarity_zone == Some(zone))
        && filter.item_id.map_or(true, |id| event.item_id == id)
}

fn average(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, count) = values.fold((0.0, 0u32), |(sum, count), value| (sum + value, count + 1));
    (count > 0).then(|| sum / f64::from(count))
}

#[async_trait]
impl AuditSink for MemoryStore {
    async fn append(&self, event: &AuditEvent) -> StoreResult<i64> {
        let mut inner = self.lock();
        let id = inner.audit.len() as i64 + 1;
        let mut event = event.clone();
        if event.timestamp.is_none() {
            event.timestamp = Some(timestamp_now());
        }
        inner.audit.push(AuditRecord { id, event });
        Ok(id)
    }

    async fn query(
        &self,
        filter: &AuditFilter,
        page: u32,
        page_size: u32,
    ) -> StoreResult<AuditPage> {
        let inner = self.lock();
        let matching: Vec<&AuditRecord> = inner
            .audit
            .iter()
            .rev()
            .filter(|record| matches_filter(&record.event, filter))
            .collect();
        let skip = (page.max(1) as usize - 1) * page_size as usize;
        Ok(AuditPage {
            total: matching.len() as u64,
            rows: matching
                .into_iter()
                .skip(skip)
                .take(page_size as usize)
                .cloned()
                .collect(),
        })
    }

    async fn export_all(&self) -> StoreResult<Vec<AuditRecord>> {
        Ok(self
            .lock()
            .audit
            .iter()
            .rev()
            .take(EXPORT_LIMIT)
            .cloned()
            .collect())
    }

    async fn summary(&self) -> StoreResult<AuditSummary> {
        let inner = self.lock();
        let events = || inner.audit.iter().map(|record| &record.event);
        let by_action = |action: AuditAction| events().filter(|e| e.action == action).count() as u64;
        let by_zone = |zone: Zone| {
            events()
                .filter(|e| e.similarity_zone == Some(zone))
                .count() as u64
        };

        Ok(AuditSummary {
            total: inner.audit.len() as u64,
            saved: by_action(AuditAction::Saved),
            blocked_similarity: by_action(AuditAction::BlockedSimilarity),
            rejected: by_action(AuditAction::Rejected),
            previewed: by_action(AuditAction::Previewed),
            avg_similarity_pct: average(events().filter_map(|e| e.similarity_score))
                .map(|avg| (avg * 1000.0).round() / 10.0),
            zone_block: by_zone(Zone::Block),
            zone_warn: by_zone(Zone::Warn),
            zone_allow: by_zone(Zone::Allow),
            avg_response_ms: average(events().filter_map(|e| e.response_time_ms.map(|ms| ms as f64)))
                .map(f64::round),
        })
    }
}

fn start_of_today() -> String {
    format!("{} 00:00:00", Utc::now().format("%Y-%m-%d"))
}

#[async_trait]
impl QueueStore for MemoryStore {
    async fn upsert_pending(&self, item_id: ItemId, tier: Tier) -> StoreResult<()> {
        self.lock().jobs.insert(
            item_id,
            QueueJob {
                item_id,
                tier,
                status: JobStatus::Pending,
                queued_at: timestamp_now(),
                started_at: None,
                finished_at: None,
                result: None,
                error_message: None,
                model_used: None,
            },
        );
        Ok(())
    }

    async fn count_queued_today(&self) -> StoreResult<u64> {
        let today = start_of_today();
        Ok(self
            .lock()
            .jobs
            .values()
            .filter(|job| job.queued_at >= today)
            .count() as u64)
    }

    async fn transition(&self, item_id: ItemId, transition: JobTransition) -> StoreResult<()> {
        let mut inner = self.lock();
        let job = inner
            .jobs
            .get_mut(&item_id)
            .ok_or_else(|| StoreError::new(format!("no queue job for item {}", item_id)))?;
        let now = timestamp_now();
        job.status = transition.status();
        match transition {
            JobTransition::Generating => job.started_at = Some(now),
            JobTransition::Failed(message) => {
                job.error_message = Some(message);
                job.finished_at = Some(now);
            }
            JobTransition::SkippedSimilarity(reason) => {
                job.result = Some(reason);
                job.finished_at = Some(now);
            }
            JobTransition::Complete { model_used } => {
                job.model_used = Some(model_used);
                job.finished_at = Some(now);
            }
        }
        Ok(())
    }

    async fn cancel_pending(&self) -> StoreResult<u64> {
        let now = timestamp_now();
        let mut cancelled = 0;
        for job in self.lock().jobs.values_mut() {
            if job.status == JobStatus::Pending {
                job.status = JobStatus::Cancelled;
                job.finished_at = Some(now.clone());
                cancelled += 1;
            }
        }
        Ok(cancelled)
    }

    async fn totals(&self, window_days: u32) -> StoreResult<QueueTotals> {
        let since = format_timestamp(Utc::now() - ChronoDuration::days(i64::from(window_days)));
        let mut totals = QueueTotals::default();
        for job in self.lock().jobs.values() {
            if job.queued_at >= since {
                totals.add(job.status, 1);
            }
        }
        Ok(totals)
    }

    async fn recent(&self, limit: u32) -> StoreResult<Vec<QueueJob>> {
        let mut jobs: Vec<QueueJob> = self.lock().jobs.values().cloned().collect();
        jobs.sort_by(|a, b| {
            b.queued_at
                .cmp(&a.queued_at)
                .then_with(|| b.item_id.cmp(&a.item_id))
        });
        jobs.truncate(limit as usize);
        Ok(jobs)
    }

    async fn job(&self, item_id: ItemId) -> StoreResult<Option<QueueJob>> {
        Ok(self.lock().jobs.get(&item_id).cloned())
    }

    async fn pending_items(&self) -> StoreResult<Vec<ItemId>> {
        let mut pending: Vec<(String, ItemId)> = self
            .lock()
            .jobs
            .values()
            .filter(|job| job.status == JobStatus::Pending)
            .map(|job| (job.queued_at.clone(), job.item_id))
            .collect();
        pending.sort();
        Ok(pending.into_iter().map(|(_, id)| id).collect())
    }
}

#[async_trait]
impl MonitorStore for MemoryStore {
    async fn save_health(&self, snapshot: &HealthSnapshot) -> StoreResult<()> {
        self.lock().health = Some(snapshot.clone());
        Ok(())
    }

    async fn load_health(&self) -> StoreResult<Option<HealthSnapshot>> {
        Ok(self.lock().health.clone())
    }

    async fn put_fallback_notice(&self, notice: &FallbackNotice) -> StoreResult<()> {
        self.lock().notice = Some(notice.clone());
        Ok(())
    }

    async fn take_fallback_notice(&self) -> StoreResult<Option<FallbackNotice>> {
        Ok(self.lock().notice.take())
    }
}
