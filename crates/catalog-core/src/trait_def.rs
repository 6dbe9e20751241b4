//! Collaborator interfaces consumed by the generator and the bulk queue.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::chat::{ChatRequest, RawReply};
use crate::error::{StoreError, TransportError};
use crate::types::{
    AuditEvent, AuditFilter, AuditPage, AuditRecord, AuditSummary, CatalogItem, FallbackNotice,
    GeneratedContent, HealthSnapshot, ItemGenerationState, ItemId, ItemStateUpdate, JobTransition,
    QueueJob, QueueTotals, Tier,
};

/// Result type for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// A text-generation backend speaking the chat completion protocol.
///
/// Implementations only move bytes: they never interpret status codes, so
/// generation and health probing share one classification path.
#[async_trait]
pub trait ChatProvider: Send + Sync {
    /// Send a request and return the raw status and body.
    async fn send(&self, request: ChatRequest) -> Result<RawReply, TransportError>;

    /// Provider name used in logs.
    fn name(&self) -> &str;
}

/// Read and write access to the storefront catalog.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Product data, current content and generation state for an item.
    async fn get_item(&self, id: ItemId) -> StoreResult<Option<CatalogItem>>;

    /// Persist generated fields. Absent fields are left untouched; the
    /// write is all-or-nothing.
    async fn set_item_content(&self, id: ItemId, content: &GeneratedContent) -> StoreResult<()>;

    /// Generation state, or the default state when none was stored.
    async fn item_state(&self, id: ItemId) -> StoreResult<ItemGenerationState>;

    /// Apply a partial state update.
    async fn update_item_state(&self, id: ItemId, update: ItemStateUpdate) -> StoreResult<()>;

    /// Atomically set the processing flag. Returns `false` when another job
    /// already holds it.
    async fn try_claim(&self, id: ItemId) -> StoreResult<bool>;

    /// Clear the processing flag.
    async fn release_claim(&self, id: ItemId) -> StoreResult<()>;
}

/// Simple key-value settings.
#[async_trait]
pub trait ConfigStore: Send + Sync {
    async fn get(&self, key: &str) -> StoreResult<Option<String>>;

    async fn set(&self, key: &str, value: &str) -> StoreResult<()>;
}

/// Append-only audit log.
#[async_trait]
pub trait AuditSink: Send + Sync {
    /// Append an event and return its row id.
    async fn append(&self, event: &AuditEvent) -> StoreResult<i64>;

    /// Filtered page of events, newest first. `page` is 1-based.
    async fn query(&self, filter: &AuditFilter, page: u32, page_size: u32)
        -> StoreResult<AuditPage>;

    /// Most recent rows for export, newest first.
    async fn export_all(&self) -> StoreResult<Vec<AuditRecord>>;

    async fn summary(&self) -> StoreResult<AuditSummary>;
}

/// The bulk queue's job table.
#[async_trait]
pub trait QueueStore: Send + Sync {
    /// Insert or refresh the item's row as pending.
    async fn upsert_pending(&self, item_id: ItemId, tier: Tier) -> StoreResult<()>;

    /// Rows queued since the start of the current day.
    async fn count_queued_today(&self) -> StoreResult<u64>;

    async fn transition(&self, item_id: ItemId, transition: JobTransition) -> StoreResult<()>;

    /// Flip every pending row to cancelled. Returns the number of rows.
    async fn cancel_pending(&self) -> StoreResult<u64>;

    async fn totals(&self, window_days: u32) -> StoreResult<QueueTotals>;

    async fn recent(&self, limit: u32) -> StoreResult<Vec<QueueJob>>;

    async fn job(&self, item_id: ItemId) -> StoreResult<Option<QueueJob>>;

    /// Items whose rows are still pending, oldest first.
    async fn pending_items(&self) -> StoreResult<Vec<ItemId>>;
}

/// Single-slot monitoring state: the health snapshot and the fallback outbox.
#[async_trait]
pub trait MonitorStore: Send + Sync {
    /// Replace the stored snapshot.
    async fn save_health(&self, snapshot: &HealthSnapshot) -> StoreResult<()>;

    async fn load_health(&self) -> StoreResult<Option<HealthSnapshot>>;

    /// Put a notice in the outbox, replacing any undelivered one.
    async fn put_fallback_notice(&self, notice: &FallbackNotice) -> StoreResult<()>;

    /// Remove and return the pending notice.
    async fn take_fallback_notice(&self) -> StoreResult<Option<FallbackNotice>>;
}

/// Delayed task execution with at-least-once delivery.
#[async_trait]
pub trait TaskScheduler: Send + Sync {
    async fn schedule(&self, action: &str, payload: Value, run_at: DateTime<Utc>)
        -> StoreResult<()>;

    /// Drop every not-yet-run task for an action. Returns how many were dropped.
    async fn cancel_all(&self, action: &str) -> StoreResult<usize>;
}
