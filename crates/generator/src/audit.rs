//! Audit writes with per-item bookkeeping.

use std::sync::Arc;

use catalog_core::{
    timestamp_now, AuditAction, AuditEvent, AuditSink, CatalogStore, ItemStateUpdate, StoreResult,
};
use tracing::debug;

/// Appends audit events and keeps the item's summary fields current.
///
/// Events without a model are attributed to the item's last-used model.
/// Saved and similarity-blocked events also update `last_action`,
/// `last_similarity` and `last_generated_at` on the item.
#[derive(Clone)]
pub struct AuditRecorder {
    catalog: Arc<dyn CatalogStore>,
    sink: Arc<dyn AuditSink>,
}

impl AuditRecorder {
    pub fn new(catalog: Arc<dyn CatalogStore>, sink: Arc<dyn AuditSink>) -> Self {
        Self { catalog, sink }
    }

    pub async fn record(&self, mut event: AuditEvent) -> StoreResult<i64> {
        if event.model_used.is_none() {
            event.model_used = self.catalog.item_state(event.item_id).await?.last_model;
        }

        if matches!(
            event.action,
            AuditAction::Saved | AuditAction::BlockedSimilarity
        ) {
            self.catalog
                .update_item_state(
                    event.item_id,
                    ItemStateUpdate {
                        last_generated_at: Some(timestamp_now()),
                        last_action: Some(event.action),
                        last_similarity: event.similarity_score,
                        ..Default::default()
                    },
                )
                .await?;
        }

        let id = self.sink.append(&event).await?;
        debug!(
            audit_id = id,
            item_id = event.item_id,
            action = event.action.as_str(),
            "audit event recorded"
        );
        Ok(id)
    }
}
