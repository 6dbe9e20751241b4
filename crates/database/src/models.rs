//! Database row models and their conversion into domain types.

use catalog_core::{
    AuditEvent, AuditRecord, CatalogItem, GeneratedContent, ItemGenerationState, ProductAttributes,
    QueueJob,
};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::Result;

/// A catalog entry as imported from a storefront export.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub id: i64,
    #[serde(flatten)]
    pub product: ProductAttributes,
    #[serde(flatten)]
    pub content: GeneratedContent,
}

/// A catalog item joined with its (possibly missing) state row.
#[derive(Debug, Clone, FromRow)]
pub(crate) struct ItemRow {
    pub id: i64,
    pub title: String,
    pub brand: String,
    pub category: String,
    pub subcategory: String,
    /// JSON array.
    pub attributes: String,
    pub short_description: Option<String>,
    pub long_description: Option<String>,
    pub meta_description: Option<String>,
    #[sqlx(flatten)]
    pub state: StateRow,
}

/// An `item_state` row. Every column is nullable so the struct also
/// decodes from a LEFT JOIN with no match.
#[derive(Debug, Clone, Default, FromRow)]
pub(crate) struct StateRow {
    pub locked: Option<bool>,
    pub tier: Option<String>,
    pub state_brand: Option<String>,
    pub last_model: Option<String>,
    pub generating: Option<bool>,
    pub last_generated_at: Option<String>,
    pub ai_status: Option<String>,
    pub last_action: Option<String>,
    pub last_similarity: Option<f64>,
}

impl StateRow {
    pub fn into_state(self) -> Result<ItemGenerationState> {
        Ok(ItemGenerationState {
            locked: self.locked.unwrap_or(false),
            tier: self.tier.as_deref().map(str::parse).transpose()?,
            brand: self.state_brand,
            last_model: self.last_model,
            generating: self.generating.unwrap_or(false),
            last_generated_at: self.last_generated_at,
            ai_status: self.ai_status,
            last_action: self.last_action.as_deref().map(str::parse).transpose()?,
            last_similarity: self.last_similarity,
        })
    }
}

impl ItemRow {
    pub fn into_item(self) -> Result<CatalogItem> {
        let attributes: Vec<String> = serde_json::from_str(&self.attributes)?;
        Ok(CatalogItem {
            id: self.id,
            product: ProductAttributes {
                title: self.title,
                brand: self.brand,
                category: self.category,
                subcategory: self.subcategory,
                attributes,
            },
            existing: GeneratedContent {
                short_description: self.short_description,
                long_description: self.long_description,
                meta_description: self.meta_description,
            },
            state: self.state.into_state()?,
        })
    }
}

#[derive(Debug, Clone, FromRow)]
pub(crate) struct JobRow {
    pub item_id: i64,
    pub tier: String,
    pub status: String,
    pub queued_at: String,
    pub started_at: Option<String>,
    pub finished_at: Option<String>,
    pub result: Option<String>,
    pub error_message: Option<String>,
    pub model_used: Option<String>,
}

impl JobRow {
    pub fn into_job(self) -> Result<QueueJob> {
        Ok(QueueJob {
            item_id: self.item_id,
            tier: self.tier.parse()?,
            status: self.status.parse()?,
            queued_at: self.queued_at,
            started_at: self.started_at,
            finished_at: self.finished_at,
            result: self.result,
            error_message: self.error_message,
            model_used: self.model_used,
        })
    }
}

#[derive(Debug, Clone, FromRow)]
pub(crate) struct AuditRow {
    pub id: i64,
    pub item_id: i64,
    pub item_name: String,
    pub action: String,
    pub tier: String,
    pub mode: String,
    pub model_used: Option<String>,
    pub similarity_score: Option<f64>,
    pub similarity_zone: Option<String>,
    pub word_count_long: i64,
    pub word_count_short: i64,
    pub safety_passed: bool,
    pub rejection_reason: Option<String>,
    pub response_time_ms: Option<i64>,
    pub timestamp: String,
    pub actor_id: Option<String>,
}

impl AuditRow {
    pub fn into_record(self) -> Result<AuditRecord> {
        Ok(AuditRecord {
            id: self.id,
            event: AuditEvent {
                item_id: self.item_id,
                item_name: self.item_name,
                action: self.action.parse()?,
                tier: self.tier.parse()?,
                mode: self.mode.parse()?,
                model_used: self.model_used,
                similarity_score: self.similarity_score,
                similarity_zone: self.similarity_zone.as_deref().map(str::parse).transpose()?,
                word_count_long: self.word_count_long.max(0) as u32,
                word_count_short: self.word_count_short.max(0) as u32,
                safety_passed: self.safety_passed,
                rejection_reason: self.rejection_reason,
                response_time_ms: self.response_time_ms.map(|ms| ms.max(0) as u64),
                timestamp: Some(self.timestamp),
                actor_id: self.actor_id,
            },
        })
    }
}

/// Aggregates over the whole audit table.
#[derive(Debug, Clone, FromRow)]
pub(crate) struct SummaryRow {
    pub total: i64,
    pub saved: i64,
    pub blocked_similarity: i64,
    pub rejected: i64,
    pub previewed: i64,
    pub avg_similarity: Option<f64>,
    pub zone_block: i64,
    pub zone_warn: i64,
    pub zone_allow: i64,
    pub avg_response_ms: Option<f64>,
}
