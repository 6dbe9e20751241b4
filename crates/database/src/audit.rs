//! Append-only audit log.

use catalog_core::{
    async_trait, timestamp_now, AuditEvent, AuditFilter, AuditPage, AuditRecord, AuditSink,
    AuditSummary, StoreResult,
};
use sqlx::{QueryBuilder, Sqlite, SqlitePool};

use crate::models::{AuditRow, SummaryRow};
use crate::{Database, Result};

/// Rows returned by an export.
pub const EXPORT_LIMIT: i64 = 5000;

const EVENT_COLUMNS: &str = "id, item_id, item_name, action, tier, mode, model_used, \
    similarity_score, similarity_zone, word_count_long, word_count_short, safety_passed, \
    rejection_reason, response_time_ms, timestamp, actor_id";

/// Append an event. The timestamp defaults to now.
pub async fn append_event(pool: &SqlitePool, event: &AuditEvent) -> Result<i64> {
    let timestamp = event.timestamp.clone().unwrap_or_else(timestamp_now);
    let result = sqlx::query(
        r#"
        INSERT INTO audit_events (
            item_id, item_name, action, tier, mode, model_used,
            similarity_score, similarity_zone, word_count_long, word_count_short,
            safety_passed, rejection_reason, response_time_ms, timestamp, actor_id
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(event.item_id)
    .bind(&event.item_name)
    .bind(event.action.as_str())
    .bind(event.tier.as_str())
    .bind(event.mode.as_str())
    .bind(&event.model_used)
    .bind(event.similarity_score)
    .bind(event.similarity_zone.map(|zone| zone.as_str()))
    .bind(i64::from(event.word_count_long))
    .bind(i64::from(event.word_count_short))
    .bind(event.safety_passed)
    .bind(&event.rejection_reason)
    .bind(event.response_time_ms.map(|ms| ms as i64))
    .bind(timestamp)
    .bind(&event.actor_id)
    .execute(pool)
    .await?;

    Ok(result.last_insert_rowid())
}

fn push_filter(builder: &mut QueryBuilder<'_, Sqlite>, filter: &AuditFilter) {
    builder.push(" WHERE 1 = 1");
    if let Some(action) = filter.action {
        builder.push(" AND action = ").push_bind(action.as_str());
    }
    if let Some(zone) = filter.zone {
        builder.push(" AND similarity_zone = ").push_bind(zone.as_str());
    }
    if let Some(item_id) = filter.item_id {
        builder.push(" AND item_id = ").push_bind(item_id);
    }
}

/// Filtered page, newest first. `page` is 1-based.
pub async fn query_events(
    pool: &SqlitePool,
    filter: &AuditFilter,
    page: u32,
    page_size: u32,
) -> Result<AuditPage> {
    let mut count = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM audit_events");
    push_filter(&mut count, filter);
    let total: i64 = count.build_query_scalar().fetch_one(pool).await?;

    let offset = i64::from(page.max(1) - 1) * i64::from(page_size);
    let mut select = QueryBuilder::<Sqlite>::new(format!("SELECT {} FROM audit_events", EVENT_COLUMNS));
    push_filter(&mut select, filter);
    select
        .push(" ORDER BY id DESC LIMIT ")
        .push_bind(i64::from(page_size))
        .push(" OFFSET ")
        .push_bind(offset);

    let rows = select
        .build_query_as::<AuditRow>()
        .fetch_all(pool)
        .await?
        .into_iter()
        .map(AuditRow::into_record)
        .collect::<Result<Vec<_>>>()?;

    Ok(AuditPage {
        rows,
        total: total.max(0) as u64,
    })
}

/// The most recent [`EXPORT_LIMIT`] rows, newest first.
pub async fn export_events(pool: &SqlitePool) -> Result<Vec<AuditRecord>> {
    let query = format!(
        "SELECT {} FROM audit_events ORDER BY id DESC LIMIT ?",
        EVENT_COLUMNS
    );
    sqlx::query_as::<_, AuditRow>(&query)
        .bind(EXPORT_LIMIT)
        .fetch_all(pool)
        .await?
        .into_iter()
        .map(AuditRow::into_record)
        .collect()
}

pub async fn summarize(pool: &SqlitePool) -> Result<AuditSummary> {
    let row = sqlx::query_as::<_, SummaryRow>(
        r#"
        SELECT
            COUNT(*) AS total,
            COALESCE(SUM(action = 'saved'), 0) AS saved,
            COALESCE(SUM(action = 'blocked_similarity'), 0) AS blocked_similarity,
            COALESCE(SUM(action = 'rejected'), 0) AS rejected,
            COALESCE(SUM(action = 'previewed'), 0) AS previewed,
            AVG(similarity_score) AS avg_similarity,
            COALESCE(SUM(similarity_zone = 'block'), 0) AS zone_block,
            COALESCE(SUM(similarity_zone = 'warn'), 0) AS zone_warn,
            COALESCE(SUM(similarity_zone = 'allow'), 0) AS zone_allow,
            AVG(response_time_ms) AS avg_response_ms
        FROM audit_events
        "#,
    )
    .fetch_one(pool)
    .await?;

    let count = |value: i64| value.max(0) as u64;
    Ok(AuditSummary {
        total: count(row.total),
        saved: count(row.saved),
        blocked_similarity: count(row.blocked_similarity),
        rejected: count(row.rejected),
        previewed: count(row.previewed),
        avg_similarity_pct: row.avg_similarity.map(|avg| (avg * 1000.0).round() / 10.0),
        zone_block: count(row.zone_block),
        zone_warn: count(row.zone_warn),
        zone_allow: count(row.zone_allow),
        avg_response_ms: row.avg_response_ms.map(f64::round),
    })
}

#[async_trait]
impl AuditSink for Database {
    async fn append(&self, event: &AuditEvent) -> StoreResult<i64> {
        Ok(append_event(self.pool(), event).await?)
    }

    async fn query(
        &self,
        filter: &AuditFilter,
        page: u32,
        page_size: u32,
    ) -> StoreResult<AuditPage> {
        Ok(query_events(self.pool(), filter, page, page_size).await?)
    }

    async fn export_all(&self) -> StoreResult<Vec<AuditRecord>> {
        Ok(export_events(self.pool()).await?)
    }

    async fn summary(&self) -> StoreResult<AuditSummary> {
        Ok(summarize(self.pool()).await?)
    }
}
