//! Bulk queue job table, one row per item.

use catalog_core::{
    async_trait, format_timestamp, timestamp_now, ItemId, JobStatus, JobTransition, QueueJob,
    QueueStore, QueueTotals, StoreResult, Tier,
};
use chrono::{Duration, Utc};
use sqlx::SqlitePool;

use crate::error::{DatabaseError, Result};
use crate::models::JobRow;
use crate::Database;

const JOB_COLUMNS: &str =
    "item_id, tier, status, queued_at, started_at, finished_at, result, error_message, model_used";

/// Insert the item's row as pending, or reset an existing one.
pub async fn upsert_pending(pool: &SqlitePool, item_id: ItemId, tier: Tier) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO queue_jobs (item_id, tier, status, queued_at)
        VALUES (?, ?, 'pending', ?)
        ON CONFLICT(item_id) DO UPDATE SET
            tier = excluded.tier,
            status = 'pending',
            queued_at = excluded.queued_at,
            started_at = NULL,
            finished_at = NULL,
            result = NULL,
            error_message = NULL,
            model_used = NULL
        "#,
    )
    .bind(item_id)
    .bind(tier.as_str())
    .bind(timestamp_now())
    .execute(pool)
    .await?;

    Ok(())
}

/// Rows queued since midnight UTC.
pub async fn count_queued_today(pool: &SqlitePool) -> Result<u64> {
    let midnight = format!("{} 00:00:00", Utc::now().format("%Y-%m-%d"));
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM queue_jobs WHERE queued_at >= ?")
        .bind(midnight)
        .fetch_one(pool)
        .await?;
    Ok(count.max(0) as u64)
}

pub async fn transition(pool: &SqlitePool, item_id: ItemId, transition: JobTransition) -> Result<()> {
    let now = timestamp_now();
    let status = transition.status();
    let (started_at, finished_at, result, error_message, model_used) = match transition {
        JobTransition::Generating => (Some(now), None, None, None, None),
        JobTransition::Failed(message) => (None, Some(now), None, Some(message), None),
        JobTransition::SkippedSimilarity(reason) => (None, Some(now), Some(reason), None, None),
        JobTransition::Complete { model_used } => (None, Some(now), None, None, Some(model_used)),
    };

    let outcome = sqlx::query(
        r#"
        UPDATE queue_jobs
        SET status = ?,
            started_at = COALESCE(?, started_at),
            finished_at = COALESCE(?, finished_at),
            result = COALESCE(?, result),
            error_message = COALESCE(?, error_message),
            model_used = COALESCE(?, model_used)
        WHERE item_id = ?
        "#,
    )
    .bind(status.as_str())
    .bind(started_at)
    .bind(finished_at)
    .bind(result)
    .bind(error_message)
    .bind(model_used)
    .bind(item_id)
    .execute(pool)
    .await?;

    if outcome.rows_affected() == 0 {
        return Err(DatabaseError::NotFound {
            entity: "Queue job",
            id: item_id.to_string(),
        });
    }

    tracing::debug!(item_id, status = status.as_str(), "queue job transitioned");
    Ok(())
}

pub async fn cancel_pending(pool: &SqlitePool) -> Result<u64> {
    let result = sqlx::query(
        r#"
        UPDATE queue_jobs
        SET status = 'cancelled', finished_at = ?
        WHERE status = 'pending'
        "#,
    )
    .bind(timestamp_now())
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}

/// Counts per status for rows queued in the last `window_days` days.
pub async fn totals(pool: &SqlitePool, window_days: u32) -> Result<QueueTotals> {
    let since = format_timestamp(Utc::now() - Duration::days(i64::from(window_days)));
    let rows = sqlx::query_as::<_, (String, i64)>(
        r#"
        SELECT status, COUNT(*)
        FROM queue_jobs
        WHERE queued_at >= ?
        GROUP BY status
        "#,
    )
    .bind(since)
    .fetch_all(pool)
    .await?;

    let mut totals = QueueTotals::default();
    for (status, count) in rows {
        totals.add(status.parse::<JobStatus>()?, count.max(0) as u64);
    }
    Ok(totals)
}

/// Most recently queued rows.
pub async fn recent(pool: &SqlitePool, limit: u32) -> Result<Vec<QueueJob>> {
    let query = format!(
        "SELECT {} FROM queue_jobs ORDER BY queued_at DESC, item_id DESC LIMIT ?",
        JOB_COLUMNS
    );
    sqlx::query_as::<_, JobRow>(&query)
        .bind(i64::from(limit))
        .fetch_all(pool)
        .await?
        .into_iter()
        .map(JobRow::into_job)
        .collect()
}

pub async fn get_job(pool: &SqlitePool, item_id: ItemId) -> Result<Option<QueueJob>> {
    let query = format!("SELECT {} FROM queue_jobs WHERE item_id = ?", JOB_COLUMNS);
    sqlx::query_as::<_, JobRow>(&query)
        .bind(item_id)
        .fetch_optional(pool)
        .await?
        .map(JobRow::into_job)
        .transpose()
}

pub async fn pending_items(pool: &SqlitePool) -> Result<Vec<ItemId>> {
    let ids = sqlx::query_scalar::<_, i64>(
        r#"
        SELECT item_id
        FROM queue_jobs
        WHERE status = 'pending'
        ORDER BY queued_at, item_id
        "#,
    )
    .fetch_all(pool)
    .await?;
    Ok(ids)
}

#[async_trait]
impl QueueStore for Database {
    async fn upsert_pending(&self, item_id: ItemId, tier: Tier) -> StoreResult<()> {
        Ok(upsert_pending(self.pool(), item_id, tier).await?)
    }

    async fn count_queued_today(&self) -> StoreResult<u64> {
        Ok(count_queued_today(self.pool()).await?)
    }

    async fn transition(&self, item_id: ItemId, change: JobTransition) -> StoreResult<()> {
        Ok(transition(self.pool(), item_id, change).await?)
    }

    async fn cancel_pending(&self) -> StoreResult<u64> {
        Ok(cancel_pending(self.pool()).await?)
    }

    async fn totals(&self, window_days: u32) -> StoreResult<QueueTotals> {
        Ok(totals(self.pool(), window_days).await?)
    }

    async fn recent(&self, limit: u32) -> StoreResult<Vec<QueueJob>> {
        Ok(recent(self.pool(), limit).await?)
    }

    async fn job(&self, item_id: ItemId) -> StoreResult<Option<QueueJob>> {
        Ok(get_job(self.pool(), item_id).await?)
    }

    async fn pending_items(&self) -> StoreResult<Vec<ItemId>> {
        Ok(pending_items(self.pool()).await?)
    }
}
