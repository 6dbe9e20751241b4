//! Single-slot monitor state: the health snapshot and the fallback notice
//! outbox, stored as JSON.

use catalog_core::{async_trait, FallbackNotice, HealthSnapshot, MonitorStore, StoreResult};
use serde::de::DeserializeOwned;
use serde::Serialize;
use sqlx::SqlitePool;

use crate::{Database, Result};

const HEALTH_SLOT: &str = "health_snapshot";
const NOTICE_SLOT: &str = "fallback_notice";

async fn put<T: Serialize>(pool: &SqlitePool, slot: &str, value: &T) -> Result<()> {
    let payload = serde_json::to_string(value)?;
    sqlx::query(
        r#"
        INSERT INTO monitor_slots (slot, payload)
        VALUES (?, ?)
        ON CONFLICT(slot) DO UPDATE SET
            payload = excluded.payload,
            updated_at = datetime('now')
        "#,
    )
    .bind(slot)
    .bind(payload)
    .execute(pool)
    .await?;
    Ok(())
}

async fn load<T: DeserializeOwned>(pool: &SqlitePool, slot: &str) -> Result<Option<T>> {
    let payload = sqlx::query_scalar::<_, String>("SELECT payload FROM monitor_slots WHERE slot = ?")
        .bind(slot)
        .fetch_optional(pool)
        .await?;
    Ok(payload.map(|p| serde_json::from_str(&p)).transpose()?)
}

/// Delete and return in one statement so a notice is delivered once.
async fn take<T: DeserializeOwned>(pool: &SqlitePool, slot: &str) -> Result<Option<T>> {
    let payload =
        sqlx::query_scalar::<_, String>("DELETE FROM monitor_slots WHERE slot = ? RETURNING payload")
            .bind(slot)
            .fetch_optional(pool)
            .await?;
    Ok(payload.map(|p| serde_json::from_str(&p)).transpose()?)
}

#[async_trait]
impl MonitorStore for Database {
    async fn save_health(&self, snapshot: &HealthSnapshot) -> StoreResult<()> {
        Ok(put(self.pool(), HEALTH_SLOT, snapshot).await?)
    }

    async fn load_health(&self) -> StoreResult<Option<HealthSnapshot>> {
        Ok(load(self.pool(), HEALTH_SLOT).await?)
    }

    async fn put_fallback_notice(&self, notice: &FallbackNotice) -> StoreResult<()> {
        Ok(put(self.pool(), NOTICE_SLOT, notice).await?)
    }

    async fn take_fallback_notice(&self) -> StoreResult<Option<FallbackNotice>> {
        Ok(take(self.pool(), NOTICE_SLOT).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_db;
    use catalog_core::{timestamp_now, HealthStatus, ModelHealthRecord, SpeedTier};

    #[tokio::test]
    async fn test_snapshot_replaced() {
        let db = test_db().await;
        assert!(db.load_health().await.unwrap().is_none());

        let record = ModelHealthRecord {
            model_id: "llama-3.1-8b-instant".to_string(),
            speed_tier: SpeedTier::Fast,
            status: HealthStatus::Fail,
            reason: Some("HTTP 503".to_string()),
            latency_ms: 120,
            checked_at: timestamp_now(),
        };
        let first = HealthSnapshot {
            records: vec![record.clone()],
            catalog_ok: false,
            checked_at: timestamp_now(),
        };
        db.save_health(&first).await.unwrap();

        let second = HealthSnapshot {
            records: vec![ModelHealthRecord {
                status: HealthStatus::Ok,
                reason: None,
                ..record
            }],
            catalog_ok: true,
            checked_at: timestamp_now(),
        };
        db.save_health(&second).await.unwrap();
        assert_eq!(db.load_health().await.unwrap(), Some(second));
    }

    #[tokio::test]
    async fn test_notice_outbox_keeps_latest_and_drains() {
        let db = test_db().await;
        let notice = |model: &str| FallbackNotice {
            model: model.to_string(),
            reason: "model decommissioned".to_string(),
            fallback: "llama-3.1-8b-instant".to_string(),
            time: timestamp_now(),
        };

        db.put_fallback_notice(&notice("gemma2-9b-it")).await.unwrap();
        db.put_fallback_notice(&notice("llama3-70b-8192")).await.unwrap();

        let taken = db.take_fallback_notice().await.unwrap().unwrap();
        assert_eq!(taken.model, "llama3-70b-8192");
        assert!(db.take_fallback_notice().await.unwrap().is_none());
    }
}
