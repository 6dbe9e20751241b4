//! Key-value settings.

use catalog_core::{async_trait, ConfigStore, StoreResult};
use sqlx::SqlitePool;

use crate::{Database, Result};

pub async fn get_setting(pool: &SqlitePool, key: &str) -> Result<Option<String>> {
    let value = sqlx::query_scalar::<_, String>("SELECT value FROM settings WHERE key = ?")
        .bind(key)
        .fetch_optional(pool)
        .await?;
    Ok(value)
}

/// Create or update a setting.
pub async fn set_setting(pool: &SqlitePool, key: &str, value: &str) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO settings (key, value)
        VALUES (?, ?)
        ON CONFLICT(key) DO UPDATE SET
            value = excluded.value,
            updated_at = datetime('now')
        "#,
    )
    .bind(key)
    .bind(value)
    .execute(pool)
    .await?;

    Ok(())
}

#[async_trait]
impl ConfigStore for Database {
    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        Ok(get_setting(self.pool(), key).await?)
    }

    async fn set(&self, key: &str, value: &str) -> StoreResult<()> {
        Ok(set_setting(self.pool(), key, value).await?)
    }
}
