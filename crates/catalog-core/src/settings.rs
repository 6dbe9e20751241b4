//! Typed access to the runtime settings kept in a [`ConfigStore`].

use crate::trait_def::{ConfigStore, StoreResult};

/// Setting keys.
pub mod keys {
    pub const API_KEY: &str = "api_key";
    pub const MODEL: &str = "model";
    pub const DAILY_LIMIT: &str = "daily_limit";
    pub const OVERWRITE: &str = "overwrite";
    pub const CATALOG_VERSION: &str = "catalog_version";
    pub const HEALTH_NOTICE_DISMISSED: &str = "health_notice_dismissed";
}

/// Model override value meaning "pick by tier".
pub const AUTO_MODEL: &str = "auto";

/// Default number of jobs that may be queued per day.
pub const DEFAULT_DAILY_LIMIT: u32 = 300;

/// Settings view over a config store.
pub struct Settings<'a> {
    store: &'a dyn ConfigStore,
}

impl<'a> Settings<'a> {
    pub fn new(store: &'a dyn ConfigStore) -> Self {
        Self { store }
    }

    async fn string_or(&self, key: &str, default: &str) -> StoreResult<String> {
        Ok(self
            .store
            .get(key)
            .await?
            .unwrap_or_else(|| default.to_string()))
    }

    async fn flag(&self, key: &str) -> StoreResult<bool> {
        Ok(self
            .store
            .get(key)
            .await?
            .map(|value| parse_flag(&value))
            .unwrap_or(false))
    }

    /// Configured API key, `None` when empty.
    pub async fn api_key(&self) -> StoreResult<Option<String>> {
        let key = self.string_or(keys::API_KEY, "").await?;
        let key = key.trim();
        Ok((!key.is_empty()).then(|| key.to_string()))
    }

    pub async fn set_api_key(&self, key: &str) -> StoreResult<()> {
        self.store.set(keys::API_KEY, key.trim()).await
    }

    /// Model override: `"auto"` or an explicit model id.
    pub async fn model_override(&self) -> StoreResult<String> {
        let model = self.string_or(keys::MODEL, AUTO_MODEL).await?;
        let model = model.trim();
        Ok(if model.is_empty() {
            AUTO_MODEL.to_string()
        } else {
            model.to_string()
        })
    }

    pub async fn set_model_override(&self, model: &str) -> StoreResult<()> {
        self.store.set(keys::MODEL, model).await
    }

    pub async fn daily_limit(&self) -> StoreResult<u32> {
        Ok(self
            .store
            .get(keys::DAILY_LIMIT)
            .await?
            .and_then(|value| value.trim().parse().ok())
            .unwrap_or(DEFAULT_DAILY_LIMIT))
    }

    pub async fn set_daily_limit(&self, limit: u32) -> StoreResult<()> {
        self.store.set(keys::DAILY_LIMIT, &limit.to_string()).await
    }

    /// Whether items with existing content may be regenerated in bulk.
    pub async fn overwrite(&self) -> StoreResult<bool> {
        self.flag(keys::OVERWRITE).await
    }

    pub async fn set_overwrite(&self, overwrite: bool) -> StoreResult<()> {
        self.store.set(keys::OVERWRITE, bool_str(overwrite)).await
    }

    pub async fn catalog_version(&self) -> StoreResult<String> {
        self.string_or(keys::CATALOG_VERSION, "").await
    }

    pub async fn set_catalog_version(&self, version: &str) -> StoreResult<()> {
        self.store.set(keys::CATALOG_VERSION, version).await
    }

    pub async fn notice_dismissed(&self) -> StoreResult<bool> {
        self.flag(keys::HEALTH_NOTICE_DISMISSED).await
    }

    pub async fn set_notice_dismissed(&self, dismissed: bool) -> StoreResult<()> {
        self.store
            .set(keys::HEALTH_NOTICE_DISMISSED, bool_str(dismissed))
            .await
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

fn bool_str(value: bool) -> &'static str {
    if value {
        "1"
    } else {
        "0"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    struct MapStore(Mutex<HashMap<String, String>>);

    #[async_trait]
    impl ConfigStore for MapStore {
        async fn get(&self, key: &str) -> StoreResult<Option<String>> {
            Ok(self.0.lock().unwrap().get(key).cloned())
        }

        async fn set(&self, key: &str, value: &str) -> StoreResult<()> {
            self.0
                .lock()
                .unwrap()
                .insert(key.to_string(), value.to_string());
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_defaults() {
        let store = MapStore::default();
        let settings = Settings::new(&store);

        assert_eq!(settings.api_key().await.unwrap(), None);
        assert_eq!(settings.model_override().await.unwrap(), AUTO_MODEL);
        assert_eq!(settings.daily_limit().await.unwrap(), DEFAULT_DAILY_LIMIT);
        assert!(!settings.overwrite().await.unwrap());
        assert!(!settings.notice_dismissed().await.unwrap());
    }

    #[tokio::test]
    async fn test_round_trip_values() {
        let store = MapStore::default();
        let settings = Settings::new(&store);

        settings.set_api_key("  gsk_test ").await.unwrap();
        settings.set_daily_limit(25).await.unwrap();
        settings.set_overwrite(true).await.unwrap();
        settings.set_model_override("llama-3.3-70b-versatile").await.unwrap();

        assert_eq!(settings.api_key().await.unwrap().as_deref(), Some("gsk_test"));
        assert_eq!(settings.daily_limit().await.unwrap(), 25);
        assert!(settings.overwrite().await.unwrap());
        assert_eq!(
            settings.model_override().await.unwrap(),
            "llama-3.3-70b-versatile"
        );
    }

    #[tokio::test]
    async fn test_garbage_daily_limit_uses_default() {
        let store = MapStore::default();
        store.set(keys::DAILY_LIMIT, "lots").await.unwrap();
        assert_eq!(
            Settings::new(&store).daily_limit().await.unwrap(),
            DEFAULT_DAILY_LIMIT
        );
    }
}
