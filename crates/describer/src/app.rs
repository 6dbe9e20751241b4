//! Wiring of the store, provider, pipeline and queue.

use std::sync::Arc;

use bulk_queue::{BulkQueue, QueueStores, TaskReceiver, TokioScheduler};
use catalog_core::settings::{keys, AUTO_MODEL};
use catalog_core::{ChatProvider, ConfigStore, Settings, StoreError};
use database::Database;
use generator::{AuditRecorder, DescriptionService, GenerationPipeline, HealthMonitor};
use groq_provider::{GroqClient, GroqClientConfig, ProviderRegistry};
use similarity::{Comparator, CosineComparator};
use tracing::info;

use crate::config::Config;

/// Everything a command needs.
pub struct App {
    pub db: Arc<Database>,
    pub registry: Arc<ProviderRegistry>,
    pub provider_name: String,
    pub service: DescriptionService,
    pub queue: Arc<BulkQueue>,
    pub health: Arc<HealthMonitor>,
    tasks: Option<TaskReceiver>,
}

impl App {
    pub async fn build(config: &Config) -> Result<Self, Box<dyn std::error::Error>> {
        let db = Arc::new(Database::connect(&config.database_url).await?);
        db.migrate().await?;

        if let Some(key) = &config.api_key {
            seed_api_key(db.as_ref(), key).await?;
        }

        let registry = Arc::new(ProviderRegistry::default());
        let provider_config = registry.get(&config.provider);
        let provider_name = provider_config.name.clone();
        let client: Arc<dyn ChatProvider> =
            Arc::new(GroqClient::new(GroqClientConfig::from_env(provider_config))?);

        let pipeline = Arc::new(GenerationPipeline::for_provider(
            client.clone(),
            db.clone(),
            db.clone(),
            db.clone(),
            registry.clone(),
            &provider_name,
        ));
        let comparator: Arc<dyn Comparator> = Arc::new(CosineComparator);

        let service = DescriptionService::new(
            pipeline.clone(),
            db.clone(),
            AuditRecorder::new(db.clone(), db.clone()),
            comparator.clone(),
        );

        // One-shot commands keep the receiver so scheduling succeeds; their
        // timers die with the process and the worker's resume picks the rows up.
        let (scheduler, tasks) = TokioScheduler::new();
        let queue = BulkQueue::new(
            QueueStores::shared(db.clone()),
            pipeline,
            Arc::new(scheduler),
            comparator,
        )
        .with_config(config.queue.clone());

        let health = HealthMonitor::new(
            client,
            registry.clone(),
            provider_name.clone(),
            db.clone(),
            db.clone(),
        );

        Ok(Self {
            db,
            registry,
            provider_name,
            service,
            queue: Arc::new(queue),
            health: Arc::new(health),
            tasks: Some(tasks),
        })
    }

    /// The scheduler's receiving end, for the worker loop.
    pub fn take_tasks(&mut self) -> Option<TaskReceiver> {
        self.tasks.take()
    }
}

/// Store `key` unless an API key is already configured.
async fn seed_api_key(store: &dyn ConfigStore, key: &str) -> Result<(), StoreError> {
    let settings = Settings::new(store);
    if settings.api_key().await?.is_none() {
        settings.set_api_key(key).await?;
        info!("API key seeded from environment");
    }
    Ok(())
}

/// Errors from `settings set`.
#[derive(Debug, thiserror::Error)]
pub enum SettingError {
    #[error("unknown setting '{0}'")]
    UnknownKey(String),

    #[error("invalid value for {key}: '{value}'")]
    InvalidValue { key: &'static str, value: String },

    #[error("unknown model '{0}', see `describer settings models`")]
    UnknownModel(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Validate and store one runtime setting.
pub async fn apply_setting(
    store: &dyn ConfigStore,
    registry: &ProviderRegistry,
    provider: &str,
    key: &str,
    value: &str,
) -> Result<(), SettingError> {
    let settings = Settings::new(store);
    let value = value.trim();

    match key {
        keys::API_KEY => settings.set_api_key(value).await?,
        keys::MODEL => {
            let known = value == AUTO_MODEL
                || registry
                    .ui_options(provider)
                    .iter()
                    .any(|option| option.id == value);
            if !known {
                return Err(SettingError::UnknownModel(value.to_string()));
            }
            settings.set_model_override(value).await?;
        }
        keys::DAILY_LIMIT => {
            let limit = value.parse().map_err(|_| SettingError::InvalidValue {
                key: keys::DAILY_LIMIT,
                value: value.to_string(),
            })?;
            settings.set_daily_limit(limit).await?;
        }
        keys::OVERWRITE => {
            let overwrite = value.parse().map_err(|_| SettingError::InvalidValue {
                key: keys::OVERWRITE,
                value: value.to_string(),
            })?;
            settings.set_overwrite(overwrite).await?;
        }
        other => return Err(SettingError::UnknownKey(other.to_string())),
    }

    info!(key, "setting updated");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use mock_provider::MemoryStore;

    #[tokio::test]
    async fn test_seed_keeps_existing_key() {
        let store = MemoryStore::new();
        seed_api_key(&store, "gsk_env").await.unwrap();
        assert_eq!(
            Settings::new(&store).api_key().await.unwrap().as_deref(),
            Some("gsk_env")
        );

        seed_api_key(&store, "gsk_other").await.unwrap();
        assert_eq!(
            Settings::new(&store).api_key().await.unwrap().as_deref(),
            Some("gsk_env")
        );
    }

    #[tokio::test]
    async fn test_apply_setting_validates() {
        let store = MemoryStore::new();
        let registry = ProviderRegistry::default();
        let settings = Settings::new(&store);

        apply_setting(&store, &registry, "groq", "daily_limit", "25")
            .await
            .unwrap();
        assert_eq!(settings.daily_limit().await.unwrap(), 25);

        apply_setting(&store, &registry, "groq", "overwrite", "true")
            .await
            .unwrap();
        assert!(settings.overwrite().await.unwrap());

        apply_setting(&store, &registry, "groq", "model", "llama-3.3-70b-versatile")
            .await
            .unwrap();
        assert_eq!(
            settings.model_override().await.unwrap(),
            "llama-3.3-70b-versatile"
        );

        assert!(matches!(
            apply_setting(&store, &registry, "groq", "model", "mixtral-8x7b-32768").await,
            Err(SettingError::UnknownModel(_))
        ));
        assert!(matches!(
            apply_setting(&store, &registry, "groq", "daily_limit", "-1").await,
            Err(SettingError::InvalidValue { .. })
        ));
        assert!(matches!(
            apply_setting(&store, &registry, "groq", "catalog_version", "x").await,
            Err(SettingError::UnknownKey(_))
        ));
    }
}
