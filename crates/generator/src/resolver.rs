//! Model resolution: which model id serves a request.

use std::sync::Arc;

use catalog_core::settings::AUTO_MODEL;
use catalog_core::{CatalogStore, ConfigStore, ItemId, Settings, SpeedTier, StoreResult, Tier};
use groq_provider::ProviderRegistry;
use tracing::warn;

/// Model and tier picked for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub model: String,
    pub tier: Tier,
}

/// Picks a model from the configured override or the content tier.
pub struct ModelResolver {
    registry: Arc<ProviderRegistry>,
    provider: String,
    config: Arc<dyn ConfigStore>,
    catalog: Arc<dyn CatalogStore>,
}

impl ModelResolver {
    pub fn new(
        registry: Arc<ProviderRegistry>,
        provider: impl Into<String>,
        config: Arc<dyn ConfigStore>,
        catalog: Arc<dyn CatalogStore>,
    ) -> Self {
        Self {
            registry,
            provider: provider.into(),
            config,
            catalog,
        }
    }

    /// Resolve the model for an item.
    ///
    /// Without an explicit tier the item's stored tier is used (default mid).
    /// A configured override wins unless the registry lists it as retired.
    pub async fn resolve(&self, item_id: ItemId, requested: Option<Tier>) -> StoreResult<Resolution> {
        let tier = match requested {
            Some(tier) => tier,
            None => self.catalog.item_state(item_id).await?.tier_or_default(),
        };

        let configured = Settings::new(self.config.as_ref()).model_override().await?;
        let model = self.pick(&configured, tier);

        Ok(Resolution { model, tier })
    }

    /// Model for a tier given the configured override.
    pub fn pick(&self, configured: &str, tier: Tier) -> String {
        if configured != AUTO_MODEL {
            if !self.registry.is_deprecated(configured, &self.provider) {
                return configured.to_string();
            }
            warn!(
                model = configured,
                note = self
                    .registry
                    .deprecation_note(configured, &self.provider)
                    .unwrap_or_default(),
                "configured model is retired, using automatic selection"
            );
        }
        self.auto_model(tier).to_string()
    }

    /// Quality model for high tier, fast model otherwise.
    pub fn auto_model(&self, tier: Tier) -> &str {
        let speed = match tier {
            Tier::High => SpeedTier::Quality,
            Tier::Mid | Tier::Low => SpeedTier::Fast,
        };
        self.registry.model_for_speed(speed, &self.provider)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use catalog_core::ItemStateUpdate;
    use mock_provider::MemoryStore;

    const FAST: &str = "llama-3.1-8b-instant";
    const QUALITY: &str = "llama-3.3-70b-versatile";

    fn resolver(store: &Arc<MemoryStore>) -> ModelResolver {
        ModelResolver::new(
            Arc::new(ProviderRegistry::default()),
            "groq",
            store.clone(),
            store.clone(),
        )
    }

    #[tokio::test]
    async fn test_auto_by_tier() {
        let store = Arc::new(MemoryStore::new());
        let resolver = resolver(&store);

        assert_eq!(resolver.resolve(1, Some(Tier::High)).await.unwrap().model, QUALITY);
        assert_eq!(resolver.resolve(1, Some(Tier::Mid)).await.unwrap().model, FAST);
        assert_eq!(resolver.resolve(1, Some(Tier::Low)).await.unwrap().model, FAST);
    }

    #[tokio::test]
    async fn test_stored_tier_used_when_not_requested() {
        let store = Arc::new(MemoryStore::new());
        let resolver = resolver(&store);

        let resolution = resolver.resolve(5, None).await.unwrap();
        assert_eq!(resolution.tier, Tier::Mid);
        assert_eq!(resolution.model, FAST);

        store
            .update_item_state(
                5,
                ItemStateUpdate {
                    tier: Some(Tier::High),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        let resolution = resolver.resolve(5, None).await.unwrap();
        assert_eq!(resolution.tier, Tier::High);
        assert_eq!(resolution.model, QUALITY);
    }

    #[tokio::test]
    async fn test_explicit_override() {
        let store = Arc::new(MemoryStore::new());
        Settings::new(store.as_ref())
            .set_model_override("qwen/qwen3-32b")
            .await
            .unwrap();

        let resolution = resolver(&store).resolve(1, Some(Tier::High)).await.unwrap();
        assert_eq!(resolution.model, "qwen/qwen3-32b");
    }

    #[tokio::test]
    async fn test_retired_override_is_never_returned() {
        let store = Arc::new(MemoryStore::new());
        let registry = ProviderRegistry::default();
        let resolver = resolver(&store);

        for retired in ["gemma-7b-it", "mixtral-8x7b-32768", "llama3-70b-8192"] {
            Settings::new(store.as_ref())
                .set_model_override(retired)
                .await
                .unwrap();
            for tier in [Tier::Low, Tier::Mid, Tier::High] {
                let model = resolver.resolve(1, Some(tier)).await.unwrap().model;
                assert!(!registry.is_deprecated(&model, "groq"));
                assert_eq!(model, resolver.auto_model(tier));
            }
        }
    }
}
