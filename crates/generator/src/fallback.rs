//! Fallback routing for model-level provider failures.
//!
//! A failure is model-level when its status is one of [`MODEL_ERROR_CODES`]
//! or the upstream message contains one of [`DEPRECATION_SIGNALS`]. Rate
//! limits, network trouble and server errors never switch models.

use std::sync::Arc;

use catalog_core::{
    timestamp_now, ConfigStore, FallbackNotice, MonitorStore, Settings, SpeedTier, StoreResult,
};
use groq_provider::api_types::error_message;
use groq_provider::ProviderRegistry;
use tracing::warn;

/// HTTP statuses that point at the model rather than the network.
pub const MODEL_ERROR_CODES: [u16; 3] = [400, 404, 410];

/// Upstream message fragments announcing a retired or unknown model.
pub const DEPRECATION_SIGNALS: [&str; 6] = [
    "model not found",
    "model has been deprecated",
    "no longer available",
    "decommissioned",
    "does not exist",
    "invalid model",
];

/// Whether a failed reply is a model-level problem.
pub fn is_model_error(status: u16, body: &str) -> bool {
    if MODEL_ERROR_CODES.contains(&status) {
        return true;
    }
    let message = error_message(body).unwrap_or_default().to_lowercase();
    DEPRECATION_SIGNALS
        .iter()
        .any(|signal| message.contains(signal))
}

/// Decides on a fallback model and leaves a notice for the operator.
pub struct FallbackRouter {
    registry: Arc<ProviderRegistry>,
    provider: String,
    config: Arc<dyn ConfigStore>,
    monitor: Arc<dyn MonitorStore>,
}

impl FallbackRouter {
    pub fn new(
        registry: Arc<ProviderRegistry>,
        provider: impl Into<String>,
        config: Arc<dyn ConfigStore>,
        monitor: Arc<dyn MonitorStore>,
    ) -> Self {
        Self {
            registry,
            provider: provider.into(),
            config,
            monitor,
        }
    }

    /// Fallback model for a failed reply, or `None` when the failure is not
    /// model-level.
    ///
    /// On a model-level failure the notice outbox receives the failure and a
    /// configured override equal to the failed model is reset to "auto".
    pub async fn handle(&self, status: u16, body: &str, attempted: &str) -> StoreResult<Option<String>> {
        if !is_model_error(status, body) {
            return Ok(None);
        }

        let reason = error_message(body).unwrap_or_else(|| format!("HTTP {}", status));
        let fallback = self
            .registry
            .model_for_speed(SpeedTier::Fast, &self.provider)
            .to_string();

        warn!(
            model = attempted,
            fallback = %fallback,
            reason = %reason,
            "model-level failure, switching to fallback model"
        );

        self.monitor
            .put_fallback_notice(&FallbackNotice {
                model: attempted.to_string(),
                reason,
                fallback: fallback.clone(),
                time: timestamp_now(),
            })
            .await?;

        let settings = Settings::new(self.config.as_ref());
        if settings.model_override().await? == attempted {
            settings
                .set_model_override(catalog_core::settings::AUTO_MODEL)
                .await?;
            warn!(model = attempted, "model override reset to auto");
        }

        Ok(Some(fallback))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use catalog_core::settings::AUTO_MODEL;
    use mock_provider::MemoryStore;

    fn router(store: &Arc<MemoryStore>) -> FallbackRouter {
        FallbackRouter::new(
            Arc::new(ProviderRegistry::default()),
            "groq",
            store.clone(),
            store.clone(),
        )
    }

    #[test]
    fn test_model_error_classification() {
        assert!(is_model_error(404, ""));
        assert!(is_model_error(410, "gone"));
        assert!(is_model_error(400, r#"{"error":{"message":"bad request"}}"#));
        assert!(is_model_error(
            422,
            r#"{"error":{"message":"The model `gemma2-9b-it` has been DECOMMISSIONED"}}"#
        ));
        assert!(!is_model_error(500, "Internal Server Error"));
        assert!(!is_model_error(401, r#"{"error":{"message":"Invalid API Key"}}"#));
        assert!(!is_model_error(429, r#"{"error":{"message":"Rate limit reached"}}"#));
    }

    #[tokio::test]
    async fn test_plain_server_error_has_no_fallback() {
        let store = Arc::new(MemoryStore::new());
        let result = router(&store)
            .handle(500, "Internal Server Error", "llama-3.3-70b-versatile")
            .await
            .unwrap();
        assert_eq!(result, None);
        assert!(store.take_fallback_notice().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_model_not_found_falls_back_to_fast_model() {
        let store = Arc::new(MemoryStore::new());
        let result = router(&store)
            .handle(
                404,
                r#"{"error":{"message":"model not found"}}"#,
                "llama-3.3-70b-versatile",
            )
            .await
            .unwrap();
        assert_eq!(result.as_deref(), Some("llama-3.1-8b-instant"));

        let notice = store.take_fallback_notice().await.unwrap().unwrap();
        assert_eq!(notice.model, "llama-3.3-70b-versatile");
        assert_eq!(notice.reason, "model not found");
        assert_eq!(notice.fallback, "llama-3.1-8b-instant");
        assert!(store.take_fallback_notice().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_matching_override_is_reset() {
        let store = Arc::new(MemoryStore::new());
        let settings = Settings::new(store.as_ref());
        settings.set_model_override("qwen/qwen3-32b").await.unwrap();

        router(&store)
            .handle(410, "", "qwen/qwen3-32b")
            .await
            .unwrap();
        assert_eq!(settings.model_override().await.unwrap(), AUTO_MODEL);
    }

    #[tokio::test]
    async fn test_other_override_is_kept() {
        let store = Arc::new(MemoryStore::new());
        let settings = Settings::new(store.as_ref());
        settings.set_model_override("qwen/qwen3-32b").await.unwrap();

        router(&store)
            .handle(404, "", "llama-3.3-70b-versatile")
            .await
            .unwrap();
        assert_eq!(settings.model_override().await.unwrap(), "qwen/qwen3-32b");
    }
}
