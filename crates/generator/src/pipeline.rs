//! The generation pipeline: one provider round trip per item, with fallback,
//! repair and validation.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use catalog_core::{
    hash_prompt, CatalogItem, CatalogStore, ChatMessage, ChatProvider, ChatRequest, ConfigStore,
    ContentError, GeneratedContent, ItemId, ItemStateUpdate, Mode, MonitorStore, ProductAttributes,
    Settings, Tier, TransportError,
};
use content_guard::GuardError;
use groq_provider::{classify, ProviderRegistry, ReplyError, DEFAULT_PROVIDER};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{debug, info, warn};

use crate::budget::{max_tokens, TEMPERATURE};
use crate::fallback::FallbackRouter;
use crate::prompt::{self, Prompts};
use crate::repair::{extract_content, RepairStrategy};
use crate::resolver::ModelResolver;

/// A validated generation result.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationOutcome {
    /// Sanitized fields for the requested mode.
    pub content: GeneratedContent,
    /// Model that produced the content, after any fallback.
    pub model_used: String,
    pub tier: Tier,
    /// Time spent waiting on the provider, including a fallback retry.
    pub elapsed: Duration,
    pub repair: RepairStrategy,
}

/// Why a single provider call produced no completion.
enum CallFailure {
    Transport(TransportError),
    Reply(ReplyError),
}

impl CallFailure {
    fn reason(&self) -> String {
        match self {
            CallFailure::Transport(err) => err.to_string(),
            CallFailure::Reply(err) => err.reason(),
        }
    }

    fn into_content_error(self) -> ContentError {
        match self {
            CallFailure::Transport(err) => ContentError::Transient(err.to_string()),
            CallFailure::Reply(err) => err.into_content_error(),
        }
    }
}

/// Generates description content for catalog items.
///
/// Nothing is written to the catalog except the item's `last_model`, so a
/// caller can run the pipeline to preview output.
pub struct GenerationPipeline {
    provider: Arc<dyn ChatProvider>,
    catalog: Arc<dyn CatalogStore>,
    config: Arc<dyn ConfigStore>,
    registry: Arc<ProviderRegistry>,
    provider_name: String,
    resolver: ModelResolver,
    router: FallbackRouter,
    rng: Mutex<StdRng>,
}

impl GenerationPipeline {
    /// Create a pipeline for the default provider of `registry`.
    pub fn new(
        provider: Arc<dyn ChatProvider>,
        catalog: Arc<dyn CatalogStore>,
        config: Arc<dyn ConfigStore>,
        monitor: Arc<dyn MonitorStore>,
        registry: Arc<ProviderRegistry>,
    ) -> Self {
        Self::for_provider(provider, catalog, config, monitor, registry, DEFAULT_PROVIDER)
    }

    /// Create a pipeline for a named registry entry.
    pub fn for_provider(
        provider: Arc<dyn ChatProvider>,
        catalog: Arc<dyn CatalogStore>,
        config: Arc<dyn ConfigStore>,
        monitor: Arc<dyn MonitorStore>,
        registry: Arc<ProviderRegistry>,
        provider_name: &str,
    ) -> Self {
        let provider_name = registry.get(provider_name).name.clone();
        let fingerprint = hash_prompt(&prompt::system_prompt());
        info!(
            provider = %provider_name,
            client = provider.name(),
            system_prompt = &fingerprint[..12],
            "generation pipeline ready"
        );

        Self {
            resolver: ModelResolver::new(
                registry.clone(),
                provider_name.clone(),
                config.clone(),
                catalog.clone(),
            ),
            router: FallbackRouter::new(registry.clone(), provider_name.clone(), config.clone(), monitor),
            provider,
            catalog,
            config,
            registry,
            provider_name,
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Pin the subheading rotation for reproducible prompts.
    pub fn with_seed(self, seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
            ..self
        }
    }

    pub fn resolver(&self) -> &ModelResolver {
        &self.resolver
    }

    /// Generate content for an item loaded from the catalog.
    pub async fn run(
        &self,
        item_id: ItemId,
        tier: Option<Tier>,
        mode: Mode,
    ) -> Result<GenerationOutcome, ContentError> {
        let item = self
            .catalog
            .get_item(item_id)
            .await?
            .ok_or(ContentError::ItemNotFound(item_id))?;
        self.generate(&item, tier, mode).await
    }

    /// Generate content for an item the caller already loaded.
    ///
    /// Without an explicit tier the item's stored tier is used.
    pub async fn generate(
        &self,
        item: &CatalogItem,
        tier: Option<Tier>,
        mode: Mode,
    ) -> Result<GenerationOutcome, ContentError> {
        let api_key = Settings::new(self.config.as_ref())
            .api_key()
            .await?
            .ok_or(ContentError::NoApiKey)?;

        let mut product = item.product.clone();
        product.brand = item.effective_brand().to_string();

        let resolution = self.resolver.resolve(item.id, tier).await?;
        let prompts = self.compose(&product, resolution.tier, mode);

        let started = Instant::now();
        let (text, model_used) = self
            .complete(&api_key, &resolution.model, &prompts, resolution.tier, mode)
            .await?;
        let elapsed = started.elapsed();

        let (content, repair) = extract_content(&text, mode).inspect_err(|err| {
            warn!(item_id = item.id, model = %model_used, error = %err, "unparseable model output");
        })?;
        if repair != RepairStrategy::Direct {
            info!(item_id = item.id, strategy = %repair, "model output needed repair");
        }

        self.catalog
            .update_item_state(
                item.id,
                ItemStateUpdate {
                    last_model: Some(model_used.clone()),
                    ..Default::default()
                },
            )
            .await?;

        let content = content_guard::validate(&content, resolution.tier).map_err(|err| {
            match &err {
                GuardError::SafetyViolation(terms) => {
                    warn!(item_id = item.id, terms = ?terms, "safety violation")
                }
                GuardError::QualityFloor(rules) => {
                    warn!(item_id = item.id, rules = ?rules, "quality floor not met")
                }
            }
            ContentError::from(err)
        })?;

        debug!(
            item_id = item.id,
            model = %model_used,
            elapsed_ms = elapsed.as_millis() as u64,
            "generation succeeded"
        );

        Ok(GenerationOutcome {
            content,
            model_used,
            tier: resolution.tier,
            elapsed,
            repair,
        })
    }

    fn compose(&self, product: &ProductAttributes, tier: Tier, mode: Mode) -> Prompts {
        let mut rng = self.rng.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        prompt::build(product, tier, mode, &mut *rng)
    }

    /// Call the provider, retrying once on a fallback model when the first
    /// failure is model-level. Returns the completion text and the model that
    /// produced it.
    async fn complete(
        &self,
        api_key: &str,
        model: &str,
        prompts: &Prompts,
        tier: Tier,
        mode: Mode,
    ) -> Result<(String, String), ContentError> {
        let failure = match self.call(api_key, model, prompts, tier, mode).await {
            Ok(text) => return Ok((text, model.to_string())),
            Err(failure) => failure,
        };

        let (status, message, body) = match failure {
            CallFailure::Reply(ReplyError::Failed {
                status,
                message,
                body,
            }) => (status, message, body),
            other => {
                let err = other.into_content_error();
                warn!(model, error = %err, "provider call failed");
                return Err(err);
            }
        };

        match self.router.handle(status, &body, model).await? {
            None => {
                let err = ReplyError::Failed { status, message, body }.into_content_error();
                warn!(model, error = %err, "provider call failed");
                Err(err)
            }
            Some(fallback) if fallback == model => Err(ContentError::ModelError {
                model: model.to_string(),
                fallback: None,
                message,
            }),
            Some(fallback) => {
                info!(model, fallback = %fallback, "retrying with fallback model");
                match self.call(api_key, &fallback, prompts, tier, mode).await {
                    Ok(text) => Ok((text, fallback)),
                    Err(retry) => {
                        warn!(model, fallback = %fallback, reason = %retry.reason(), "fallback model failed too");
                        Err(ContentError::ModelError {
                            model: model.to_string(),
                            fallback: Some(fallback),
                            message: retry.reason(),
                        })
                    }
                }
            }
        }
    }

    async fn call(
        &self,
        api_key: &str,
        model: &str,
        prompts: &Prompts,
        tier: Tier,
        mode: Mode,
    ) -> Result<String, CallFailure> {
        let request = ChatRequest {
            api_key: api_key.to_string(),
            model: model.to_string(),
            messages: vec![
                ChatMessage::system(prompts.system.clone()),
                ChatMessage::user(prompts.user.clone()),
            ],
            temperature: Some(TEMPERATURE),
            max_tokens: max_tokens(tier, mode),
            timeout: self.registry.get(&self.provider_name).timeout,
        };

        let reply = self
            .provider
            .send(request)
            .await
            .map_err(CallFailure::Transport)?;
        classify(&reply).map_err(CallFailure::Reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use catalog_core::settings::AUTO_MODEL;
    use catalog_core::{Field, MonitorStore};
    use mock_provider::{fixtures, MemoryStore, ScriptedProvider};

    const FAST: &str = "llama-3.1-8b-instant";
    const QUALITY: &str = "llama-3.3-70b-versatile";

    struct Harness {
        store: Arc<MemoryStore>,
        provider: Arc<ScriptedProvider>,
        pipeline: GenerationPipeline,
    }

    async fn harness() -> Harness {
        let store = Arc::new(MemoryStore::new());
        store.insert_item(fixtures::catalog_item(1, "Fietstas Classic", "Basil"));
        Settings::new(store.as_ref())
            .set_api_key("gsk_test")
            .await
            .unwrap();

        let provider = Arc::new(ScriptedProvider::new());
        let pipeline = GenerationPipeline::new(
            provider.clone(),
            store.clone(),
            store.clone(),
            store.clone(),
            Arc::new(ProviderRegistry::default()),
        )
        .with_seed(3);

        Harness {
            store,
            provider,
            pipeline,
        }
    }

    #[tokio::test]
    async fn test_missing_api_key() {
        let h = harness().await;
        Settings::new(h.store.as_ref()).set_api_key("").await.unwrap();

        let err = h.pipeline.run(1, Some(Tier::Mid), Mode::Full).await.unwrap_err();
        assert_eq!(err, ContentError::NoApiKey);
        assert_eq!(h.provider.request_count(), 0);
    }

    #[tokio::test]
    async fn test_missing_item() {
        let h = harness().await;
        let err = h.pipeline.run(404, None, Mode::Full).await.unwrap_err();
        assert_eq!(err, ContentError::ItemNotFound(404));
    }

    #[tokio::test]
    async fn test_success_records_model_and_sends_budget() {
        let h = harness().await;
        h.provider.push(fixtures::content_reply(&fixtures::valid_content()));

        let outcome = h.pipeline.run(1, Some(Tier::High), Mode::Full).await.unwrap();
        assert_eq!(outcome.model_used, QUALITY);
        assert_eq!(outcome.tier, Tier::High);
        assert_eq!(outcome.repair, RepairStrategy::Direct);
        assert!(outcome.content.get(Field::Long).unwrap().contains("<h3>"));

        let request = &h.provider.requests()[0];
        assert_eq!(request.max_tokens, 1800);
        assert_eq!(request.temperature, Some(TEMPERATURE));
        assert_eq!(request.messages.len(), 2);
        assert_eq!(request.messages[0].role, "system");
        assert_eq!(request.timeout, Duration::from_secs(30));

        let state = h.store.item_state(1).await.unwrap();
        assert_eq!(state.last_model.as_deref(), Some(QUALITY));
        // Previewing never touches catalog content.
        assert_eq!(h.store.content_writes(), 0);
    }

    #[tokio::test]
    async fn test_brand_override_reaches_prompt() {
        let h = harness().await;
        h.store
            .update_item_state(
                1,
                ItemStateUpdate {
                    brand: Some("Eigen Merk".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        h.provider.push(fixtures::content_reply(&fixtures::valid_content()));

        h.pipeline.run(1, None, Mode::Full).await.unwrap();
        assert!(h.provider.requests()[0].messages[1]
            .content
            .contains("Merk: Eigen Merk"));
    }

    #[tokio::test]
    async fn test_rate_limit_is_not_retried() {
        let h = harness().await;
        h.provider.push(fixtures::error_reply(429, "Rate limit reached"));

        let err = h.pipeline.run(1, Some(Tier::Mid), Mode::Full).await.unwrap_err();
        assert!(matches!(err, ContentError::RateLimited(_)));
        assert_eq!(h.provider.request_count(), 1);
        assert!(h.store.take_fallback_notice().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_server_error_is_transient_without_fallback() {
        let h = harness().await;
        h.provider
            .push(catalog_core::RawReply::new(500, "Internal Server Error"));

        let err = h.pipeline.run(1, Some(Tier::High), Mode::Full).await.unwrap_err();
        assert!(err.is_transient());
        assert_eq!(h.provider.models_called(), vec![QUALITY]);
    }

    #[tokio::test]
    async fn test_network_error_is_transient() {
        let h = harness().await;
        h.provider
            .push_error(TransportError::Network("connection refused".to_string()));

        let err = h.pipeline.run(1, Some(Tier::Mid), Mode::Full).await.unwrap_err();
        assert!(matches!(err, ContentError::Transient(_)));
    }

    #[tokio::test]
    async fn test_model_error_falls_back_once() {
        let h = harness().await;
        Settings::new(h.store.as_ref())
            .set_model_override("qwen/qwen3-32b")
            .await
            .unwrap();
        h.provider
            .push_for("qwen/qwen3-32b", fixtures::error_reply(404, "model not found"));
        h.provider
            .push_for(FAST, fixtures::content_reply(&fixtures::valid_content()));

        let outcome = h.pipeline.run(1, Some(Tier::High), Mode::Full).await.unwrap();
        assert_eq!(outcome.model_used, FAST);
        assert_eq!(h.provider.models_called(), vec!["qwen/qwen3-32b", FAST]);

        let state = h.store.item_state(1).await.unwrap();
        assert_eq!(state.last_model.as_deref(), Some(FAST));
        assert_eq!(
            Settings::new(h.store.as_ref()).model_override().await.unwrap(),
            AUTO_MODEL
        );
        let notice = h.store.take_fallback_notice().await.unwrap().unwrap();
        assert_eq!(notice.model, "qwen/qwen3-32b");
    }

    #[tokio::test]
    async fn test_failed_fallback_names_both_models() {
        let h = harness().await;
        h.provider
            .push_for(QUALITY, fixtures::error_reply(410, "model has been deprecated"));
        h.provider
            .push_for(FAST, fixtures::error_reply(503, "overloaded"));

        match h.pipeline.run(1, Some(Tier::High), Mode::Full).await.unwrap_err() {
            ContentError::ModelError {
                model,
                fallback,
                message,
            } => {
                assert_eq!(model, QUALITY);
                assert_eq!(fallback.as_deref(), Some(FAST));
                assert_eq!(message, "overloaded");
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(h.provider.request_count(), 2);
    }

    #[tokio::test]
    async fn test_fast_model_failure_does_not_retry_itself() {
        let h = harness().await;
        h.provider
            .push_for(FAST, fixtures::error_reply(404, "model not found"));

        let err = h.pipeline.run(1, Some(Tier::Low), Mode::Full).await.unwrap_err();
        assert!(matches!(err, ContentError::ModelError { fallback: None, .. }));
        assert_eq!(h.provider.request_count(), 1);
    }

    #[tokio::test]
    async fn test_truncated_output_is_repaired() {
        let h = harness().await;
        let meta = fixtures::valid_content().meta_description.unwrap();
        let truncated = format!("{{\"meta_description\": \"{}", meta);
        h.provider.push(fixtures::completion_reply(&truncated));

        let outcome = h.pipeline.run(1, None, Mode::MetaOnly).await.unwrap();
        assert_eq!(outcome.repair, RepairStrategy::ClosedString);
        assert_eq!(outcome.content.get(Field::Meta), Some(meta.as_str()));
        assert_eq!(outcome.content.get(Field::Short), None);
        assert_eq!(h.provider.requests()[0].max_tokens, 300);
    }

    #[tokio::test]
    async fn test_unparseable_output() {
        let h = harness().await;
        h.provider
            .push(fixtures::completion_reply("Ik kan hier geen JSON van maken."));

        let err = h.pipeline.run(1, None, Mode::Full).await.unwrap_err();
        assert_eq!(err.kind(), "parse_error");
    }

    #[tokio::test]
    async fn test_safety_violation() {
        let h = harness().await;
        let mut content = fixtures::valid_content();
        content.short_description = Some(format!(
            "<p>{} Klinisch bewezen resultaat.</p>",
            fixtures::filler_words(40)
        ));
        h.provider.push(fixtures::content_reply(&content));

        match h.pipeline.run(1, None, Mode::Full).await.unwrap_err() {
            ContentError::SafetyViolation(terms) => {
                assert_eq!(terms, vec!["klinisch bewezen".to_string()])
            }
            other => panic!("unexpected {:?}", other),
        }
        // The model is recorded even when validation rejects the output.
        assert!(h.store.item_state(1).await.unwrap().last_model.is_some());
    }

    #[tokio::test]
    async fn test_quality_floor_lists_every_rule() {
        let h = harness().await;
        let content = GeneratedContent {
            short_description: Some("<p>Te kort.</p>".to_string()),
            long_description: Some("<p>Ook te kort en zonder koppen.</p>".to_string()),
            meta_description: Some("Kort".to_string()),
        };
        h.provider.push(fixtures::content_reply(&content));

        match h.pipeline.run(1, Some(Tier::Mid), Mode::Full).await.unwrap_err() {
            ContentError::QualityFloor(rules) => assert_eq!(rules.len(), 4),
            other => panic!("unexpected {:?}", other),
        }
    }
}
