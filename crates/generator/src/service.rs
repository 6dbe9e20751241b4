//! Single-item operator flows: preview, save, lock and tier.

use std::sync::Arc;

use catalog_core::{
    timestamp_now, AuditAction, AuditEvent, CatalogItem, CatalogStore, ContentError,
    GeneratedContent, ItemId, ItemStateUpdate, Mode, SimilarityVerdict, Tier, VerdictNote,
};
use serde::Serialize;
use similarity::Comparator;
use tracing::{info, warn};

use crate::audit::AuditRecorder;
use crate::pipeline::GenerationPipeline;

/// Input of [`DescriptionService::preview`].
#[derive(Debug, Clone, PartialEq)]
pub struct PreviewRequest {
    pub item_id: ItemId,
    pub tier: Tier,
    pub mode: Mode,
    /// Brand override stored on the item before generating.
    pub brand: Option<String>,
    pub actor: Option<String>,
}

impl PreviewRequest {
    pub fn new(item_id: ItemId, tier: Tier, mode: Mode) -> Self {
        Self {
            item_id,
            tier,
            mode,
            brand: None,
            actor: None,
        }
    }
}

/// Generated content next to what the catalog currently holds.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Preview {
    pub item_id: ItemId,
    pub generated: GeneratedContent,
    pub original: GeneratedContent,
    pub similarity: SimilarityVerdict,
    pub model_used: String,
    pub elapsed_ms: u64,
}

/// Human-approved content to persist.
#[derive(Debug, Clone, PartialEq)]
pub struct SaveRequest {
    pub item_id: ItemId,
    pub content: GeneratedContent,
    pub brand: Option<String>,
    pub tier: Tier,
    pub mode: Mode,
    /// Verdict shown with the preview; recorded as allow/0 when absent.
    pub similarity: Option<SimilarityVerdict>,
    pub actor: Option<String>,
}

/// Preview and save flows on top of the pipeline.
pub struct DescriptionService {
    pipeline: Arc<GenerationPipeline>,
    catalog: Arc<dyn CatalogStore>,
    recorder: AuditRecorder,
    comparator: Arc<dyn Comparator>,
}

impl DescriptionService {
    pub fn new(
        pipeline: Arc<GenerationPipeline>,
        catalog: Arc<dyn CatalogStore>,
        recorder: AuditRecorder,
        comparator: Arc<dyn Comparator>,
    ) -> Self {
        Self {
            pipeline,
            catalog,
            recorder,
            comparator,
        }
    }

    /// Generate content for review without touching the catalog content.
    ///
    /// Success writes a "previewed" audit event, a generation failure a
    /// "rejected" one carrying the error and response time.
    pub async fn preview(&self, request: PreviewRequest) -> Result<Preview, ContentError> {
        let mut item = self.unlocked_item(request.item_id).await?;

        if let Some(brand) = non_empty(request.brand.as_deref()) {
            self.catalog
                .update_item_state(
                    item.id,
                    ItemStateUpdate {
                        brand: Some(brand.to_string()),
                        ..Default::default()
                    },
                )
                .await?;
            item.state.brand = Some(brand.to_string());
        }

        let started = std::time::Instant::now();
        let result = self
            .pipeline
            .generate(&item, Some(request.tier), request.mode)
            .await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        let event = AuditEvent::new(item.id, item.product.title.clone(), AuditAction::Previewed)
            .tier(request.tier)
            .mode(request.mode)
            .actor(request.actor.clone())
            .response_time(elapsed_ms);

        let outcome = match result {
            Ok(outcome) => outcome,
            Err(err) => {
                self.recorder
                    .record(
                        AuditEvent {
                            action: AuditAction::Rejected,
                            ..event
                        }
                        .rejected_because(err.to_string()),
                    )
                    .await?;
                return Err(err);
            }
        };

        let similarity = self.similarity(&item, &outcome.content);
        self.recorder
            .record(
                event
                    .model(Some(outcome.model_used.clone()))
                    .similarity(&similarity)
                    .word_counts(&outcome.content),
            )
            .await?;

        Ok(Preview {
            item_id: item.id,
            generated: outcome.content,
            original: item.existing,
            similarity,
            model_used: outcome.model_used,
            elapsed_ms,
        })
    }

    /// Persist reviewed content. Returns the sanitized fields written.
    ///
    /// Edited text gets the same blocked-phrase scan as generated text; a
    /// hit is audited as "rejected" and nothing is written.
    pub async fn save(&self, request: SaveRequest) -> Result<GeneratedContent, ContentError> {
        let item = self.unlocked_item(request.item_id).await?;

        let content = content_guard::sanitize(&request.content);
        let blocked = content_guard::blocked_terms_in(&content);
        if !blocked.is_empty() {
            warn!(item_id = item.id, terms = ?blocked, "reviewed content contains blocked phrases");
            let err = ContentError::SafetyViolation(blocked);
            self.recorder
                .record(
                    AuditEvent::new(item.id, item.product.title.clone(), AuditAction::Rejected)
                        .tier(request.tier)
                        .mode(request.mode)
                        .word_counts(&content)
                        .actor(request.actor)
                        .rejected_because(err.to_string()),
                )
                .await?;
            return Err(err);
        }
        self.catalog.set_item_content(item.id, &content).await?;

        self.catalog
            .update_item_state(
                item.id,
                ItemStateUpdate {
                    brand: non_empty(request.brand.as_deref()).map(str::to_string),
                    last_generated_at: Some(timestamp_now()),
                    ai_status: Some("complete".to_string()),
                    ..Default::default()
                },
            )
            .await?;

        let similarity = request
            .similarity
            .unwrap_or_else(|| SimilarityVerdict::scored(0.0));
        self.recorder
            .record(
                AuditEvent::new(item.id, item.product.title.clone(), AuditAction::Saved)
                    .tier(request.tier)
                    .mode(request.mode)
                    .similarity(&similarity)
                    .word_counts(&content)
                    .actor(request.actor),
            )
            .await?;

        info!(item_id = item.id, "reviewed content saved");
        Ok(content)
    }

    /// Flip the item's lock. Returns the new state.
    pub async fn toggle_lock(&self, item_id: ItemId) -> Result<bool, ContentError> {
        let item = self.item(item_id).await?;
        let locked = !item.state.locked;
        self.catalog
            .update_item_state(
                item_id,
                ItemStateUpdate {
                    locked: Some(locked),
                    ..Default::default()
                },
            )
            .await?;
        info!(item_id, locked, "lock toggled");
        Ok(locked)
    }

    /// Store the tier used when a request does not name one.
    pub async fn set_tier(&self, item_id: ItemId, tier: Tier) -> Result<(), ContentError> {
        self.item(item_id).await?;
        self.catalog
            .update_item_state(
                item_id,
                ItemStateUpdate {
                    tier: Some(tier),
                    ..Default::default()
                },
            )
            .await?;
        Ok(())
    }

    /// Existing long text against the generated one, with title and brand as
    /// noise. Items without a description are never blocked.
    fn similarity(&self, item: &CatalogItem, generated: &GeneratedContent) -> SimilarityVerdict {
        if !item.has_existing_description() {
            return SimilarityVerdict::inconclusive(VerdictNote::NoExistingContent);
        }
        self.comparator.compare(
            item.existing.long_description.as_deref().unwrap_or_default(),
            generated.long_description.as_deref().unwrap_or_default(),
            &item.noise_tokens(),
        )
    }

    async fn item(&self, item_id: ItemId) -> Result<CatalogItem, ContentError> {
        self.catalog
            .get_item(item_id)
            .await?
            .ok_or(ContentError::ItemNotFound(item_id))
    }

    async fn unlocked_item(&self, item_id: ItemId) -> Result<CatalogItem, ContentError> {
        let item = self.item(item_id).await?;
        if item.state.locked {
            return Err(ContentError::ItemLocked(item_id));
        }
        Ok(item)
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use catalog_core::{AuditSink, Field, Settings, Zone};
    use groq_provider::ProviderRegistry;
    use mock_provider::{fixtures, MemoryStore, ScriptedProvider};
    use similarity::CosineComparator;

    struct FixedComparator(f64);

    impl Comparator for FixedComparator {
        fn compare(&self, _: &str, _: &str, _: &[String]) -> SimilarityVerdict {
            SimilarityVerdict::scored(self.0)
        }
    }

    async fn service(
        comparator: Arc<dyn Comparator>,
    ) -> (DescriptionService, Arc<MemoryStore>, Arc<ScriptedProvider>) {
        let store = Arc::new(MemoryStore::new());
        store.insert_item(fixtures::catalog_item(1, "Fietstas Classic", "Basil"));
        store.insert_item(fixtures::with_description(
            fixtures::catalog_item(2, "Fietstas Urban", "Basil"),
            "<p>Korte fietstas voor dagelijks gebruik.</p>",
        ));
        store.insert_item(fixtures::locked(fixtures::catalog_item(3, "Zadel", "Selle")));
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
        );
        let service = DescriptionService::new(
            Arc::new(pipeline),
            store.clone(),
            AuditRecorder::new(store.clone(), store.clone()),
            comparator,
        );
        (service, store, provider)
    }

    #[tokio::test]
    async fn test_preview_without_existing_text() {
        let (service, store, provider) = service(Arc::new(CosineComparator)).await;
        provider.push(fixtures::content_reply(&fixtures::valid_content()));

        let mut request = PreviewRequest::new(1, Tier::Mid, Mode::Full);
        request.brand = Some("Eigen Merk".to_string());
        let preview = service.preview(request).await.unwrap();

        assert_eq!(preview.similarity.zone, Zone::Allow);
        assert_eq!(preview.similarity.note, Some(VerdictNote::NoExistingContent));
        assert_eq!(preview.model_used, "llama-3.1-8b-instant");
        assert!(preview.original.is_empty());
        assert_eq!(store.content_writes(), 0);

        let state = store.item_state(1).await.unwrap();
        assert_eq!(state.brand.as_deref(), Some("Eigen Merk"));

        let events = store.audit_events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].action, AuditAction::Previewed);
        assert!(events[0].word_count_long >= 200);
        assert!(events[0].response_time_ms.is_some());
    }

    #[tokio::test]
    async fn test_preview_scores_existing_text() {
        let (service, store, provider) = service(Arc::new(FixedComparator(0.75))).await;
        provider.push(fixtures::content_reply(&fixtures::valid_content()));

        let preview = service
            .preview(PreviewRequest::new(2, Tier::Mid, Mode::Full))
            .await
            .unwrap();
        assert_eq!(preview.similarity.zone, Zone::Block);
        assert_eq!(preview.similarity.percent, 75);

        let events = store.audit_events();
        assert_eq!(events[0].similarity_zone, Some(Zone::Block));
        // A preview never overwrites the catalog, whatever the verdict.
        assert_eq!(
            store.content(2).unwrap().get(Field::Long),
            Some("<p>Korte fietstas voor dagelijks gebruik.</p>")
        );
    }

    #[tokio::test]
    async fn test_preview_failure_is_audited() {
        let (service, store, provider) = service(Arc::new(CosineComparator)).await;
        provider.push(fixtures::error_reply(429, "Rate limit reached"));

        let err = service
            .preview(PreviewRequest::new(1, Tier::Mid, Mode::Full))
            .await
            .unwrap_err();
        assert!(matches!(err, ContentError::RateLimited(_)));

        let events = store.audit_events();
        assert_eq!(events[0].action, AuditAction::Rejected);
        assert!(!events[0].safety_passed);
        assert!(events[0]
            .rejection_reason
            .as_deref()
            .unwrap()
            .contains("Rate limit reached"));
        assert!(events[0].response_time_ms.is_some());
    }

    #[tokio::test]
    async fn test_locked_and_missing_items() {
        let (service, store, provider) = service(Arc::new(CosineComparator)).await;

        let err = service
            .preview(PreviewRequest::new(3, Tier::Mid, Mode::Full))
            .await
            .unwrap_err();
        assert_eq!(err, ContentError::ItemLocked(3));

        let err = service
            .preview(PreviewRequest::new(77, Tier::Mid, Mode::Full))
            .await
            .unwrap_err();
        assert_eq!(err, ContentError::ItemNotFound(77));

        assert_eq!(provider.request_count(), 0);
        assert!(store.audit_events().is_empty());
    }

    #[tokio::test]
    async fn test_save_persists_sanitized_content() {
        let (service, store, _) = service(Arc::new(CosineComparator)).await;
        let content = GeneratedContent {
            short_description: Some("<p onclick=\"x()\">Kort</p><script>alert(1)</script>".to_string()),
            long_description: None,
            meta_description: Some("Meta <b>tekst</b>".to_string()),
        };

        let saved = service
            .save(SaveRequest {
                item_id: 1,
                content,
                brand: Some("Basil".to_string()),
                tier: Tier::Low,
                mode: Mode::Full,
                similarity: Some(SimilarityVerdict::scored(0.42)),
                actor: Some("editor".to_string()),
            })
            .await
            .unwrap();

        let stored = store.content(1).unwrap();
        assert_eq!(stored, saved);
        assert!(!stored.short_description.as_deref().unwrap().contains("script"));
        assert!(!stored.short_description.as_deref().unwrap().contains("onclick"));
        assert_eq!(stored.meta_description.as_deref(), Some("Meta tekst"));

        let state = store.item_state(1).await.unwrap();
        assert_eq!(state.ai_status.as_deref(), Some("complete"));
        assert_eq!(state.last_action, Some(AuditAction::Saved));
        assert_eq!(state.last_similarity, Some(0.42));

        let page = store
            .query(&Default::default(), 1, 10)
            .await
            .unwrap();
        assert_eq!(page.rows[0].event.action, AuditAction::Saved);
        assert_eq!(page.rows[0].event.actor_id.as_deref(), Some("editor"));
    }

    #[tokio::test]
    async fn test_save_rejects_blocked_phrases() {
        let (service, store, _) = service(Arc::new(CosineComparator)).await;
        let mut content = fixtures::valid_content();
        content.short_description = Some(format!(
            "{} Klinisch bewezen resultaat.",
            content.short_description.unwrap_or_default()
        ));

        let err = service
            .save(SaveRequest {
                item_id: 1,
                content,
                brand: None,
                tier: Tier::Mid,
                mode: Mode::Full,
                similarity: None,
                actor: Some("editor".to_string()),
            })
            .await
            .unwrap_err();
        assert_eq!(
            err,
            ContentError::SafetyViolation(vec!["klinisch bewezen".to_string()])
        );

        assert_eq!(store.content_writes(), 0);
        assert!(store.content(1).unwrap_or_default().is_empty());
        let state = store.item_state(1).await.unwrap();
        assert_eq!(state.ai_status, None);

        let events = store.audit_events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].action, AuditAction::Rejected);
        assert!(!events[0].safety_passed);
        assert!(events[0]
            .rejection_reason
            .as_deref()
            .unwrap()
            .contains("klinisch bewezen"));
    }

    #[tokio::test]
    async fn test_save_refuses_locked_item() {
        let (service, store, _) = service(Arc::new(CosineComparator)).await;
        let err = service
            .save(SaveRequest {
                item_id: 3,
                content: fixtures::valid_content(),
                brand: None,
                tier: Tier::Mid,
                mode: Mode::Full,
                similarity: None,
                actor: None,
            })
            .await
            .unwrap_err();
        assert_eq!(err, ContentError::ItemLocked(3));
        assert_eq!(store.content_writes(), 0);
    }

    #[tokio::test]
    async fn test_toggle_lock_and_tier() {
        let (service, store, _) = service(Arc::new(CosineComparator)).await;

        assert!(service.toggle_lock(1).await.unwrap());
        assert!(!service.toggle_lock(1).await.unwrap());
        assert_eq!(
            service.toggle_lock(99).await.unwrap_err(),
            ContentError::ItemNotFound(99)
        );

        service.set_tier(1, Tier::High).await.unwrap();
        assert_eq!(store.item_state(1).await.unwrap().tier, Some(Tier::High));
    }
}
