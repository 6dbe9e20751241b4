//! Model health monitoring.
//!
//! [`HealthMonitor::run`] pings every current model of the provider with a
//! trivial prompt and replaces the stored snapshot. Failures re-arm the
//! operator notice; [`HealthMonitor::pending_notices`] hands them out together
//! with any undelivered fallback notice.

use std::sync::Arc;
use std::time::{Duration, Instant};

use catalog_core::{
    timestamp_now, ChatMessage, ChatProvider, ChatRequest, ConfigStore, FallbackNotice,
    HealthSnapshot, HealthStatus, ModelHealthRecord, MonitorStore, Settings, SpeedTier,
    StoreResult,
};
use futures::future::join_all;
use groq_provider::{classify, ProviderRegistry, CATALOG_VERSION};
use serde::Serialize;
use tracing::{info, warn};

/// Probe prompt; any non-empty completion counts as healthy.
pub const PROBE_PROMPT: &str = r#"Geef alleen dit JSON terug zonder uitleg: {"ok": true}"#;

pub const PROBE_MAX_TOKENS: u32 = 20;

pub const PROBE_TIMEOUT: Duration = Duration::from_secs(15);

/// How often the worker runs a health check.
pub const CHECK_INTERVAL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Reason recorded for every model when no key is configured.
pub const NO_API_KEY_REASON: &str = "No API key configured";

/// What the operator should be told about.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Notices {
    /// Failed models from the last snapshot, unless the notice was dismissed.
    pub failures: Vec<ModelHealthRecord>,
    /// Undelivered fallback notice, removed from the outbox by this read.
    pub fallback: Option<FallbackNotice>,
}

impl Notices {
    pub fn is_empty(&self) -> bool {
        self.failures.is_empty() && self.fallback.is_none()
    }
}

/// Periodic liveness check for the configured provider's models.
pub struct HealthMonitor {
    provider: Arc<dyn ChatProvider>,
    registry: Arc<ProviderRegistry>,
    provider_name: String,
    config: Arc<dyn ConfigStore>,
    monitor: Arc<dyn MonitorStore>,
}

impl HealthMonitor {
    pub fn new(
        provider: Arc<dyn ChatProvider>,
        registry: Arc<ProviderRegistry>,
        provider_name: impl Into<String>,
        config: Arc<dyn ConfigStore>,
        monitor: Arc<dyn MonitorStore>,
    ) -> Self {
        Self {
            provider,
            registry,
            provider_name: provider_name.into(),
            config,
            monitor,
        }
    }

    /// Probe every current model and store the snapshot.
    pub async fn run(&self) -> StoreResult<HealthSnapshot> {
        let settings = Settings::new(self.config.as_ref());
        let api_key = settings.api_key().await?;

        let models = self.registry.all_current_models(&self.provider_name);
        let records = join_all(
            models
                .into_iter()
                .map(|(speed, model)| self.probe(api_key.as_deref(), speed, model)),
        )
        .await;

        for record in &records {
            info!(
                model = %record.model_id,
                status = ?record.status,
                latency_ms = record.latency_ms,
                reason = record.reason.as_deref().unwrap_or(""),
                "health probe"
            );
        }

        let catalog_ok = self.reconcile_catalog_version(&settings).await?;
        let snapshot = HealthSnapshot {
            records,
            catalog_ok,
            checked_at: timestamp_now(),
        };
        self.monitor.save_health(&snapshot).await?;

        if snapshot.failures().next().is_some() {
            settings.set_notice_dismissed(false).await?;
        }

        Ok(snapshot)
    }

    /// Last stored snapshot.
    pub async fn latest(&self) -> StoreResult<Option<HealthSnapshot>> {
        self.monitor.load_health().await
    }

    /// Failures to show (unless dismissed) and the drained fallback notice.
    pub async fn pending_notices(&self) -> StoreResult<Notices> {
        let fallback = self.monitor.take_fallback_notice().await?;

        let dismissed = Settings::new(self.config.as_ref())
            .notice_dismissed()
            .await?;
        let failures = if dismissed {
            Vec::new()
        } else {
            self.latest()
                .await?
                .map(|snapshot| snapshot.failures().cloned().collect())
                .unwrap_or_default()
        };

        Ok(Notices { failures, fallback })
    }

    pub async fn dismiss_notice(&self) -> StoreResult<()> {
        Settings::new(self.config.as_ref())
            .set_notice_dismissed(true)
            .await
    }

    async fn probe(&self, api_key: Option<&str>, speed: SpeedTier, model: String) -> ModelHealthRecord {
        let Some(api_key) = api_key else {
            return record(model, speed, Err(NO_API_KEY_REASON.to_string()), 0);
        };

        let request = ChatRequest {
            api_key: api_key.to_string(),
            model: model.clone(),
            messages: vec![ChatMessage::user(PROBE_PROMPT)],
            temperature: None,
            max_tokens: PROBE_MAX_TOKENS,
            timeout: PROBE_TIMEOUT,
        };

        let started = Instant::now();
        let outcome = match self.provider.send(request).await {
            Ok(reply) => classify(&reply).map(|_| ()).map_err(|err| err.reason()),
            Err(err) => Err(err.to_string()),
        };
        let latency = started.elapsed().as_millis() as u64;

        record(model, speed, outcome, latency)
    }

    /// Compare the stored catalog version with the built-in one and store
    /// the built-in one.
    async fn reconcile_catalog_version(&self, settings: &Settings<'_>) -> StoreResult<bool> {
        let stored = settings.catalog_version().await?;
        if stored == CATALOG_VERSION {
            return Ok(true);
        }
        warn!(
            stored = %stored,
            current = CATALOG_VERSION,
            "model catalog version changed since last acknowledged"
        );
        settings.set_catalog_version(CATALOG_VERSION).await?;
        Ok(false)
    }
}

fn record(model: String, speed: SpeedTier, outcome: Result<(), String>, latency_ms: u64) -> ModelHealthRecord {
    let (status, reason) = match outcome {
        Ok(()) => (HealthStatus::Ok, None),
        Err(reason) => (HealthStatus::Fail, Some(reason)),
    };
    ModelHealthRecord {
        model_id: model,
        speed_tier: speed,
        status,
        reason,
        latency_ms,
        checked_at: timestamp_now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mock_provider::{fixtures, MemoryStore, ScriptedProvider};

    const FAST: &str = "llama-3.1-8b-instant";
    const QUALITY: &str = "llama-3.3-70b-versatile";

    fn monitor(store: &Arc<MemoryStore>, provider: &Arc<ScriptedProvider>) -> HealthMonitor {
        HealthMonitor::new(
            provider.clone(),
            Arc::new(ProviderRegistry::default()),
            "groq",
            store.clone(),
            store.clone(),
        )
    }

    async fn store_with_key() -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        Settings::new(store.as_ref())
            .set_api_key("gsk_test")
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn test_all_models_healthy() {
        let store = store_with_key().await;
        let provider = Arc::new(ScriptedProvider::always(fixtures::completion_reply(
            "{\"ok\": true}",
        )));

        let snapshot = monitor(&store, &provider).run().await.unwrap();
        assert_eq!(snapshot.records.len(), 2);
        assert!(snapshot.failures().next().is_none());

        let requests = provider.requests();
        assert!(requests.iter().all(|r| r.max_tokens == PROBE_MAX_TOKENS));
        assert!(requests.iter().all(|r| r.timeout == PROBE_TIMEOUT));
        assert!(requests.iter().all(|r| r.messages[0].content == PROBE_PROMPT));
        assert_eq!(store.load_health().await.unwrap(), Some(snapshot));
    }

    #[tokio::test]
    async fn test_failure_rearms_notice() {
        let store = store_with_key().await;
        let provider = Arc::new(ScriptedProvider::new());
        provider.push_for(QUALITY, fixtures::error_reply(404, "model not found"));
        provider.push_for(FAST, fixtures::completion_reply("{\"ok\": true}"));

        let monitor = monitor(&store, &provider);
        monitor.dismiss_notice().await.unwrap();

        let snapshot = monitor.run().await.unwrap();
        let failed: Vec<&ModelHealthRecord> = snapshot.failures().collect();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].model_id, QUALITY);
        assert_eq!(failed[0].reason.as_deref(), Some("model not found"));
        assert!(!Settings::new(store.as_ref()).notice_dismissed().await.unwrap());

        let notices = monitor.pending_notices().await.unwrap();
        assert_eq!(notices.failures.len(), 1);

        monitor.dismiss_notice().await.unwrap();
        assert!(monitor.pending_notices().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_empty_completion_fails_with_status_reason() {
        let store = store_with_key().await;
        let provider = Arc::new(ScriptedProvider::always(catalog_core::RawReply::new(502, "")));

        let snapshot = monitor(&store, &provider).run().await.unwrap();
        assert!(snapshot
            .records
            .iter()
            .all(|r| r.reason.as_deref() == Some("HTTP 502")));
    }

    #[tokio::test]
    async fn test_missing_key_skips_network() {
        let store = Arc::new(MemoryStore::new());
        let provider = Arc::new(ScriptedProvider::new());

        let snapshot = monitor(&store, &provider).run().await.unwrap();
        assert_eq!(provider.request_count(), 0);
        assert!(snapshot.records.iter().all(|r| {
            r.status == HealthStatus::Fail
                && r.reason.as_deref() == Some(NO_API_KEY_REASON)
                && r.latency_ms == 0
        }));
    }

    #[tokio::test]
    async fn test_catalog_version_reconciled() {
        let store = store_with_key().await;
        let provider = Arc::new(ScriptedProvider::always(fixtures::completion_reply("ok")));
        let monitor = monitor(&store, &provider);

        assert!(!monitor.run().await.unwrap().catalog_ok);
        assert!(monitor.run().await.unwrap().catalog_ok);

        Settings::new(store.as_ref())
            .set_catalog_version("2025.01")
            .await
            .unwrap();
        assert!(!monitor.run().await.unwrap().catalog_ok);
    }

    #[tokio::test]
    async fn test_fallback_notice_delivered_once() {
        let store = store_with_key().await;
        let provider = Arc::new(ScriptedProvider::new());
        store
            .put_fallback_notice(&FallbackNotice {
                model: QUALITY.to_string(),
                reason: "model not found".to_string(),
                fallback: FAST.to_string(),
                time: timestamp_now(),
            })
            .await
            .unwrap();

        let monitor = monitor(&store, &provider);
        monitor.dismiss_notice().await.unwrap();

        let first = monitor.pending_notices().await.unwrap();
        assert_eq!(first.fallback.map(|n| n.fallback).as_deref(), Some(FAST));
        assert!(monitor.pending_notices().await.unwrap().fallback.is_none());
    }
}
