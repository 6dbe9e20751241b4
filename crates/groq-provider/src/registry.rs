//! Provider registry: endpoints, models per speed tier and retired models.
//!
//! This is the only place model ids are declared. The registry is a plain
//! value built at startup and passed to whatever needs it, so tests can
//! substitute their own catalog.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use catalog_core::SpeedTier;

/// Provider used when a lookup names an unknown provider.
pub const DEFAULT_PROVIDER: &str = "groq";

/// Version of the built-in model catalog. Bump whenever the catalog changes.
pub const CATALOG_VERSION: &str = "2026.02";

/// Groq's OpenAI-compatible chat completion endpoint.
pub const GROQ_ENDPOINT: &str = "https://api.groq.com/openai/v1/chat/completions";

/// How the API key is presented to the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthScheme {
    #[default]
    Bearer,
}

impl AuthScheme {
    /// Value for the `Authorization` header.
    pub fn header_value(&self, api_key: &str) -> String {
        match self {
            AuthScheme::Bearer => format!("Bearer {}", api_key),
        }
    }
}

/// Current model per speed tier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelTiers {
    pub fast: String,
    pub quality: String,
}

impl ModelTiers {
    pub fn get(&self, speed: SpeedTier) -> &str {
        match speed {
            SpeedTier::Fast => &self.fast,
            SpeedTier::Quality => &self.quality,
        }
    }
}

/// An entry of the model picker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelOption {
    pub id: String,
    pub label: String,
}

impl ModelOption {
    pub fn new(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
        }
    }
}

/// Static configuration of one provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderConfig {
    pub name: String,
    pub endpoint: String,
    pub auth: AuthScheme,
    /// Timeout for generation calls.
    pub timeout: Duration,
    pub models: ModelTiers,
    /// Retired model id to retirement note.
    pub deprecated: BTreeMap<String, String>,
    /// Explicit models an operator may pick besides "auto".
    pub selectable: Vec<ModelOption>,
}

impl ProviderConfig {
    /// The built-in Groq catalog.
    pub fn groq() -> Self {
        let deprecated = [
            ("mixtral-8x7b-32768", "Shutdown 2025-03-20"),
            ("llama3-8b-8192", "Shutdown 2025-08-30"),
            ("llama3-70b-8192", "Shutdown 2025-08-30"),
            ("gemma-7b-it", "Shutdown 2024-12-18"),
            ("gemma2-9b-it", "Shutdown 2025-10-08"),
        ]
        .into_iter()
        .map(|(id, note)| (id.to_string(), note.to_string()))
        .collect();

        Self {
            name: DEFAULT_PROVIDER.to_string(),
            endpoint: GROQ_ENDPOINT.to_string(),
            auth: AuthScheme::Bearer,
            timeout: Duration::from_secs(30),
            models: ModelTiers {
                fast: "llama-3.1-8b-instant".to_string(),
                quality: "llama-3.3-70b-versatile".to_string(),
            },
            deprecated,
            selectable: vec![
                ModelOption::new("llama-3.1-8b-instant", "llama-3.1-8b-instant - fastest, all tiers"),
                ModelOption::new(
                    "llama-3.3-70b-versatile",
                    "llama-3.3-70b-versatile - best quality, all tiers",
                ),
                ModelOption::new("qwen/qwen3-32b", "qwen/qwen3-32b - strong multilingual alternative"),
            ],
        }
    }

    /// Replace the endpoint (proxies, test servers).
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_model(mut self, speed: SpeedTier, model: impl Into<String>) -> Self {
        match speed {
            SpeedTier::Fast => self.models.fast = model.into(),
            SpeedTier::Quality => self.models.quality = model.into(),
        }
        self
    }

    /// Mark a model as retired.
    pub fn deprecate(mut self, model: impl Into<String>, note: impl Into<String>) -> Self {
        let model = model.into();
        self.selectable.retain(|option| option.id != model);
        self.deprecated.insert(model, note.into());
        self
    }
}

/// Lookup over the configured providers.
#[derive(Debug, Clone)]
pub struct ProviderRegistry {
    default: ProviderConfig,
    others: HashMap<String, ProviderConfig>,
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new(ProviderConfig::groq())
    }
}

impl ProviderRegistry {
    /// Registry whose default (and fallback) provider is `default`.
    pub fn new(default: ProviderConfig) -> Self {
        Self {
            default,
            others: HashMap::new(),
        }
    }

    pub fn with_provider(mut self, config: ProviderConfig) -> Self {
        if config.name == self.default.name {
            self.default = config;
        } else {
            self.others.insert(config.name.clone(), config);
        }
        self
    }

    /// Provider config by name; unknown names get the default provider.
    pub fn get(&self, provider: &str) -> &ProviderConfig {
        if provider == self.default.name {
            return &self.default;
        }
        self.others.get(provider).unwrap_or(&self.default)
    }

    pub fn default_provider(&self) -> &ProviderConfig {
        &self.default
    }

    /// Current model for a speed tier.
    pub fn model_for_speed(&self, speed: SpeedTier, provider: &str) -> &str {
        self.get(provider).models.get(speed)
    }

    pub fn is_deprecated(&self, model_id: &str, provider: &str) -> bool {
        self.get(provider).deprecated.contains_key(model_id)
    }

    pub fn deprecation_note(&self, model_id: &str, provider: &str) -> Option<&str> {
        self.get(provider).deprecated.get(model_id).map(String::as_str)
    }

    /// Current models, fast first.
    pub fn all_current_models(&self, provider: &str) -> Vec<(SpeedTier, String)> {
        let models = &self.get(provider).models;
        vec![
            (SpeedTier::Fast, models.fast.clone()),
            (SpeedTier::Quality, models.quality.clone()),
        ]
    }

    /// Picker entries: "auto" followed by every selectable, non-retired model.
    pub fn ui_options(&self, provider: &str) -> Vec<ModelOption> {
        let config = self.get(provider);
        let auto = ModelOption::new(
            catalog_core::settings::AUTO_MODEL,
            format!(
                "Auto - {} for bulk, {} for high tier (recommended)",
                config.models.fast, config.models.quality
            ),
        );

        std::iter::once(auto)
            .chain(
                config
                    .selectable
                    .iter()
                    .filter(|option| !config.deprecated.contains_key(&option.id))
                    .cloned(),
            )
            .collect()
    }
}
