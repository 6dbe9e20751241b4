//! Configuration for the Groq HTTP client.

use std::env;
use std::time::Duration;

use crate::registry::{AuthScheme, ProviderConfig, GROQ_ENDPOINT};

/// Configuration for [`crate::GroqClient`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroqClientConfig {
    /// Chat completion endpoint.
    pub endpoint: String,

    /// How the API key is sent.
    pub auth: AuthScheme,

    /// TCP connect timeout. The per-request timeout travels with each request.
    pub connect_timeout: Duration,

    /// User-Agent header.
    pub user_agent: String,
}

impl Default for GroqClientConfig {
    fn default() -> Self {
        Self {
            endpoint: GROQ_ENDPOINT.to_string(),
            auth: AuthScheme::Bearer,
            connect_timeout: Duration::from_secs(10),
            user_agent: concat!("describer/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl GroqClientConfig {
    /// Client settings matching a registry entry.
    pub fn for_provider(provider: &ProviderConfig) -> Self {
        Self {
            endpoint: provider.endpoint.clone(),
            auth: provider.auth,
            ..Self::default()
        }
    }

    /// Create configuration from environment variables.
    ///
    /// Optional environment variables:
    /// - `GROQ_API_URL` - endpoint override (default: the registry endpoint)
    /// - `GROQ_CONNECT_TIMEOUT_SECS` - connect timeout (default: 10)
    pub fn from_env(provider: &ProviderConfig) -> Self {
        let mut config = Self::for_provider(provider);

        if let Ok(url) = env::var("GROQ_API_URL") {
            if !url.trim().is_empty() {
                config.endpoint = url.trim().to_string();
            }
        }

        if let Some(secs) = env::var("GROQ_CONNECT_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
        {
            config.connect_timeout = Duration::from_secs(secs);
        }

        config
    }

    /// Create a new config builder.
    pub fn builder() -> GroqClientConfigBuilder {
        GroqClientConfigBuilder::default()
    }
}

/// Builder for GroqClientConfig.
#[derive(Debug, Default)]
pub struct GroqClientConfigBuilder {
    config: GroqClientConfig,
}

impl GroqClientConfigBuilder {
    /// Set the endpoint URL.
    pub fn endpoint(mut self, url: impl Into<String>) -> Self {
        self.config.endpoint = url.into();
        self
    }

    /// Set the connect timeout.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    /// Set the User-Agent header.
    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.config.user_agent = agent.into();
        self
    }

    /// Build the configuration.
    pub fn build(self) -> GroqClientConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = GroqClientConfig::default();
        assert_eq!(config.endpoint, GROQ_ENDPOINT);
        assert_eq!(config.auth, AuthScheme::Bearer);
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_builder_all_options() {
        let config = GroqClientConfig::builder()
            .endpoint("http://localhost:9999/v1/chat/completions")
            .connect_timeout(Duration::from_secs(2))
            .user_agent("test")
            .build();

        assert_eq!(config.endpoint, "http://localhost:9999/v1/chat/completions");
        assert_eq!(config.connect_timeout, Duration::from_secs(2));
        assert_eq!(config.user_agent, "test");
    }

    // Environment-based scenarios share one test because env vars are
    // process-global.
    #[test]
    fn test_from_env_scenarios() {
        use std::sync::Mutex;
        static ENV_LOCK: Mutex<()> = Mutex::new(());
        let _guard = ENV_LOCK.lock().unwrap();

        let provider = ProviderConfig::groq().with_endpoint("https://proxy.internal/chat");

        std::env::remove_var("GROQ_API_URL");
        std::env::remove_var("GROQ_CONNECT_TIMEOUT_SECS");
        let config = GroqClientConfig::from_env(&provider);
        assert_eq!(config.endpoint, "https://proxy.internal/chat");

        std::env::set_var("GROQ_API_URL", "http://127.0.0.1:8080/chat");
        std::env::set_var("GROQ_CONNECT_TIMEOUT_SECS", "3");
        let config = GroqClientConfig::from_env(&provider);
        assert_eq!(config.endpoint, "http://127.0.0.1:8080/chat");
        assert_eq!(config.connect_timeout, Duration::from_secs(3));

        std::env::remove_var("GROQ_API_URL");
        std::env::remove_var("GROQ_CONNECT_TIMEOUT_SECS");
    }
}
