//! Groq text-generation provider.
//!
//! This crate provides:
//!
//! - [`ProviderRegistry`]: the single catalog of endpoints, current models
//!   per speed tier and retired models
//! - [`GroqClient`]: a [`catalog_core::ChatProvider`] posting to the
//!   OpenAI-compatible chat completion endpoint
//! - [`classify`]: turns a raw reply into completion text or a [`ReplyError`]
//!
//! # Usage
//!
//! ```rust,no_run
//! use groq_provider::{GroqClient, GroqClientConfig, ProviderRegistry, DEFAULT_PROVIDER};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let registry = ProviderRegistry::default();
//! let config = GroqClientConfig::from_env(registry.get(DEFAULT_PROVIDER));
//! let client = GroqClient::new(config)?;
//! # let _ = client;
//! # Ok(())
//! # }
//! ```

pub mod api_types;
mod client;
mod config;
mod error;
mod registry;
mod response;

pub use client::GroqClient;
pub use config::{GroqClientConfig, GroqClientConfigBuilder};
pub use error::ProviderError;
pub use registry::{
    AuthScheme, ModelOption, ModelTiers, ProviderConfig, ProviderRegistry, CATALOG_VERSION,
    DEFAULT_PROVIDER, GROQ_ENDPOINT,
};
pub use response::{classify, ReplyError};
