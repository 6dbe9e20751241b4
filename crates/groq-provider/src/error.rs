//! Client construction errors.

use thiserror::Error;

/// Errors raised while setting up the HTTP client.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("failed to create HTTP client: {0}")]
    Client(#[from] reqwest::Error),

    #[error("configuration error: {0}")]
    Configuration(String),
}
