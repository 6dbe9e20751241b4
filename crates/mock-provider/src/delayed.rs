//! Delayed provider - wraps another provider with artificial latency.

use std::time::Duration;

use catalog_core::{async_trait, ChatProvider, ChatRequest, RawReply, TransportError};
use tokio::time::sleep;

/// A provider that wraps another provider and adds artificial delay.
///
/// Useful for testing timeouts, latency reporting and overlapping jobs.
pub struct DelayedProvider<P: ChatProvider> {
    inner: P,
    delay: Duration,
}

impl<P: ChatProvider> DelayedProvider<P> {
    pub fn new(inner: P, delay: Duration) -> Self {
        Self { inner, delay }
    }

    /// Create a provider with a delay in milliseconds.
    pub fn with_millis(inner: P, millis: u64) -> Self {
        Self::new(inner, Duration::from_millis(millis))
    }

    pub fn inner(&self) -> &P {
        &self.inner
    }
}

#[async_trait]
impl<P: ChatProvider> ChatProvider for DelayedProvider<P> {
    async fn send(&self, request: ChatRequest) -> Result<RawReply, TransportError> {
        // Honour the request deadline like the HTTP client does.
        if self.delay > request.timeout {
            sleep(request.timeout).await;
            return Err(TransportError::Timeout(request.timeout));
        }
        sleep(self.delay).await;
        self.inner.send(request).await
    }

    fn name(&self) -> &str {
        "DelayedProvider"
    }
}
