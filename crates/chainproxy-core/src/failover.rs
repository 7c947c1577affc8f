//! Failover loop: rotate through a balancer until a provider answers or the
//! retry ceiling is reached.

use std::sync::Arc;

use bytes::Bytes;
use http::HeaderMap;

use crate::balancer::Balancer;
use crate::error::ProxyError;
use crate::policy::{RateLimiter, RetryLimit};
use crate::transport::ProviderResponse;

/// Drives forward attempts for one call across a [`Balancer`].
///
/// Every attempt first takes a token from the shared [`RateLimiter`]. The
/// first successful forward wins; failures move on to the next provider
/// immediately.
pub struct FailoverEngine {
    limiter: Arc<RateLimiter>,
    retry_limit: RetryLimit,
}

impl FailoverEngine {
    pub fn new(limiter: Arc<RateLimiter>, retry_limit: RetryLimit) -> Self {
        Self {
            limiter,
            retry_limit,
        }
    }

    pub fn retry_limit(&self) -> RetryLimit {
        self.retry_limit
    }

    /// Forward `payload` through `balancer`, failing over between providers.
    ///
    /// `label` only appears in log events (method name, or `batch`).
    ///
    /// # Errors
    /// - [`ProxyError::EmptyPool`] if the balancer has no providers
    /// - [`ProxyError::AllProvidersFailed`] once the retry ceiling is reached,
    ///   wrapping the last provider error
    /// - any error that does not trigger failover, returned as-is
    pub async fn execute(
        &self,
        label: &str,
        payload: Bytes,
        headers: &HeaderMap,
        balancer: &Balancer,
    ) -> Result<ProviderResponse, ProxyError> {
        if balancer.is_empty() {
            return Err(ProxyError::EmptyPool);
        }

        let mut attempts: u32 = 0;
        let last = loop {
            self.limiter.acquire().await;
            let provider = balancer.next_provider()?;

            match provider.forward(payload.clone(), headers).await {
                Ok(resp) => {
                    tracing::debug!(method = label, provider = provider.url(), attempts, "forwarded");
                    return Ok(resp);
                }
                Err(e) if !e.triggers_failover() => return Err(e),
                Err(e) => {
                    tracing::warn!(
                        method = label,
                        provider = provider.url(),
                        error = %e,
                        "provider failed"
                    );
                    attempts = attempts.saturating_add(1);

                    if self.retry_limit.is_exhausted(attempts) {
                        break e;
                    }

                    // Full sweep without success: start the next sweep from the top.
                    if attempts as usize % balancer.len() == 0 {
                        balancer.reset_cycle();
                    }
                }
            }
        };

        tracing::error!(method = label, attempts, error = %last, "all providers failed");
        Err(ProxyError::AllProvidersFailed {
            attempts,
            last: Box::new(last),
        })
    }
}
