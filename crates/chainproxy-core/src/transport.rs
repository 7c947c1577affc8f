//! The `RpcTransport` trait: the seam between routing and upstream I/O.

use async_trait::async_trait;
use bytes::Bytes;
use http::{HeaderMap, StatusCode};

use crate::error::ProxyError;

/// A validated upstream answer: raw body plus the HTTP metadata it came with.
#[derive(Debug, Clone)]
pub struct ProviderResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl ProviderResponse {
    /// A 200 response with no headers, mostly useful for test transports.
    pub fn ok(body: impl Into<Bytes>) -> Self {
        Self {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            body: body.into(),
        }
    }
}

/// One upstream provider.
///
/// # Thread Safety
/// Implementations must be `Send + Sync` for use across Tokio tasks.
///
/// # Object Safety
/// The trait is object-safe and is stored as `Arc<dyn RpcTransport>` so that
/// several balancers can share the same provider instance.
#[async_trait]
pub trait RpcTransport: Send + Sync + 'static {
    /// Forward a raw JSON-RPC payload (single call or batch) with the caller's headers.
    ///
    /// Returns `Ok` only when the body is valid JSON-RPC and carries no error
    /// that should count as a provider failure.
    async fn forward(
        &self,
        payload: Bytes,
        headers: &HeaderMap,
    ) -> Result<ProviderResponse, ProxyError>;

    /// Return the provider's identifier (its URL).
    fn url(&self) -> &str;
}
