//! Round-robin provider selection.

use std::sync::{Arc, Mutex, PoisonError};

use crate::error::ProxyError;
use crate::transport::RpcTransport;

/// Round-robin balancer over an ordered set of providers.
///
/// Providers are shared: the default balancer and any per-method balancers
/// hold `Arc`s to the same transport instances.
pub struct Balancer {
    providers: Vec<Arc<dyn RpcTransport>>,
    cursor: Mutex<usize>,
}

impl Balancer {
    pub fn new(providers: Vec<Arc<dyn RpcTransport>>) -> Self {
        Self {
            providers,
            cursor: Mutex::new(0),
        }
    }

    /// Number of providers in the balancer.
    pub fn len(&self) -> usize {
        self.providers.len()
    }

    /// Returns `true` if the balancer has no providers.
    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// URLs of the providers, in rotation order.
    pub fn urls(&self) -> Vec<&str> {
        self.providers.iter().map(|p| p.url()).collect()
    }

    /// Return the provider under the cursor and advance it.
    pub fn next_provider(&self) -> Result<Arc<dyn RpcTransport>, ProxyError> {
        if self.providers.is_empty() {
            return Err(ProxyError::EmptyPool);
        }
        let mut cursor = self.cursor.lock().unwrap_or_else(PoisonError::into_inner);
        let provider = Arc::clone(&self.providers[*cursor]);
        *cursor = (*cursor + 1) % self.providers.len();
        Ok(provider)
    }

    /// Realign the rotation to the first provider.
    pub fn reset_cycle(&self) {
        *self.cursor.lock().unwrap_or_else(PoisonError::into_inner) = 0;
    }
}

impl std::fmt::Debug for Balancer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Balancer")
            .field("providers", &self.urls())
            .finish()
    }
}
