//! Method → balancer routing.

use std::collections::HashMap;
use std::sync::Arc;

use crate::balancer::Balancer;
use crate::config::ProxyConfig;
use crate::error::ProxyError;
use crate::transport::RpcTransport;

/// Maps method names to dedicated balancers; everything else goes to the
/// default balancer spanning all configured providers.
#[derive(Debug)]
pub struct RouteTable {
    default: Arc<Balancer>,
    methods: HashMap<String, Arc<Balancer>>,
}

/// Hands out one transport per URL so balancers share provider instances.
struct ProviderRegistry<F> {
    connect: F,
    providers: HashMap<String, Arc<dyn RpcTransport>>,
}

impl<F> ProviderRegistry<F>
where
    F: FnMut(&str) -> Result<Arc<dyn RpcTransport>, ProxyError>,
{
    fn get_or_connect(&mut self, url: &str) -> Result<Arc<dyn RpcTransport>, ProxyError> {
        if let Some(provider) = self.providers.get(url) {
            return Ok(Arc::clone(provider));
        }
        let provider = (self.connect)(url)?;
        self.providers.insert(url.to_string(), Arc::clone(&provider));
        Ok(provider)
    }

    fn balancer(&mut self, urls: &[String]) -> Result<Balancer, ProxyError> {
        let mut providers = Vec::with_capacity(urls.len());
        for url in urls {
            providers.push(self.get_or_connect(url)?);
        }
        Ok(Balancer::new(providers))
    }
}

impl RouteTable {
    pub fn new(default: Arc<Balancer>, methods: HashMap<String, Arc<Balancer>>) -> Self {
        Self { default, methods }
    }

    /// Build the table from config, calling `connect` once per distinct URL.
    pub fn from_config<F>(config: &ProxyConfig, connect: F) -> Result<Self, ProxyError>
    where
        F: FnMut(&str) -> Result<Arc<dyn RpcTransport>, ProxyError>,
    {
        let mut registry = ProviderRegistry {
            connect,
            providers: HashMap::new(),
        };

        let default = Arc::new(registry.balancer(&config.providers)?);
        let mut methods = HashMap::with_capacity(config.methods_mapping.len());
        for mapping in &config.methods_mapping {
            let balancer = registry.balancer(&mapping.providers)?;
            methods.insert(mapping.method.clone(), Arc::new(balancer));
        }

        tracing::info!(
            providers = registry.providers.len(),
            overrides = methods.len(),
            "route table built"
        );
        Ok(Self::new(default, methods))
    }

    /// Balancer for `method`: its override if one exists, else the default.
    pub fn resolve(&self, method: &str) -> &Balancer {
        self.methods.get(method).unwrap_or(&self.default)
    }

    pub fn default_balancer(&self) -> &Balancer {
        &self.default
    }

    /// `(method, provider urls)` for every override, sorted by method.
    pub fn overrides(&self) -> Vec<(&str, Vec<&str>)> {
        let mut routes: Vec<_> = self
            .methods
            .iter()
            .map(|(method, balancer)| (method.as_str(), balancer.urls()))
            .collect();
        routes.sort_by(|a, b| a.0.cmp(b.0));
        routes
    }
}
