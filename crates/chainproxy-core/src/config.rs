//! Proxy configuration.
//!
//! Loaded once at startup from a TOML file, with `CHAINPROXY__*` environment
//! variables overriding scalar fields, then validated. The resulting
//! [`ProxyConfig`] is never mutated.
//!
//! ```toml
//! providers = ["https://eth.llamarpc.com", "https://rpc.ankr.com/eth"]
//! requests_per_second = 25
//! burst = 50
//! retry_limit = 3
//! send_batch_directly = false
//!
//! [[methods_mapping]]
//! method = "eth_getLogs"
//! providers = ["https://archive.example.com"]
//! ```

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};

use crate::error::ProxyError;
use crate::policy::RetryLimit;

/// Error message returned by EVM nodes for a reverted call. It is a valid
/// execution outcome, not a provider fault.
pub const EXECUTION_REVERTED: &str = "execution reverted";

/// Dedicated providers for one method.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodMapping {
    pub method: String,
    pub providers: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProxyConfig {
    /// Upstream URLs of the default balancer, in rotation order.
    #[serde(default)]
    pub providers: Vec<String>,

    /// Per-method provider overrides. URLs need not appear in `providers`.
    #[serde(default)]
    pub methods_mapping: Vec<MethodMapping>,

    /// Sustained outbound rate across all providers.
    #[serde(default = "default_requests_per_second")]
    pub requests_per_second: u32,

    /// Maximum accumulated tokens.
    #[serde(default = "default_burst")]
    pub burst: u32,

    /// Forward attempts per call; `-1` retries forever.
    #[serde(default = "default_retry_limit")]
    pub retry_limit: i64,

    /// Send inbound batches to a single provider as-is instead of splitting them.
    #[serde(default)]
    pub send_batch_directly: bool,

    /// Address the HTTP listener binds to.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Per-attempt upstream timeout.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Upstream error messages returned to the caller as normal results
    /// instead of triggering failover. Matched exactly.
    #[serde(default = "default_tolerated_errors")]
    pub tolerated_errors: Vec<String>,
}

fn default_requests_per_second() -> u32 {
    100
}

fn default_burst() -> u32 {
    100
}

fn default_retry_limit() -> i64 {
    3
}

fn default_listen_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_tolerated_errors() -> Vec<String> {
    vec![EXECUTION_REVERTED.to_string()]
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            providers: Vec::new(),
            methods_mapping: Vec::new(),
            requests_per_second: default_requests_per_second(),
            burst: default_burst(),
            retry_limit: default_retry_limit(),
            send_batch_directly: false,
            listen_addr: default_listen_addr(),
            request_timeout_secs: default_request_timeout_secs(),
            tolerated_errors: default_tolerated_errors(),
        }
    }
}

impl ProxyConfig {
    /// Load and validate configuration from a TOML file plus environment overrides.
    ///
    /// # Errors
    ///
    /// Returns [`ProxyError::Config`] if the file is missing, cannot be parsed,
    /// or fails [`ProxyConfig::validate`].
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ProxyError> {
        let path = path.as_ref();
        let config: Self = Config::builder()
            .add_source(File::from(path).format(FileFormat::Toml).required(true))
            .add_source(
                Environment::with_prefix("CHAINPROXY")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// Parse and validate configuration from a TOML string.
    pub fn from_toml_str(toml: &str) -> Result<Self, ProxyError> {
        let config: Self = Config::builder()
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// # Errors
    ///
    /// Returns [`ProxyError::Config`] describing the first problem found.
    pub fn validate(&self) -> Result<(), ProxyError> {
        if self.providers.is_empty() {
            return Err(config_err("no providers configured"));
        }
        check_urls("providers", &self.providers)?;

        let mut methods = HashSet::new();
        for mapping in &self.methods_mapping {
            if mapping.method.is_empty() {
                return Err(config_err("methods_mapping entry with empty method"));
            }
            if !methods.insert(mapping.method.as_str()) {
                return Err(config_err(format!("method {} mapped more than once", mapping.method)));
            }
            if mapping.providers.is_empty() {
                return Err(config_err(format!("method {} has no providers", mapping.method)));
            }
            check_urls(&mapping.method, &mapping.providers)?;
        }

        if self.requests_per_second == 0 {
            return Err(config_err("requests_per_second must be greater than 0"));
        }
        if self.burst == 0 {
            return Err(config_err("burst must be greater than 0"));
        }
        if self.request_timeout_secs == 0 {
            return Err(config_err("request_timeout_secs must be greater than 0"));
        }
        RetryLimit::from_config(self.retry_limit)?;
        Ok(())
    }

    pub fn retry(&self) -> Result<RetryLimit, ProxyError> {
        RetryLimit::from_config(self.retry_limit)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn config_err(msg: impl Into<String>) -> ProxyError {
    ProxyError::Config(msg.into())
}

fn check_urls(scope: &str, urls: &[String]) -> Result<(), ProxyError> {
    let mut seen = HashSet::new();
    for url in urls {
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(config_err(format!("{scope}: invalid provider URL {url:?}")));
        }
        if !seen.insert(url.as_str()) {
            return Err(config_err(format!("{scope}: duplicate provider URL {url}")));
        }
    }
    Ok(())
}
