//! chainproxy-http: HTTP transport for ChainProxy.
//!
//! - [`HttpProvider`] forwards calls to one upstream over HTTP POST
//! - [`server`] exposes a [`RequestRouter`] on a single `POST /` endpoint
//!
//! # Usage
//! ```rust,no_run
//! use chainproxy_core::ProxyConfig;
//! use chainproxy_http::build_router;
//!
//! let config = ProxyConfig::from_file("proxy.toml").unwrap();
//! let router = build_router(&config).unwrap();
//! ```

pub mod client;
pub mod server;

pub use client::{HttpConnector, HttpProvider, HttpProviderConfig};

use chainproxy_core::{ProxyConfig, ProxyError, RequestRouter};

/// Build a [`RequestRouter`] whose providers are [`HttpProvider`]s sharing
/// one connection pool.
pub fn build_router(config: &ProxyConfig) -> Result<RequestRouter, ProxyError> {
    let connector = HttpConnector::new(HttpProviderConfig::from(config))?;
    RequestRouter::from_config(config, |url| connector.connect(url))
}
