//! chainproxy-core: routing and failover engine for ChainProxy.
//!
//! # Overview
//!
//! ChainProxy is a JSON-RPC reverse proxy that fans calls out to a pool of
//! upstream blockchain-node providers. The core crate defines:
//!
//! - [`RpcTransport`]: the async trait every upstream provider implements
//! - [`Balancer`]: round-robin provider selection
//! - [`RouteTable`]: per-method provider overrides
//! - [`policy`] module: shared rate limiter and retry ceiling
//! - [`FailoverEngine`]: retry loop across a balancer
//! - [`RequestRouter`]: single/batch decoding and response reassembly
//! - [`ProxyConfig`]: validated configuration

pub mod balancer;
pub mod config;
pub mod error;
pub mod failover;
pub mod policy;
pub mod request;
pub mod router;
pub mod routes;
pub mod transport;

#[cfg(test)]
mod testing;

pub use balancer::Balancer;
pub use config::{MethodMapping, ProxyConfig};
pub use error::ProxyError;
pub use failover::FailoverEngine;
pub use request::{JsonRpcCall, JsonRpcError, JsonRpcResponse, RpcId};
pub use router::{BatchMode, InboundRequest, OutboundResponse, RequestRouter};
pub use routes::RouteTable;
pub use transport::{ProviderResponse, RpcTransport};
