//! Inbound request handling: decode, dispatch each call, reassemble.
//!
//! A payload is decoded once into an [`Envelope`]. Each entry is validated
//! independently, so a malformed call only produces an error at its own
//! position. Batch results are emitted in input order.

use std::sync::Arc;

use bytes::Bytes;
use http::{HeaderMap, StatusCode};
use serde::Serialize;
use serde_json::Value;

use crate::config::ProxyConfig;
use crate::error::ProxyError;
use crate::failover::FailoverEngine;
use crate::policy::RateLimiter;
use crate::request::{
    error_codes, InvalidCall, JsonRpcCall, JsonRpcError, JsonRpcResponse, RpcId,
};
use crate::routes::RouteTable;
use crate::transport::RpcTransport;

/// Content type of every response the proxy emits.
pub const CONTENT_TYPE_JSON: &str = "application/json";

/// Body emitted when the response itself cannot be serialized.
const INTERNAL_ERROR_BODY: &[u8] =
    br#"{"jsonrpc":"2.0","id":null,"error":{"code":-32603,"message":"Internal error"}}"#;

/// Raw inbound HTTP request, as handed over by the listener.
#[derive(Debug, Clone, Default)]
pub struct InboundRequest {
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// Raw HTTP response for the listener. The body is always JSON.
#[derive(Debug, Clone)]
pub struct OutboundResponse {
    pub status: StatusCode,
    pub body: Bytes,
}

impl OutboundResponse {
    fn json<T: Serialize>(status: StatusCode, value: &T) -> Self {
        match serde_json::to_vec(value) {
            Ok(body) => Self {
                status,
                body: body.into(),
            },
            Err(e) => {
                tracing::error!(error = %e, "failed to serialize response");
                Self {
                    status: StatusCode::INTERNAL_SERVER_ERROR,
                    body: Bytes::from_static(INTERNAL_ERROR_BODY),
                }
            }
        }
    }

    pub fn content_type(&self) -> &'static str {
        CONTENT_TYPE_JSON
    }
}

/// How inbound batches reach the upstreams.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchMode {
    /// Route and fail over every call of the batch on its own.
    Decompose,
    /// Send the whole batch body to one provider of the default balancer.
    Verbatim,
}

impl BatchMode {
    pub fn from_flag(send_batch_directly: bool) -> Self {
        if send_batch_directly {
            Self::Verbatim
        } else {
            Self::Decompose
        }
    }
}

type CallEntry = Result<JsonRpcCall, InvalidCall>;

/// Inbound payload shape, decided once at decode time.
#[derive(Debug)]
enum Envelope {
    Single(CallEntry),
    Batch(Vec<CallEntry>),
}

impl Envelope {
    fn decode(body: &[u8]) -> Result<Self, serde_json::Error> {
        Ok(match serde_json::from_slice::<Value>(body)? {
            Value::Array(items) => {
                Self::Batch(items.into_iter().map(JsonRpcCall::from_value).collect())
            }
            other => Self::Single(JsonRpcCall::from_value(other)),
        })
    }
}

fn entry_id(entry: &CallEntry) -> RpcId {
    match entry {
        Ok(call) => call.id.clone(),
        Err(invalid) => invalid.id.clone(),
    }
}

/// Result for one position of the envelope.
enum CallOutcome {
    /// Provider body, already validated as JSON-RPC.
    Forwarded { id: RpcId, body: Bytes },
    /// Error object synthesized by the proxy.
    Failed(JsonRpcResponse),
}

impl CallOutcome {
    fn failed(id: RpcId, err: &ProxyError) -> Self {
        Self::Failed(JsonRpcResponse::failure(id, err.to_rpc_error()))
    }

    fn into_value(self) -> Value {
        match self {
            Self::Forwarded { id, body } => serde_json::from_slice(&body).unwrap_or_else(|e| {
                let err = ProxyError::Decode {
                    provider: "upstream".into(),
                    reason: e.to_string(),
                };
                failure_value(id, err.to_rpc_error())
            }),
            Self::Failed(resp) => serde_json::to_value(&resp)
                .unwrap_or_else(|_| failure_value(resp.id, internal_error())),
        }
    }
}

fn failure_value(id: RpcId, error: JsonRpcError) -> Value {
    serde_json::json!({ "jsonrpc": "2.0", "id": id, "error": error })
}

fn internal_error() -> JsonRpcError {
    JsonRpcError {
        code: error_codes::INTERNAL_ERROR,
        message: "Internal error".into(),
        data: None,
    }
}

/// Top-level entry point of the proxy.
pub struct RequestRouter {
    routes: RouteTable,
    engine: FailoverEngine,
    batch_mode: BatchMode,
}

impl RequestRouter {
    pub fn new(routes: RouteTable, engine: FailoverEngine, batch_mode: BatchMode) -> Self {
        Self {
            routes,
            engine,
            batch_mode,
        }
    }

    /// Wire up routes, rate limiter and failover engine from a validated config.
    /// `connect` is called once per distinct provider URL.
    pub fn from_config<F>(config: &ProxyConfig, connect: F) -> Result<Self, ProxyError>
    where
        F: FnMut(&str) -> Result<Arc<dyn RpcTransport>, ProxyError>,
    {
        let routes = RouteTable::from_config(config, connect)?;
        let limiter = Arc::new(RateLimiter::per_second(
            config.requests_per_second,
            config.burst,
        ));
        let engine = FailoverEngine::new(limiter, config.retry()?);
        Ok(Self::new(
            routes,
            engine,
            BatchMode::from_flag(config.send_batch_directly),
        ))
    }

    pub fn routes(&self) -> &RouteTable {
        &self.routes
    }

    pub fn engine(&self) -> &FailoverEngine {
        &self.engine
    }

    pub fn batch_mode(&self) -> BatchMode {
        self.batch_mode
    }

    /// Handle one inbound HTTP request.
    ///
    /// Status is 200 for any payload that decodes as JSON (per-call failures
    /// are embedded as error objects), 400 if it does not, 500 if the
    /// response cannot be serialized.
    pub async fn handle_inbound(&self, req: InboundRequest) -> OutboundResponse {
        let envelope = match Envelope::decode(&req.body) {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::warn!(error = %e, "inbound payload is not valid JSON");
                let resp = JsonRpcResponse::failure(
                    RpcId::Null,
                    JsonRpcError {
                        code: error_codes::PARSE_ERROR,
                        message: format!("Parse error: {e}"),
                        data: None,
                    },
                );
                return OutboundResponse::json(StatusCode::BAD_REQUEST, &resp);
            }
        };

        match envelope {
            Envelope::Single(entry) => match self.dispatch(entry, &req.headers).await {
                CallOutcome::Forwarded { body, .. } => OutboundResponse {
                    status: StatusCode::OK,
                    body,
                },
                CallOutcome::Failed(resp) => OutboundResponse::json(StatusCode::OK, &resp),
            },
            Envelope::Batch(entries) if entries.is_empty() => {
                let err = ProxyError::InvalidRequest("empty batch".into());
                let resp = JsonRpcResponse::failure(RpcId::Null, err.to_rpc_error());
                OutboundResponse::json(StatusCode::OK, &resp)
            }
            Envelope::Batch(entries) => match self.batch_mode {
                BatchMode::Decompose => self.dispatch_batch(entries, &req.headers).await,
                BatchMode::Verbatim => self.forward_batch(entries, req).await,
            },
        }
    }

    /// Route one call and run it through the failover engine.
    async fn dispatch(&self, entry: CallEntry, headers: &HeaderMap) -> CallOutcome {
        let call = match entry {
            Ok(call) => call,
            Err(invalid) => {
                tracing::debug!(id = %invalid.id, reason = %invalid.reason, "invalid call");
                let err = ProxyError::InvalidRequest(invalid.reason);
                return CallOutcome::failed(invalid.id, &err);
            }
        };

        let payload = match call.to_payload() {
            Ok(payload) => payload,
            Err(e) => {
                tracing::error!(method = %call.method, error = %e, "failed to encode call");
                return CallOutcome::Failed(JsonRpcResponse::failure(call.id, internal_error()));
            }
        };

        let balancer = self.routes.resolve(&call.method);
        match self
            .engine
            .execute(&call.method, payload, headers, balancer)
            .await
        {
            Ok(resp) => CallOutcome::Forwarded {
                id: call.id,
                body: resp.body,
            },
            Err(e) => CallOutcome::failed(call.id, &e),
        }
    }

    async fn dispatch_batch(&self, entries: Vec<CallEntry>, headers: &HeaderMap) -> OutboundResponse {
        let mut results = Vec::with_capacity(entries.len());
        for entry in entries {
            results.push(self.dispatch(entry, headers).await.into_value());
        }
        OutboundResponse::json(StatusCode::OK, &results)
    }

    /// Send the inbound batch body unchanged to one provider at a time.
    async fn forward_batch(&self, entries: Vec<CallEntry>, req: InboundRequest) -> OutboundResponse {
        let balancer = self.routes.default_balancer();
        match self
            .engine
            .execute("batch", req.body, &req.headers, balancer)
            .await
        {
            Ok(resp) => OutboundResponse {
                status: StatusCode::OK,
                body: resp.body,
            },
            Err(e) => {
                let error = e.to_rpc_error();
                let results: Vec<JsonRpcResponse> = entries
                    .iter()
                    .map(|entry| JsonRpcResponse::failure(entry_id(entry), error.clone()))
                    .collect();
                OutboundResponse::json(StatusCode::OK, &results)
            }
        }
    }
}
