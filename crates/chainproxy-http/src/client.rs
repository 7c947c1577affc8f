//! HTTP upstream provider backed by `reqwest`.
//!
//! Features:
//! - Forwards the caller's headers (minus connection-scoped ones)
//! - Transparent gzip decoding of upstream bodies
//! - Error normalization: transport, HTTP status, decode, JSON-RPC
//! - Tolerated JSON-RPC errors (e.g. `execution reverted`) pass through as results

use std::io::Read;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use flate2::read::GzDecoder;
use http::header::{self, HeaderMap, HeaderValue};
use http::StatusCode;
use serde_json::Value;

use chainproxy_core::config::{ProxyConfig, EXECUTION_REVERTED};
use chainproxy_core::error::ProxyError;
use chainproxy_core::request::JsonRpcError;
use chainproxy_core::transport::{ProviderResponse, RpcTransport};

/// Headers describing the inbound connection rather than the call.
const HOP_HEADERS: [header::HeaderName; 4] = [
    header::HOST,
    header::CONTENT_LENGTH,
    header::TRANSFER_ENCODING,
    header::CONNECTION,
];

/// Largest upstream body accepted after gzip decoding.
pub const MAX_DECODED_BYTES: u64 = crate::server::MAX_BODY_BYTES as u64;

/// Configuration shared by every `HttpProvider`.
#[derive(Debug, Clone)]
pub struct HttpProviderConfig {
    /// Timeout per forward attempt.
    pub request_timeout: Duration,
    /// JSON-RPC error messages that are valid results, not provider faults.
    pub tolerated_errors: Vec<String>,
}

impl Default for HttpProviderConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            tolerated_errors: vec![EXECUTION_REVERTED.to_string()],
        }
    }
}

impl From<&ProxyConfig> for HttpProviderConfig {
    fn from(config: &ProxyConfig) -> Self {
        Self {
            request_timeout: config.request_timeout(),
            tolerated_errors: config.tolerated_errors.clone(),
        }
    }
}

/// Builds `HttpProvider`s that share one connection pool.
#[derive(Clone)]
pub struct HttpConnector {
    http: reqwest::Client,
    tolerated_errors: Arc<[String]>,
}

impl HttpConnector {
    /// # Errors
    ///
    /// Returns [`ProxyError::Config`] if the underlying reqwest client fails to build.
    pub fn new(config: HttpProviderConfig) -> Result<Self, ProxyError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .pool_idle_timeout(Duration::from_secs(30))
            .tcp_nodelay(true)
            .build()
            .map_err(|e| {
                tracing::error!(error = %e, "failed to build http client");
                ProxyError::Config(format!("HTTP client build failed: {e}"))
            })?;

        Ok(Self {
            http,
            tolerated_errors: config.tolerated_errors.into(),
        })
    }

    /// Create the provider for `url`.
    pub fn connect(&self, url: &str) -> Result<Arc<dyn RpcTransport>, ProxyError> {
        reqwest::Url::parse(url)
            .map_err(|e| ProxyError::Config(format!("invalid provider URL {url}: {e}")))?;
        Ok(Arc::new(HttpProvider {
            url: url.to_string(),
            http: self.http.clone(),
            tolerated_errors: Arc::clone(&self.tolerated_errors),
        }))
    }
}

/// One upstream JSON-RPC endpoint reached over HTTP POST.
pub struct HttpProvider {
    url: String,
    http: reqwest::Client,
    tolerated_errors: Arc<[String]>,
}

impl HttpProvider {
    /// Create a standalone provider with its own connection pool.
    pub fn new(url: impl Into<String>, config: HttpProviderConfig) -> Result<Self, ProxyError> {
        let connector = HttpConnector::new(config)?;
        Ok(Self {
            url: url.into(),
            http: connector.http,
            tolerated_errors: connector.tolerated_errors,
        })
    }

    fn transport_err(&self, e: &reqwest::Error) -> ProxyError {
        let kind = if e.is_timeout() {
            "timed out"
        } else if e.is_connect() {
            "connection failed"
        } else if e.is_body() {
            "response body error"
        } else {
            "request failed"
        };
        ProxyError::Transport {
            provider: self.url.clone(),
            reason: format!("{kind}: {e}"),
        }
    }

    fn decode_err(&self, reason: impl std::fmt::Display) -> ProxyError {
        ProxyError::Decode {
            provider: self.url.clone(),
            reason: reason.to_string(),
        }
    }

    /// Reject bodies that are not JSON-RPC or carry an untolerated error.
    fn check_body(&self, body: &[u8]) -> Result<(), ProxyError> {
        let value: Value = serde_json::from_slice(body).map_err(|e| self.decode_err(e))?;
        match &value {
            Value::Object(_) => self.check_response(&value),
            Value::Array(items) => items.iter().try_for_each(|item| self.check_response(item)),
            _ => Err(self.decode_err("expected a JSON-RPC response object or array")),
        }
    }

    fn check_response(&self, response: &Value) -> Result<(), ProxyError> {
        let Value::Object(fields) = response else {
            return Err(self.decode_err("expected a JSON-RPC response object"));
        };
        let Some(error) = fields.get("error").filter(|e| !e.is_null()) else {
            return if fields.contains_key("result") {
                Ok(())
            } else {
                Err(self.decode_err("response has neither result nor error"))
            };
        };
        let error: JsonRpcError =
            serde_json::from_value(error.clone()).map_err(|e| self.decode_err(e))?;

        if self.tolerated_errors.iter().any(|m| *m == error.message) {
            tracing::debug!(provider = %self.url, message = %error.message, "tolerated rpc error");
            Ok(())
        } else {
            Err(ProxyError::UpstreamRpc {
                provider: self.url.clone(),
                error,
            })
        }
    }
}

fn is_gzip(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_ENCODING)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.trim().eq_ignore_ascii_case("gzip"))
}

fn gunzip(raw: &[u8], limit: u64) -> std::io::Result<Bytes> {
    let mut out = Vec::with_capacity(raw.len().saturating_mul(4).min(limit as usize));
    GzDecoder::new(raw)
        .take(limit.saturating_add(1))
        .read_to_end(&mut out)?;
    if out.len() as u64 > limit {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("decompressed body exceeds {limit} bytes"),
        ));
    }
    Ok(out.into())
}

/// The caller's headers, minus connection-scoped ones. We can only decode
/// gzip, so that is the only encoding offered upstream.
fn forwardable(headers: &HeaderMap) -> HeaderMap {
    let mut out = headers.clone();
    for name in &HOP_HEADERS {
        out.remove(name);
    }
    if out.contains_key(header::ACCEPT_ENCODING) {
        out.insert(header::ACCEPT_ENCODING, HeaderValue::from_static("gzip"));
    }
    if !out.contains_key(header::CONTENT_TYPE) {
        out.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
    }
    out
}

#[async_trait]
impl RpcTransport for HttpProvider {
    async fn forward(
        &self,
        payload: Bytes,
        headers: &HeaderMap,
    ) -> Result<ProviderResponse, ProxyError> {
        let resp = self
            .http
            .post(&self.url)
            .headers(forwardable(headers))
            .body(payload)
            .send()
            .await
            .map_err(|e| self.transport_err(&e))?;

        let status = resp.status();
        let mut resp_headers = resp.headers().clone();
        let raw = resp.bytes().await.map_err(|e| self.transport_err(&e))?;
        let gzipped = is_gzip(&resp_headers);

        if status != StatusCode::OK {
            let body = if gzipped {
                gunzip(&raw, MAX_DECODED_BYTES).unwrap_or(raw)
            } else {
                raw
            };
            return Err(ProxyError::UpstreamHttp {
                provider: self.url.clone(),
                status: status.as_u16(),
                body: String::from_utf8_lossy(&body).into_owned(),
            });
        }

        let body = if gzipped {
            resp_headers.remove(header::CONTENT_ENCODING);
            resp_headers.remove(header::CONTENT_LENGTH);
            gunzip(&raw, MAX_DECODED_BYTES).map_err(|e| self.decode_err(format!("gzip: {e}")))?
        } else {
            raw
        };

        self.check_body(&body)?;

        Ok(ProviderResponse {
            status,
            headers: resp_headers,
            body,
        })
    }

    fn url(&self) -> &str {
        &self.url
    }
}
