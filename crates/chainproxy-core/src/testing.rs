//! In-process transports for unit tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use http::HeaderMap;
use serde_json::{json, Value};

use crate::error::ProxyError;
use crate::request::{JsonRpcResponse, RpcId};
use crate::transport::{ProviderResponse, RpcTransport};

#[derive(Debug, Clone)]
pub enum MockBehavior {
    /// Echo each call's id with the provider URL as the result.
    Succeed,
    /// Fail every forward with a transport error.
    Fail,
}

pub struct MockTransport {
    url: String,
    behavior: MockBehavior,
    calls: AtomicUsize,
    payloads: Mutex<Vec<Value>>,
}

impl MockTransport {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn payloads(&self) -> Vec<Value> {
        self.payloads.lock().unwrap().clone()
    }
}

fn echo(url: &str, call: &Value) -> Value {
    let id: RpcId = call
        .get("id")
        .and_then(|id| serde_json::from_value(id.clone()).ok())
        .unwrap_or_default();
    serde_json::to_value(JsonRpcResponse::success(id, json!(url))).unwrap()
}

#[async_trait]
impl RpcTransport for MockTransport {
    async fn forward(
        &self,
        payload: Bytes,
        _headers: &HeaderMap,
    ) -> Result<ProviderResponse, ProxyError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let value: Value = serde_json::from_slice(&payload).unwrap();
        self.payloads.lock().unwrap().push(value.clone());
        match self.behavior {
            MockBehavior::Fail => Err(ProxyError::Transport {
                provider: self.url.clone(),
                reason: "mock error".into(),
            }),
            MockBehavior::Succeed => {
                let body = match &value {
                    Value::Array(calls) => {
                        Value::Array(calls.iter().map(|c| echo(&self.url, c)).collect())
                    }
                    call => echo(&self.url, call),
                };
                Ok(ProviderResponse::ok(serde_json::to_vec(&body).unwrap()))
            }
        }
    }

    fn url(&self) -> &str {
        &self.url
    }
}

pub fn mock_transport(url: &str, behavior: MockBehavior) -> Arc<MockTransport> {
    Arc::new(MockTransport {
        url: url.to_string(),
        behavior,
        calls: AtomicUsize::new(0),
        payloads: Mutex::new(Vec::new()),
    })
}

pub fn mock(url: &str, behavior: MockBehavior) -> Arc<dyn RpcTransport> {
    mock_transport(url, behavior)
}
