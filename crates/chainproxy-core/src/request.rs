//! JSON-RPC 2.0 wire types.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Protocol version stamped on every call and synthesized response.
pub const JSONRPC_VERSION: &str = "2.0";

/// Standard JSON-RPC 2.0 error codes used by the proxy.
pub mod error_codes {
    pub const PARSE_ERROR: i64 = -32700;
    pub const INVALID_REQUEST: i64 = -32600;
    pub const INTERNAL_ERROR: i64 = -32603;
}

/// JSON-RPC request ID: number, string or null.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RpcId {
    Number(serde_json::Number),
    String(String),
    #[default]
    Null,
}

impl RpcId {
    pub fn number(n: i64) -> Self {
        Self::Number(n.into())
    }
}

impl std::fmt::Display for RpcId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::String(s) => write!(f, "{s}"),
            Self::Null => write!(f, "null"),
        }
    }
}

/// A single inbound call, validated enough to be routed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcCall {
    pub jsonrpc: String,
    #[serde(default)]
    pub id: RpcId,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

/// A batch entry that failed validation. Keeps the id (when readable) so the
/// error can be placed back at the right position.
#[derive(Debug, Clone, PartialEq)]
pub struct InvalidCall {
    pub id: RpcId,
    pub reason: String,
}

impl InvalidCall {
    fn new(id: RpcId, reason: impl Into<String>) -> Self {
        Self {
            id,
            reason: reason.into(),
        }
    }
}

impl JsonRpcCall {
    /// Create a new JSON-RPC 2.0 call.
    pub fn new(id: RpcId, method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.into(),
            id,
            method: method.into(),
            params,
        }
    }

    /// Validate one decoded entry of an inbound payload.
    pub fn from_value(value: Value) -> Result<Self, InvalidCall> {
        let Value::Object(mut obj) = value else {
            return Err(InvalidCall::new(RpcId::Null, "request must be an object"));
        };

        let id = match obj.remove("id") {
            None => RpcId::Null,
            Some(raw) => serde_json::from_value(raw).map_err(|_| {
                InvalidCall::new(RpcId::Null, "id must be a number, string or null")
            })?,
        };

        let method = match obj.remove("method") {
            Some(Value::String(method)) => method,
            Some(_) => return Err(InvalidCall::new(id, "method must be a string")),
            None => return Err(InvalidCall::new(id, "missing method")),
        };

        Ok(Self::new(id, method, obj.remove("params")))
    }

    /// Serialize the call as the body sent upstream.
    pub fn to_payload(&self) -> Result<Bytes, serde_json::Error> {
        serde_json::to_vec(self).map(Bytes::from)
    }
}

/// A JSON-RPC 2.0 error object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl std::fmt::Display for JsonRpcError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "JSON-RPC error {}: {}", self.code, self.message)
    }
}

/// A JSON-RPC 2.0 response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    pub id: RpcId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    pub fn success(id: RpcId, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.into(),
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(id: RpcId, error: JsonRpcError) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.into(),
            id,
            result: None,
            error: Some(error),
        }
    }
}
