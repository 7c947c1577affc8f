//! Proxy error types.

use thiserror::Error;

use crate::request::{error_codes, JsonRpcError};

/// Errors that can occur while routing a call to an upstream provider.
#[derive(Debug, Error)]
pub enum ProxyError {
    /// The inbound call is malformed (not an object, missing or non-string method).
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Connection refused, DNS failure, timeout.
    #[error("Transport error ({provider}): {reason}")]
    Transport { provider: String, reason: String },

    /// Provider answered with a status other than 200.
    #[error("HTTP {status} from {provider}: {body}")]
    UpstreamHttp {
        provider: String,
        status: u16,
        body: String,
    },

    /// Provider answered with a JSON-RPC error that is not on the tolerated list.
    #[error("RPC error {} from {provider}: {}", .error.code, .error.message)]
    UpstreamRpc {
        provider: String,
        error: JsonRpcError,
    },

    /// Provider body could not be gunzipped or parsed as JSON-RPC.
    #[error("Decode error ({provider}): {reason}")]
    Decode { provider: String, reason: String },

    /// A balancer was asked for a provider but holds none.
    #[error("No providers configured")]
    EmptyPool,

    /// Retry ceiling reached without a successful forward.
    #[error("All providers failed after {attempts} attempt(s): {last}")]
    AllProvidersFailed {
        attempts: u32,
        last: Box<ProxyError>,
    },

    /// Configuration is invalid.
    #[error("Config error: {0}")]
    Config(String),
}

impl ProxyError {
    /// Returns `true` if the failed attempt should move on to the next provider.
    pub fn triggers_failover(&self) -> bool {
        matches!(
            self,
            Self::Transport { .. }
                | Self::UpstreamHttp { .. }
                | Self::UpstreamRpc { .. }
                | Self::Decode { .. }
        )
    }

    /// JSON-RPC error code used when this error is embedded in a response.
    pub fn rpc_code(&self) -> i64 {
        match self {
            Self::InvalidRequest(_) => error_codes::INVALID_REQUEST,
            _ => error_codes::INTERNAL_ERROR,
        }
    }

    /// Build the error object returned to the caller.
    pub fn to_rpc_error(&self) -> JsonRpcError {
        JsonRpcError {
            code: self.rpc_code(),
            message: self.to_string(),
            data: None,
        }
    }
}

impl From<config::ConfigError> for ProxyError {
    fn from(err: config::ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}
