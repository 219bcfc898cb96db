use jsonrpsee::core::client::Error as ClientError;
use thiserror::Error;

/// JSON-RPC error code for an unknown method.
const METHOD_NOT_FOUND: i32 = -32601;
/// JSON-RPC error code for invalid params.
const INVALID_PARAMS: i32 = -32602;

/// Errors returned by a [`NodeClient`](crate::NodeClient).
#[derive(Debug, Error)]
pub enum RpcError {
    /// The connection failed or was reset.
    #[error("transport error: {0}")]
    Transport(String),

    /// The request did not complete within the configured timeout.
    #[error("request timed out")]
    Timeout,

    /// The response was missing a required field or could not be decoded.
    #[error("malformed response: {0}")]
    Malformed(String),

    /// The node returned no value for the requested item.
    #[error("not found: {0}")]
    NotFound(String),

    /// The node rejected the call.
    #[error("rpc call failed ({code}): {message}")]
    Call {
        /// JSON-RPC error code.
        code: i32,
        /// Error message returned by the node.
        message: String,
    },

    /// A REST endpoint answered with a non-success status.
    #[error("http status {0}")]
    HttpStatus(u16),

    /// The collaborator is not configured.
    #[error("{0} endpoint is not configured")]
    NotConfigured(&'static str),
}

impl RpcError {
    /// Returns `true` if the failure is transient and the request may succeed when retried.
    ///
    /// Timeouts, connection failures, malformed payloads and missing items are all
    /// transient: the node may be lagging or briefly inconsistent. Calls the node rejects
    /// as unknown or invalid will fail again.
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Call { code, .. } => !matches!(*code, METHOD_NOT_FOUND | INVALID_PARAMS),
            Self::HttpStatus(status) => *status >= 500 || *status == 429,
            Self::NotConfigured(_) => false,
            Self::Transport(_) | Self::Timeout | Self::Malformed(_) | Self::NotFound(_) => true,
        }
    }
}

impl From<ClientError> for RpcError {
    fn from(err: ClientError) -> Self {
        match err {
            ClientError::RequestTimeout => Self::Timeout,
            ClientError::ParseError(err) => Self::Malformed(err.to_string()),
            ClientError::Call(obj) => {
                Self::Call { code: obj.code(), message: obj.message().to_string() }
            }
            other => Self::Transport(other.to_string()),
        }
    }
}

impl From<reqwest::Error> for RpcError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if err.is_decode() {
            Self::Malformed(err.to_string())
        } else if let Some(status) = err.status() {
            Self::HttpStatus(status.as_u16())
        } else {
            Self::Transport(err.to_string())
        }
    }
}
