use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use todo_store::{StoreError, StoreEvent};

/// Method names understood by the server.
pub mod methods {
    pub const LIST: &str = "list";
    pub const CREATE: &str = "create";
    pub const UPDATE: &str = "update";
    pub const TOGGLE: &str = "toggle";
    pub const DELETE: &str = "delete";
    /// Start pushing [`StoreEvent`](todo_store::StoreEvent)s on this connection.
    pub const SUBSCRIBE: &str = "subscribe";
}

pub mod codes {
    pub const VALIDATION: &str = "VALIDATION";
    pub const NOT_FOUND: &str = "NOT_FOUND";
    pub const TRANSPORT: &str = "TRANSPORT";
    pub const TIMEOUT: &str = "TIMEOUT";
    pub const INTERNAL: &str = "INTERNAL";
    pub const UNKNOWN_METHOD: &str = "UNKNOWN_METHOD";
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct RpcRequest {
    pub id: u64,
    pub method: String,
    #[serde(default)]
    pub params: Option<JsonValue>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct RpcResponse {
    pub id: u64,
    #[serde(default)]
    pub result: Option<JsonValue>,
    #[serde(default)]
    pub error: Option<RpcError>,
}

impl RpcResponse {
    pub fn ok(id: u64, result: JsonValue) -> Self {
        Self {
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn err(id: u64, error: RpcError) -> Self {
        Self {
            id,
            result: None,
            error: Some(error),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct RpcError {
    pub code: String,
    pub message: String,
    #[serde(default)]
    pub retryable: bool,
}

impl RpcError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        let code = code.into();
        let retryable = code == codes::TRANSPORT || code == codes::TIMEOUT;
        Self {
            code,
            message: message.into(),
            retryable,
        }
    }
}

impl From<&StoreError> for RpcError {
    fn from(err: &StoreError) -> Self {
        match err {
            StoreError::Validation { message } => Self::new(codes::VALIDATION, message.clone()),
            StoreError::NotFound { resource } => Self::new(codes::NOT_FOUND, resource.clone()),
            StoreError::Transport { message } => Self::new(codes::TRANSPORT, message.clone()),
            StoreError::Timeout { operation } => Self::new(codes::TIMEOUT, operation.clone()),
            StoreError::Internal { message } => Self::new(codes::INTERNAL, message.clone()),
            other => Self::new(codes::INTERNAL, other.to_string()),
        }
    }
}

impl From<RpcError> for StoreError {
    fn from(err: RpcError) -> Self {
        match err.code.as_str() {
            codes::VALIDATION => StoreError::Validation {
                message: err.message,
            },
            codes::NOT_FOUND => StoreError::NotFound {
                resource: err.message,
            },
            codes::TRANSPORT => StoreError::Transport {
                message: err.message,
            },
            codes::TIMEOUT => StoreError::Timeout {
                operation: err.message,
            },
            codes::INTERNAL => StoreError::Internal {
                message: err.message,
            },
            _ => StoreError::Internal {
                message: format!("{}: {}", err.code, err.message),
            },
        }
    }
}

/// Everything the server writes to a connection.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
#[serde(rename_all = "lowercase")]
pub enum ServerFrame {
    Response(RpcResponse),
    Event(StoreEvent),
}
