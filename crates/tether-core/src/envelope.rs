//! JSON-RPC 2.0 envelopes carried inside data frames
//!
//! Each virtual connection hosts one request/response protocol instance; every
//! data frame holds exactly one [`Request`] or [`Response`].

use crate::error::Error;
use serde::{Deserialize, Serialize};

/// JSON-RPC version string
pub const JSONRPC_VERSION: &str = "2.0";

/// JSON-RPC 2.0 request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    /// JSON-RPC version (always "2.0")
    pub jsonrpc: String,
    /// Method name
    pub method: String,
    /// Method parameters
    #[serde(default)]
    pub params: serde_json::Value,
    /// Request ID
    pub id: u64,
}

impl Request {
    /// Create a new request
    pub fn new<P: Serialize>(method: &str, params: P, id: u64) -> Result<Self, serde_json::Error> {
        Ok(Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            method: method.to_string(),
            params: serde_json::to_value(params)?,
            id,
        })
    }
}

/// JSON-RPC 2.0 response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    /// JSON-RPC version (always "2.0")
    pub jsonrpc: String,
    /// Result (mutually exclusive with error)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    /// Error (mutually exclusive with result)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
    /// Request ID this is responding to
    pub id: u64,
}

impl Response {
    /// Create a success response
    pub fn success(id: u64, result: serde_json::Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            result: Some(result),
            error: None,
            id,
        }
    }

    /// Create an error response
    pub fn error(id: u64, error: RpcError) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            result: None,
            error: Some(error),
            id,
        }
    }

    /// Turn the response into the caller-facing result
    ///
    /// A success response without a result decodes as JSON `null`, which keeps
    /// unit-returning methods and `Option` results working.
    pub fn into_result(self) -> Result<serde_json::Value, Error> {
        if let Some(err) = self.error {
            return Err(err.into_error());
        }
        Ok(self.result.unwrap_or(serde_json::Value::Null))
    }
}

/// JSON-RPC 2.0 error object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcError {
    /// Error code
    pub code: i32,
    /// Error message
    pub message: String,
    /// Additional error data
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

/// Standard JSON-RPC 2.0 error codes plus the tether-specific range
pub mod error_codes {
    /// Parse error - Invalid JSON
    pub const PARSE_ERROR: i32 = -32700;
    /// Invalid request - Not a valid JSON-RPC request
    pub const INVALID_REQUEST: i32 = -32600;
    /// Method not found
    pub const METHOD_NOT_FOUND: i32 = -32601;
    /// Invalid params
    pub const INVALID_PARAMS: i32 = -32602;
    /// Internal error
    pub const INTERNAL_ERROR: i32 = -32603;

    /// Business error raised by a module implementation
    pub const MODULE_ERROR: i32 = -32000;
    /// The receiving side's reconstructed deadline passed
    pub const DEADLINE_EXCEEDED: i32 = -32010;
    /// Missing handle, zero connection id, unknown kind
    pub const PROTOCOL_ERROR: i32 = -32011;
    /// The call was cancelled on the receiving side
    pub const CANCELLED: i32 = -32012;
}

impl RpcError {
    fn with_code(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    /// Create a parse error
    pub fn parse_error(message: impl Into<String>) -> Self {
        Self::with_code(error_codes::PARSE_ERROR, message)
    }

    /// Create a method not found error
    pub fn method_not_found(method: &str) -> Self {
        Self::with_code(
            error_codes::METHOD_NOT_FOUND,
            format!("Method not found: {}", method),
        )
    }

    /// Create an invalid params error
    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::with_code(error_codes::INVALID_PARAMS, message)
    }

    /// Create an internal error
    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::with_code(error_codes::INTERNAL_ERROR, message)
    }

    /// Create a business error
    pub fn module_error(message: impl Into<String>) -> Self {
        Self::with_code(error_codes::MODULE_ERROR, message)
    }

    /// Create a protocol error
    pub fn protocol_error(message: impl Into<String>) -> Self {
        Self::with_code(error_codes::PROTOCOL_ERROR, message)
    }

    /// Map a wire error back into a local [`Error`]
    pub fn into_error(self) -> Error {
        match self.code {
            error_codes::MODULE_ERROR => Error::Module(self.message),
            error_codes::DEADLINE_EXCEEDED => Error::DeadlineExceeded,
            error_codes::CANCELLED => Error::Cancelled,
            _ => Error::Protocol(self.message),
        }
    }
}

impl From<Error> for RpcError {
    fn from(err: Error) -> Self {
        match err {
            Error::Module(msg) => RpcError::module_error(msg),
            Error::DeadlineExceeded => {
                RpcError::with_code(error_codes::DEADLINE_EXCEEDED, "deadline exceeded")
            }
            Error::Cancelled => RpcError::with_code(error_codes::CANCELLED, "cancelled"),
            Error::Protocol(msg) => RpcError::protocol_error(msg),
            Error::Json(e) => RpcError::invalid_params(e.to_string()),
            // Transport failures behind the server stub are the implementation's problem.
            other => RpcError::module_error(other.to_string()),
        }
    }
}
