//! YuRPC Response Types
//!
//! This module defines the RPC response envelope and its status codes.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::error::{Result, YurpcError};
use super::RequestId;

/// RPC method result (JSON value)
pub type RpcResult = serde_json::Value;

/// Status code carried by a [`Response`].
///
/// Codes below 1000 are produced by the serving side and travel on the wire.
/// [`CONNECTION_FAILURE`](Self::CONNECTION_FAILURE) and
/// [`INVOKE_TIMEOUT`](Self::INVOKE_TIMEOUT) are synthesized by the client and
/// never leave the calling process. Applications may return any other code.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct ResponseCode(pub i32);

impl ResponseCode {
    pub const OK: ResponseCode = ResponseCode(200);
    pub const BAD_REQUEST: ResponseCode = ResponseCode(400);
    pub const SERVICE_NOT_FOUND: ResponseCode = ResponseCode(404);
    pub const METHOD_NOT_FOUND: ResponseCode = ResponseCode(405);
    pub const INVOKE_FAILURE: ResponseCode = ResponseCode(500);
    pub const CONNECTION_FAILURE: ResponseCode = ResponseCode(1000);
    pub const INVOKE_TIMEOUT: ResponseCode = ResponseCode(1001);

    /// Default human readable message for the well-known codes.
    pub fn default_message(self) -> &'static str {
        match self {
            Self::OK => "ok",
            Self::BAD_REQUEST => "malformed request",
            Self::SERVICE_NOT_FOUND => "service not found",
            Self::METHOD_NOT_FOUND => "method not found",
            Self::INVOKE_FAILURE => "method invocation failed",
            Self::CONNECTION_FAILURE => "connection failure",
            Self::INVOKE_TIMEOUT => "invoke timeout",
            _ => "application error",
        }
    }

    /// Whether the code is synthesized locally by the client.
    pub fn is_local(self) -> bool {
        self == Self::CONNECTION_FAILURE || self == Self::INVOKE_TIMEOUT
    }
}

impl fmt::Display for ResponseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.0, self.default_message())
    }
}

/// An RPC response returned to the caller of `invoke`.
///
/// # Response Flow
///
/// 1. The server decodes a `Request` and dispatches it
/// 2. The server builds a `Response` (success or error code) and frames it
/// 3. The client's inbound path decodes it and completes the pending call by `id`
///
/// Responses with [`ResponseCode::CONNECTION_FAILURE`] or
/// [`ResponseCode::INVOKE_TIMEOUT`] are built by the client itself.
///
/// # Example
///
/// ```
/// use yurpc_common::protocol::responses::{Response, ResponseCode};
/// use serde_json::json;
///
/// let ok = Response::success(7, json!(5));
/// assert!(ok.is_ok());
///
/// let failed = Response::error(7, ResponseCode::METHOD_NOT_FOUND, "no such method: Calc.pow");
/// assert!(!failed.is_ok());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Response {
    /// Request identifier this response corresponds to
    pub id: RequestId,
    pub code: ResponseCode,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub result: Option<RpcResult>,
}

impl Response {
    pub fn success(id: RequestId, result: RpcResult) -> Self {
        Response {
            id,
            code: ResponseCode::OK,
            message: None,
            result: Some(result),
        }
    }

    pub fn error(id: RequestId, code: ResponseCode, message: impl Into<String>) -> Self {
        Response {
            id,
            code,
            message: Some(message.into()),
            result: None,
        }
    }

    /// No reachable connection for the request's target.
    pub fn connection_failure(id: RequestId) -> Self {
        let code = ResponseCode::CONNECTION_FAILURE;
        Self::error(id, code, code.default_message())
    }

    /// No response arrived within the invocation timeout.
    pub fn invoke_timeout(id: RequestId) -> Self {
        let code = ResponseCode::INVOKE_TIMEOUT;
        Self::error(id, code, code.default_message())
    }

    /// The outbound write failed after the connection was acquired.
    ///
    /// Reported with the timeout code: the caller cannot tell whether the
    /// peer saw any of the request.
    pub fn send_failure(id: RequestId, cause: impl fmt::Display) -> Self {
        Self::error(
            id,
            ResponseCode::INVOKE_TIMEOUT,
            format!("send failure: {}", cause),
        )
    }

    pub fn is_ok(&self) -> bool {
        self.code == ResponseCode::OK
    }

    /// Converts the response into the method's typed return value.
    ///
    /// A missing result on an `OK` response deserializes from `null`, so
    /// methods returning `()` work.
    pub fn into_result<T: DeserializeOwned>(self) -> Result<T> {
        match self.code {
            ResponseCode::OK => {
                let value = self.result.unwrap_or(serde_json::Value::Null);
                Ok(serde_json::from_value(value)?)
            }
            ResponseCode::CONNECTION_FAILURE => Err(YurpcError::Connection(
                self.message
                    .unwrap_or_else(|| ResponseCode::CONNECTION_FAILURE.default_message().into()),
            )),
            ResponseCode::INVOKE_TIMEOUT => Err(YurpcError::Timeout(
                self.message
                    .unwrap_or_else(|| ResponseCode::INVOKE_TIMEOUT.default_message().into()),
            )),
            code => Err(YurpcError::Remote {
                code: code.0,
                message: self
                    .message
                    .unwrap_or_else(|| code.default_message().to_string()),
            }),
        }
    }
}
