//! JSON-RPC request/response types and line framing.
//!
//! Wire format: one JSON document per line (LF terminated), request and
//! response shapes per JSON-RPC 2.0:
//!
//! ```text
//! → {"jsonrpc":"2.0","id":1,"method":"pipe.write","params":{"pipeid":"…","msg":5}}
//! ← {"jsonrpc":"2.0","id":1,"result":{"ok":true,"count":1}}
//! ← {"jsonrpc":"2.0","id":2,"error":{"code":-32764,"message":"invalid pipe"}}
//! ```
//!
//! Requests without an `id` are treated as notifications: they are executed
//! but produce no response line.

// Rust guideline compliant 2026-02

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::RpcError;

/// Maximum length of a single request line (16 MB, same cap as the frame
/// decoders elsewhere in this codebase's lineage).
pub const MAX_LINE_BYTES: usize = 16 * 1024 * 1024;

/// An incoming JSON-RPC request.
#[derive(Debug, Clone, Deserialize)]
pub struct Request {
    /// Request id; absent for notifications.
    #[serde(default)]
    pub id: Option<Value>,
    /// Dotted method name, e.g. `pipe.write`.
    pub method: String,
    /// Method parameters; `Null` when omitted.
    #[serde(default)]
    pub params: Value,
}

impl Request {
    /// Parse a request from one wire line.
    ///
    /// # Errors
    ///
    /// `Parse` for invalid JSON, `InvalidRequest` for a JSON document that is
    /// not a request object.
    pub fn from_line(line: &str) -> Result<Self, RpcError> {
        let value: Value = serde_json::from_str(line)
            .map_err(|_| RpcError::new(crate::error::ErrKind::Parse))?;
        serde_json::from_value(value)
            .map_err(|_| RpcError::new(crate::error::ErrKind::InvalidRequest))
    }
}

/// The `error` member of a failed response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorBody {
    /// Stable numeric code from [`crate::error::ErrKind::code`].
    pub code: i64,
    /// Human-readable kind description.
    pub message: String,
    /// Caller-safe context (offending field name), if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// An outgoing JSON-RPC response.
#[derive(Debug, Clone, Serialize)]
pub struct Response {
    /// Protocol marker, always `"2.0"`.
    pub jsonrpc: &'static str,
    /// Echo of the request id (JSON `null` for requests we could not parse).
    pub id: Value,
    /// Success payload; mutually exclusive with `error`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Failure payload; mutually exclusive with `result`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

impl Response {
    /// A success response.
    #[must_use]
    pub fn ok(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result: Some(result),
            error: None,
        }
    }

    /// A failure response carrying the error's stable code.
    #[must_use]
    pub fn fail(id: Value, err: &RpcError) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result: None,
            error: Some(ErrorBody {
                code: err.kind.code(),
                message: err.kind.to_string(),
                data: err.data_value(),
            }),
        }
    }

    /// Serialize to one wire line (no trailing newline).
    #[must_use]
    pub fn to_line(&self) -> String {
        serde_json::to_string(self).expect("response serialization cannot fail")
    }
}
