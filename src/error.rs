//! Protocol error taxonomy with stable numeric codes.
//!
//! Every error that crosses the wire is one of the kinds below. The standard
//! JSON-RPC codes are used for the standard kinds; bus-specific kinds live in
//! the -327xx block. `data` carries the offending parameter name (for
//! `InvalidParams`) or a short hint, never internal detail.

use serde_json::Value;

/// The closed set of error kinds a request can fail with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ErrKind {
    /// Request line was not valid JSON.
    #[error("parse error")]
    Parse,
    /// Request shape was not a valid JSON-RPC request.
    #[error("invalid request")]
    InvalidRequest,
    /// Unknown method name.
    #[error("method not found")]
    MethodNotFound,
    /// Parameter shape or type mismatch; `data` names the field.
    #[error("invalid params")]
    InvalidParams,
    /// Unexpected failure in a collaborator. Logged server-side, never detailed.
    #[error("internal error")]
    Internal,
    /// Pipe is unknown, closed, or the caller is not its owner.
    #[error("invalid pipe")]
    InvalidPipe,
    /// The tag lookup denied the action.
    #[error("permission denied")]
    PermissionDenied,
    /// User does not exist.
    #[error("invalid user")]
    InvalidUser,
    /// User already exists.
    #[error("user already exists")]
    UserExists,
    /// Login credentials did not verify.
    #[error("invalid username or password")]
    InvalidLogin,
}

impl ErrKind {
    /// Stable numeric code for the wire.
    #[must_use]
    pub fn code(self) -> i64 {
        match self {
            ErrKind::Parse => -32700,
            ErrKind::InvalidRequest => -32600,
            ErrKind::MethodNotFound => -32601,
            ErrKind::InvalidParams => -32602,
            ErrKind::Internal => -32603,
            ErrKind::InvalidPipe => -32764,
            ErrKind::PermissionDenied => -32765,
            ErrKind::InvalidUser => -32766,
            ErrKind::UserExists => -32767,
            ErrKind::InvalidLogin => -32768,
        }
    }
}

/// A protocol-level error: a kind plus optional context for the caller.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{kind}{}", .data.as_ref().map(|d| format!(": {d}")).unwrap_or_default())]
pub struct RpcError {
    /// Which kind of failure this is.
    pub kind: ErrKind,
    /// Caller-safe context, e.g. the offending parameter name.
    pub data: Option<String>,
}

impl RpcError {
    /// An error with no extra context.
    #[must_use]
    pub fn new(kind: ErrKind) -> Self {
        Self { kind, data: None }
    }

    /// An error carrying caller-safe context.
    #[must_use]
    pub fn with_data(kind: ErrKind, data: impl Into<String>) -> Self {
        Self {
            kind,
            data: Some(data.into()),
        }
    }

    /// `InvalidParams` naming the offending field.
    #[must_use]
    pub fn bad_param(field: &str) -> Self {
        Self::with_data(ErrKind::InvalidParams, field)
    }

    /// The `data` member for the wire, if any.
    #[must_use]
    pub fn data_value(&self) -> Option<Value> {
        self.data.as_ref().map(|d| Value::String(d.clone()))
    }
}

impl From<ErrKind> for RpcError {
    fn from(kind: ErrKind) -> Self {
        Self::new(kind)
    }
}

/// Result alias for operations that fail with a protocol error.
pub type RpcResult<T> = std::result::Result<T, RpcError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_stable() {
        assert_eq!(ErrKind::Parse.code(), -32700);
        assert_eq!(ErrKind::MethodNotFound.code(), -32601);
        assert_eq!(ErrKind::InvalidParams.code(), -32602);
        assert_eq!(ErrKind::InvalidPipe.code(), -32764);
        assert_eq!(ErrKind::PermissionDenied.code(), -32765);
        assert_eq!(ErrKind::UserExists.code(), -32767);
    }

    #[test]
    fn test_display_includes_data() {
        let err = RpcError::bad_param("pipeid");
        assert_eq!(err.to_string(), "invalid params: pipeid");
        let bare = RpcError::new(ErrKind::InvalidPipe);
        assert_eq!(bare.to_string(), "invalid pipe");
    }
}
