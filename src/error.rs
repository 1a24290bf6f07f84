//! Error types for the package registry MCP server.
//!
//! Errors follow the layers a request passes through:
//! - [`ToolError`]: an operation failed; returned with `isError: true` in
//!   `CallToolResult`, never as an HTTP failure.
//! - [`ProtocolError`]: the body is not a valid protocol message for the
//!   session's current state; answered with a JSON-RPC error object.
//! - [`TransportError`]: the outcome of one exchange against a transport.
//! - [`SessionError`]: session registry failures.

use crate::session::SessionId;
use rmcp::model::{CallToolResult, Content, ErrorCode, ErrorData};
use thiserror::Error;

/// Tool execution errors - returned with is_error: true in CallToolResult
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ToolError {
    #[error("Package not found: {0}")]
    NotFound(String),

    #[error("Upstream registry unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("Rate limited by upstream registry: {0}")]
    RateLimited(String),

    #[error("Upstream registry returned HTTP {status}: {message}")]
    Upstream { status: u16, message: String },

    #[error("Invalid response from upstream registry: {0}")]
    InvalidResponse(String),

    #[error("Invalid parameters: {0}")]
    InvalidParams(String),
}

impl ToolError {
    /// Convert to MCP CallToolResult with is_error: true
    pub fn to_tool_result(&self) -> CallToolResult {
        CallToolResult::error(vec![Content::text(self.to_string())])
    }
}

/// A message that cannot be processed in the session's current state.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    #[error("Empty batch")]
    EmptyBatch,

    #[error("Session is not initialized")]
    NotInitialized,

    #[error("Session is already initialized")]
    AlreadyInitialized,
}

impl ProtocolError {
    /// JSON-RPC error code for this failure.
    pub fn code(&self) -> ErrorCode {
        match self {
            ProtocolError::Parse(_) => ErrorCode::PARSE_ERROR,
            _ => ErrorCode::INVALID_REQUEST,
        }
    }

    pub fn to_error_data(&self) -> ErrorData {
        ErrorData::new(self.code(), self.to_string(), None)
    }
}

/// Outcome of a failed exchange against a transport.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The transport has been torn down; its session id is no longer valid.
    #[error("Transport is closed")]
    Closed,

    #[error("A server-push stream is already open for this session")]
    StreamConflict,

    /// The session's engine failed; the transport cannot continue.
    #[error("{0}")]
    Internal(String),
}

/// Error type for session registry operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("Session id collision: {0}")]
    IdCollision(SessionId),
}

/// Invalid server configuration.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid bind address {addr}: {reason}")]
    InvalidBindAddress { addr: String, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_error_becomes_error_result() {
        let result = ToolError::NotFound("left-pad".to_string()).to_tool_result();
        assert_eq!(result.is_error, Some(true));
        let value = serde_json::to_value(&result).expect("serialize");
        assert_eq!(value["content"][0]["text"], "Package not found: left-pad");
    }

    #[test]
    fn protocol_error_codes() {
        assert_eq!(
            ProtocolError::Parse("eof".to_string()).code(),
            ErrorCode::PARSE_ERROR
        );
        assert_eq!(ProtocolError::EmptyBatch.code(), ErrorCode::INVALID_REQUEST);
        assert_eq!(
            ProtocolError::AlreadyInitialized.to_error_data().code,
            ErrorCode::INVALID_REQUEST
        );
    }
}
