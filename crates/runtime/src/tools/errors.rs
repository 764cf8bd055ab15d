use crate::bridge::BridgeError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur during tool execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Error)]
pub enum ToolError {
    #[error("tool not found: {0}")]
    NotFound(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("timeout after {0}ms")]
    Timeout(u64),
    #[error("connection failed: {0}")]
    Connection(String),
    #[error("protocol error: {0}")]
    Protocol(String),
    #[error("execution failed: {0}")]
    Execution(String),
}

impl From<mcp::Error> for ToolError {
    fn from(err: mcp::Error) -> Self {
        match err {
            mcp::Error::ToolNotFound(name) => Self::NotFound(name),
            mcp::Error::ToolCallFailed(message) => Self::Execution(message),
            mcp::Error::Timeout(after) => Self::Timeout(after.as_millis() as u64),
            err if err.is_connection() => Self::Connection(err.to_string()),
            err if err.is_protocol() => Self::Protocol(err.to_string()),
            err => Self::Execution(err.to_string()),
        }
    }
}

impl From<BridgeError> for ToolError {
    fn from(err: BridgeError) -> Self {
        match err {
            BridgeError::Timeout(after) => Self::Timeout(after.as_millis() as u64),
            err => Self::Execution(err.to_string()),
        }
    }
}
