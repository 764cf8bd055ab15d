//! MCP error types.

use crate::protocol::RpcError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("unknown server: {0}")]
    UnknownServer(String),

    #[error("server is disabled: {0}")]
    Disabled(String),

    #[error("server path not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("failed to connect to server: {0}")]
    ConnectFailed(String),

    #[error("failed to spawn server: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("server not initialized")]
    NotInitialized,

    #[error("server exited unexpectedly")]
    ServerExited,

    #[error("no response after {}ms", .0.as_millis())]
    Timeout(std::time::Duration),

    #[error("failed to serialize request: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("server returned an error: {0}")]
    Rpc(#[from] RpcError),

    #[error("tool not found: {0}")]
    ToolNotFound(String),

    #[error("tool call failed: {0}")]
    ToolCallFailed(String),

    /// The provider cannot run this tool in its current environment.
    #[error("tool '{tool}' is unavailable: {reason}")]
    Unsupported { tool: String, reason: String },

    #[error("output too large: {size} bytes (max {max})")]
    OutputTooLarge { size: usize, max: usize },
}

impl Error {
    /// Whether the error comes from talking to the provider rather than
    /// from the tool itself.
    pub fn is_protocol(&self) -> bool {
        matches!(
            self,
            Self::Serialize(_) | Self::InvalidResponse(_) | Self::Rpc(_) | Self::OutputTooLarge { .. }
        )
    }

    /// Whether the error means the provider could not be reached.
    pub fn is_connection(&self) -> bool {
        matches!(
            self,
            Self::UnknownServer(_)
                | Self::Disabled(_)
                | Self::NotFound(_)
                | Self::ConnectFailed(_)
                | Self::Spawn(_)
                | Self::NotInitialized
                | Self::ServerExited
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
